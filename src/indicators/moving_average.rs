/// Calculate Simple Moving Average (SMA) of the last `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Rolling SMA aligned with `prices`
///
/// Entry `i` is the mean of `prices[i + 1 - period..=i]`, or `None` while
/// fewer than `period` samples are available.
pub fn sma_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    // Every window is summed independently, no running total
    (0..prices.len())
        .map(|i| calculate_sma(&prices[..=i], period))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let sma = calculate_sma(&prices, 5);
        assert_eq!(sma, Some(104.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        let sma = calculate_sma(&prices, 5);
        assert!(sma.is_none());
    }

    #[test]
    fn test_series_undefined_until_window_fills() {
        let prices = vec![1.0, 2.0, 3.0, 4.0];
        let series = sma_series(&prices, 3);

        assert_eq!(series, vec![None, None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_series_last_matches_point_sma() {
        let prices: Vec<f64> = (1..=60).map(|p| (p as f64).sqrt() * 10.0).collect();
        let series = sma_series(&prices, 20);

        let last = series.last().copied().flatten().unwrap();
        let point = calculate_sma(&prices, 20).unwrap();
        assert!((last - point).abs() < 1e-9);
    }

    #[test]
    fn test_zero_period() {
        assert!(calculate_sma(&[1.0], 0).is_none());
        assert_eq!(sma_series(&[1.0, 2.0], 0), vec![None, None]);
    }
}
