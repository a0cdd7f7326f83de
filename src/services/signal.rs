//! Entry signal producers.

use async_trait::async_trait;

use crate::types::{Bar, PositionSide, Signal};

/// Produces an entry signal from recent bars.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn signal(&self, bars: &[Bar]) -> anyhow::Result<Signal>;
}

/// EMA fast/slow crossover.
///
/// Fires on the bar where the fast EMA crosses the slow EMA:
/// - fast crosses above slow = long
/// - fast crosses below slow = short
pub struct EmaCrossSignal {
    fast: usize,
    slow: usize,
}

impl EmaCrossSignal {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self { fast, slow }
    }

    /// EMA of closing prices, seeded with the SMA of the first `period` bars.
    fn calculate_ema(bars: &[Bar], period: usize) -> Option<f64> {
        if period == 0 || bars.len() < period {
            return None;
        }

        let multiplier = 2.0 / (period as f64 + 1.0);
        let sma: f64 = bars.iter().take(period).map(|b| b.close).sum::<f64>() / period as f64;

        let mut ema = sma;
        for bar in bars.iter().skip(period) {
            ema = (bar.close - ema) * multiplier + ema;
        }

        Some(ema)
    }

    fn evaluate(&self, bars: &[Bar]) -> Signal {
        // Need one bar beyond the slow period to compare against the previous bar
        if bars.len() < self.slow + 1 {
            return Signal::none();
        }
        let previous = &bars[..bars.len() - 1];

        let spreads = (
            Self::calculate_ema(previous, self.fast).zip(Self::calculate_ema(previous, self.slow)),
            Self::calculate_ema(bars, self.fast).zip(Self::calculate_ema(bars, self.slow)),
        );
        let ((prev_fast, prev_slow), (fast, slow)) = match spreads {
            (Some(prev), Some(curr)) => (prev, curr),
            _ => return Signal::none(),
        };

        let prev_diff = prev_fast - prev_slow;
        let diff = fast - slow;
        // Strength: spread relative to the slow EMA, in percent
        let strength = if slow != 0.0 { (diff / slow * 100.0).abs() } else { 0.0 };

        if prev_diff <= 0.0 && diff > 0.0 {
            Signal::detected(
                PositionSide::Long,
                strength,
                &format!("EMA{} crossed above EMA{}", self.fast, self.slow),
            )
        } else if prev_diff >= 0.0 && diff < 0.0 {
            Signal::detected(
                PositionSide::Short,
                strength,
                &format!("EMA{} crossed below EMA{}", self.fast, self.slow),
            )
        } else {
            Signal::none()
        }
    }
}

#[async_trait]
impl SignalSource for EmaCrossSignal {
    async fn signal(&self, bars: &[Bar]) -> anyhow::Result<Signal> {
        if self.fast >= self.slow {
            anyhow::bail!("fast period {} must be below slow period {}", self.fast, self.slow);
        }
        Ok(self.evaluate(bars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                time: i as i64 * 60_000,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_calculate_ema_seeded_with_sma() {
        let data = bars(&[1.0, 2.0, 3.0]);
        assert_eq!(EmaCrossSignal::calculate_ema(&data, 3), Some(2.0));
        assert_eq!(EmaCrossSignal::calculate_ema(&data, 4), None);

        // 2 / (3 + 1) = 0.5 weighting on the next close
        let data = bars(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(EmaCrossSignal::calculate_ema(&data, 3), Some(3.0));
    }

    #[tokio::test]
    async fn test_bullish_cross() {
        let mut closes = vec![100.0; 10];
        closes.push(110.0);
        let signal = EmaCrossSignal::new(2, 5).signal(&bars(&closes)).await.unwrap();

        assert!(signal.detected);
        assert_eq!(signal.side, Some(PositionSide::Long));
        assert!(signal.strength.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_bearish_cross() {
        let mut closes = vec![100.0; 10];
        closes.push(90.0);
        let signal = EmaCrossSignal::new(2, 5).signal(&bars(&closes)).await.unwrap();

        assert_eq!(signal.actionable_side(), Some(PositionSide::Short));
    }

    #[tokio::test]
    async fn test_no_cross_in_steady_trend() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let signal = EmaCrossSignal::new(3, 8).signal(&bars(&closes)).await.unwrap();
        assert!(!signal.detected);
    }

    #[test]
    fn test_insufficient_bars() {
        let source = EmaCrossSignal::new(9, 21);
        let signal = tokio_test::block_on(source.signal(&bars(&[100.0; 21]))).unwrap();
        assert_eq!(signal, Signal::none());
    }

    #[tokio::test]
    async fn test_invalid_periods_rejected() {
        assert!(EmaCrossSignal::new(21, 9).signal(&bars(&[1.0; 30])).await.is_err());
    }
}
