//! Hourly load forecasts consulted by predictive scaling.

use std::sync::Arc;

use opsguard_core::{DAY_MS, HOUR_MS, names};
use opsguard_metrics::MetricStore;

/// Expected request volume per collection tick.
///
/// `projected(1)` covers the next hour, `projected(2)` the hour after.
/// `None` means there is not enough history to say.
pub trait LoadForecast: Send + Sync {
    fn baseline(&self) -> Option<f64>;
    fn projected(&self, hours_ahead: u32) -> Option<f64>;
}

/// Forecast from the last 24 hours of `request_count` samples.
///
/// The baseline is the 24h mean. The projection for an hour ahead is the
/// mean of the same hour one day earlier.
pub struct HistoryForecast {
    store: Arc<MetricStore>,
}

impl HistoryForecast {
    pub fn new(store: Arc<MetricStore>) -> Self {
        Self { store }
    }
}

impl LoadForecast for HistoryForecast {
    fn baseline(&self) -> Option<f64> {
        let now = self.store.clock().now_ms();
        self.store
            .average(names::REQUEST_COUNT, now.saturating_sub(DAY_MS))
    }

    fn projected(&self, hours_ahead: u32) -> Option<f64> {
        if hours_ahead == 0 || u64::from(hours_ahead) > 24 {
            return None;
        }
        let now = self.store.clock().now_ms();
        let from = now.saturating_sub(DAY_MS) + u64::from(hours_ahead - 1) * HOUR_MS;
        let samples = self
            .store
            .between(names::REQUEST_COUNT, from, from + HOUR_MS);
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().map(|m| m.value).sum::<f64>() / samples.len() as f64)
    }
}

/// Fixed baseline and per-hour projections.
pub struct StaticForecast {
    baseline: Option<f64>,
    hourly: Vec<f64>,
}

impl StaticForecast {
    /// `hourly[0]` is the projection one hour ahead.
    pub fn new(baseline: f64, hourly: Vec<f64>) -> Self {
        Self {
            baseline: Some(baseline),
            hourly,
        }
    }

    pub fn empty() -> Self {
        Self {
            baseline: None,
            hourly: Vec::new(),
        }
    }
}

impl LoadForecast for StaticForecast {
    fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    fn projected(&self, hours_ahead: u32) -> Option<f64> {
        let idx = (hours_ahead as usize).checked_sub(1)?;
        self.hourly.get(idx).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsguard_core::{Clock, ManualClock};
    use std::time::Duration;

    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn history_forecast_reads_yesterday() {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MetricStore::new(clock.clone()));

        // Quiet day with a busy hour at 23h ago.
        for minute in 0..(24 * 60) {
            let ts = T0 + minute * 60_000;
            let value = if (60..120).contains(&minute) { 500.0 } else { 10.0 };
            store.record(names::REQUEST_COUNT, value, ts, None);
        }
        clock.advance(Duration::from_millis(DAY_MS - 1));

        let forecast = HistoryForecast::new(store.clone());
        let now = clock.now_ms();
        assert_eq!(now - T0, DAY_MS - 1);

        assert_eq!(forecast.projected(1), Some(10.0));
        assert_eq!(forecast.projected(2), Some(500.0));
        let baseline = forecast.baseline().unwrap();
        assert!(baseline > 10.0 && baseline < 40.0);
    }

    #[test]
    fn history_forecast_without_samples() {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MetricStore::new(clock));
        let forecast = HistoryForecast::new(store);
        assert_eq!(forecast.baseline(), None);
        assert_eq!(forecast.projected(1), None);
        assert_eq!(forecast.projected(0), None);
    }

    #[test]
    fn static_forecast_indexes_hours_from_one() {
        let forecast = StaticForecast::new(100.0, vec![120.0, 200.0]);
        assert_eq!(forecast.baseline(), Some(100.0));
        assert_eq!(forecast.projected(0), None);
        assert_eq!(forecast.projected(1), Some(120.0));
        assert_eq!(forecast.projected(2), Some(200.0));
        assert_eq!(forecast.projected(3), None);
    }
}
