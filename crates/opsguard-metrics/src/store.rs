//! MetricStore — append-only, time-windowed store of named samples.
//!
//! Each metric name owns a chronologically ordered ring of samples.
//! Samples older than the retention window (24h by default, measured
//! against the injected clock) are evicted on every insert and are
//! never returned by queries, even before eviction has run.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::debug;

use opsguard_core::{Clock, DAY_MS, Metric, Timestamp};

pub struct MetricStore {
    clock: Arc<dyn Clock>,
    retention_ms: u64,
    series: RwLock<HashMap<String, VecDeque<Metric>>>,
}

impl MetricStore {
    /// Create a store with the default 24h retention.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_retention(clock, Duration::from_millis(DAY_MS))
    }

    pub fn with_retention(clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self {
            clock,
            retention_ms: retention.as_millis() as u64,
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn cutoff(&self) -> Timestamp {
        self.clock.now_ms().saturating_sub(self.retention_ms)
    }

    /// Append a sample. Samples already outside retention are dropped.
    pub fn record(
        &self,
        name: &str,
        value: f64,
        timestamp: Timestamp,
        tags: Option<BTreeMap<String, String>>,
    ) {
        let cutoff = self.cutoff();
        if timestamp < cutoff {
            debug!(metric = name, timestamp, "dropping sample older than retention");
            return;
        }

        let metric = Metric {
            name: name.to_string(),
            timestamp,
            value,
            tags,
        };

        let mut series = self.series.write().expect("metric store lock");
        let samples = series.entry(name.to_string()).or_default();

        // Late samples keep the ring ordered.
        if samples.back().is_some_and(|last| last.timestamp > timestamp) {
            let idx = samples.partition_point(|m| m.timestamp <= timestamp);
            samples.insert(idx, metric);
        } else {
            samples.push_back(metric);
        }

        while samples.front().is_some_and(|m| m.timestamp < cutoff) {
            samples.pop_front();
        }
    }

    /// Append a sample stamped with the current clock time.
    pub fn record_now(&self, name: &str, value: f64) {
        self.record(name, value, self.clock.now_ms(), None);
    }

    /// Samples for `name` at or after `since`, oldest first.
    pub fn since(&self, name: &str, since: Timestamp) -> Vec<Metric> {
        let from = since.max(self.cutoff());
        let series = self.series.read().expect("metric store lock");
        match series.get(name) {
            Some(samples) => {
                let start = samples.partition_point(|m| m.timestamp < from);
                samples.range(start..).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Samples for `name` in `[from, to)`, oldest first.
    pub fn between(&self, name: &str, from: Timestamp, to: Timestamp) -> Vec<Metric> {
        self.since(name, from)
            .into_iter()
            .take_while(|m| m.timestamp < to)
            .collect()
    }

    pub fn latest(&self, name: &str) -> Option<Metric> {
        let cutoff = self.cutoff();
        let series = self.series.read().expect("metric store lock");
        series
            .get(name)
            .and_then(|samples| samples.back())
            .filter(|m| m.timestamp >= cutoff)
            .cloned()
    }

    /// Mean of the samples since `since`; `None` when there are none.
    pub fn average(&self, name: &str, since: Timestamp) -> Option<f64> {
        mean(&self.since(name, since))
    }

    /// Largest sample since `since`; `None` when there are none.
    pub fn peak(&self, name: &str, since: Timestamp) -> Option<f64> {
        self.since(name, since)
            .iter()
            .map(|m| m.value)
            .reduce(f64::max)
    }

    /// Sum of the samples since `since`.
    pub fn sum(&self, name: &str, since: Timestamp) -> f64 {
        self.since(name, since).iter().map(|m| m.value).sum()
    }

    /// Latest sample of every series, sorted by name.
    pub fn latest_all(&self) -> Vec<Metric> {
        let mut names = self.names();
        names.sort();
        names.iter().filter_map(|n| self.latest(n)).collect()
    }

    pub fn names(&self) -> Vec<String> {
        let series = self.series.read().expect("metric store lock");
        series.keys().cloned().collect()
    }

    /// Evict expired samples from every series; returns how many were removed.
    pub fn prune(&self) -> usize {
        let cutoff = self.cutoff();
        let mut series = self.series.write().expect("metric store lock");
        let mut removed = 0;
        for samples in series.values_mut() {
            while samples.front().is_some_and(|m| m.timestamp < cutoff) {
                samples.pop_front();
                removed += 1;
            }
        }
        series.retain(|_, samples| !samples.is_empty());
        if removed > 0 {
            debug!(removed, "metric store pruned");
        }
        removed
    }
}

pub(crate) fn mean(samples: &[Metric]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().map(|m| m.value).sum::<f64>() / samples.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsguard_core::{HOUR_MS, ManualClock, MINUTE_MS};

    const T0: u64 = 100 * DAY_MS;

    fn store() -> (Arc<ManualClock>, MetricStore) {
        let clock = Arc::new(ManualClock::new(T0));
        let store = MetricStore::new(clock.clone());
        (clock, store)
    }

    #[test]
    fn unknown_metric_is_empty() {
        let (_, store) = store();
        assert!(store.since("nope", 0).is_empty());
        assert!(store.latest("nope").is_none());
        assert!(store.average("nope", 0).is_none());
        assert!(store.peak("nope", 0).is_none());
        assert_eq!(store.sum("nope", 0), 0.0);
    }

    #[test]
    fn since_is_chronological_even_for_late_samples() {
        let (_, store) = store();
        store.record("cpu_usage", 1.0, T0 - 3 * MINUTE_MS, None);
        store.record("cpu_usage", 3.0, T0 - MINUTE_MS, None);
        store.record("cpu_usage", 2.0, T0 - 2 * MINUTE_MS, None);

        let values: Vec<f64> = store.since("cpu_usage", 0).iter().map(|m| m.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(store.latest("cpu_usage").unwrap().value, 3.0);
    }

    #[test]
    fn since_excludes_samples_beyond_retention_at_query_time() {
        let (clock, store) = store();
        store.record("cpu_usage", 10.0, T0, None);
        store.record("cpu_usage", 20.0, T0 + HOUR_MS, None);

        // 24h and a bit later the first sample is outside the window,
        // even though nothing has been inserted since.
        clock.set(T0 + DAY_MS + MINUTE_MS);
        let samples = store.since("cpu_usage", T0 - HOUR_MS);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 20.0);
        assert!(samples.iter().all(|m| m.timestamp >= clock.now_ms() - DAY_MS));
    }

    #[test]
    fn insert_evicts_expired_samples() {
        let (clock, store) = store();
        store.record("request_count", 5.0, T0, None);
        clock.set(T0 + 25 * HOUR_MS);
        store.record_now("request_count", 7.0);

        let all = store.since("request_count", 0);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, 7.0);
    }

    #[test]
    fn samples_older_than_retention_are_dropped_on_insert() {
        let (_, store) = store();
        store.record("cpu_usage", 1.0, T0 - 25 * HOUR_MS, None);
        assert!(store.latest("cpu_usage").is_none());
    }

    #[test]
    fn average_peak_and_sum_over_window() {
        let (_, store) = store();
        store.record("cpu_usage", 90.0, T0 - 10 * MINUTE_MS, None);
        store.record("cpu_usage", 40.0, T0 - 4 * MINUTE_MS, None);
        store.record("cpu_usage", 60.0, T0 - 2 * MINUTE_MS, None);

        let window = T0 - 5 * MINUTE_MS;
        assert_eq!(store.average("cpu_usage", window), Some(50.0));
        assert_eq!(store.peak("cpu_usage", window), Some(60.0));
        assert_eq!(store.peak("cpu_usage", 0), Some(90.0));
        assert_eq!(store.sum("cpu_usage", window), 100.0);
    }

    #[test]
    fn between_is_half_open() {
        let (_, store) = store();
        store.record("request_count", 1.0, T0 - 2 * HOUR_MS, None);
        store.record("request_count", 2.0, T0 - HOUR_MS, None);

        let hits = store.between("request_count", T0 - 2 * HOUR_MS, T0 - HOUR_MS);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value, 1.0);
    }

    #[test]
    fn tags_are_preserved() {
        let (_, store) = store();
        let mut tags = BTreeMap::new();
        tags.insert("host".to_string(), "web-1".to_string());
        store.record("cpu_usage", 1.0, T0, Some(tags));

        let latest = store.latest("cpu_usage").unwrap();
        assert_eq!(latest.tags.unwrap()["host"], "web-1");
    }

    #[test]
    fn prune_drops_expired_series() {
        let (clock, store) = store();
        store.record("cpu_usage", 1.0, T0, None);
        store.record("memory_usage", 1.0, T0 + 2 * HOUR_MS, None);

        clock.set(T0 + DAY_MS + HOUR_MS);
        assert_eq!(store.prune(), 1);
        assert_eq!(store.names(), vec!["memory_usage".to_string()]);
    }

    #[test]
    fn latest_all_is_sorted_by_name() {
        let (_, store) = store();
        store.record_now("memory_usage", 2.0);
        store.record_now("cpu_usage", 1.0);
        let names: Vec<String> = store.latest_all().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["cpu_usage", "memory_usage"]);
    }
}
