use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::{
    utils::{get_bin_edges, get_bin_index, Histogram},
    HfvtxError, HfvtxResult,
};

/// A destination for labelled quality-assurance values.
///
/// Tasks call [`fill`](QaSink::fill) from worker threads, so implementors must synchronize
/// internally.
pub trait QaSink: Send + Sync {
    fn fill(&self, label: &str, value: f64);
}

/// A [`QaSink`] which discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl QaSink for NoopSink {
    fn fill(&self, _label: &str, _value: f64) {}
}

#[derive(Debug, Clone)]
struct Histogram1D {
    bins: usize,
    range: (f64, f64),
    counts: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
}

impl Histogram1D {
    fn new(bins: usize, range: (f64, f64)) -> Self {
        Self {
            bins,
            range,
            counts: vec![0.0; bins],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
        }
    }

    fn fill(&mut self, value: f64) {
        self.entries += 1;
        match get_bin_index(value, self.bins, self.range) {
            Some(index) => self.counts[index] += 1.0,
            None if value < self.range.0 => self.underflow += 1.0,
            None => self.overflow += 1.0,
        }
    }
}

/// Running count and sum for labels which were filled without being registered.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Counter {
    pub entries: u64,
    pub sum: f64,
}

/// A thread-safe collection of named one-dimensional histograms.
///
/// Histograms are registered up front with [`add`](HistogramRegistry::add). Filling a label which
/// was never registered does not fail; the value is accumulated in a [`Counter`] instead so that
/// no report is silently dropped.
#[derive(Debug, Default)]
pub struct HistogramRegistry {
    histograms: Mutex<IndexMap<String, Histogram1D>>,
    counters: Mutex<IndexMap<String, Counter>>,
}

impl HistogramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a histogram with evenly spaced `bins` over `range`.
    ///
    /// # Errors
    ///
    /// Returns [`HfvtxError::RegistrationError`] if the name is taken and
    /// [`HfvtxError::InvalidConfiguration`] for an empty binning.
    pub fn add(&self, name: &str, bins: usize, range: (f64, f64)) -> HfvtxResult<()> {
        if bins == 0 || !(range.1 > range.0) {
            return Err(HfvtxError::invalid_config(format!(
                "histogram \"{name}\" needs at least one bin and an increasing range"
            )));
        }
        let mut histograms = self.histograms.lock();
        if histograms.contains_key(name) {
            return Err(HfvtxError::RegistrationError {
                name: name.to_string(),
            });
        }
        histograms.insert(name.to_string(), Histogram1D::new(bins, range));
        Ok(())
    }

    /// A snapshot of the in-range counts of a registered histogram.
    pub fn histogram(&self, name: &str) -> Option<Histogram> {
        self.histograms.lock().get(name).map(|h| Histogram {
            counts: h.counts.clone(),
            bin_edges: get_bin_edges(h.bins, h.range),
        })
    }

    /// `(underflow, overflow)` of a registered histogram.
    pub fn out_of_range(&self, name: &str) -> Option<(f64, f64)> {
        self.histograms
            .lock()
            .get(name)
            .map(|h| (h.underflow, h.overflow))
    }

    /// Number of fills a label received, whether or not it was registered.
    pub fn entries(&self, name: &str) -> u64 {
        if let Some(h) = self.histograms.lock().get(name) {
            return h.entries;
        }
        self.counters.lock().get(name).map_or(0, |c| c.entries)
    }

    pub fn counter(&self, name: &str) -> Option<Counter> {
        self.counters.lock().get(name).copied()
    }

    /// Names of the registered histograms in registration order.
    pub fn names(&self) -> Vec<String> {
        self.histograms.lock().keys().cloned().collect()
    }
}

impl QaSink for HistogramRegistry {
    fn fill(&self, label: &str, value: f64) {
        if let Some(h) = self.histograms.lock().get_mut(label) {
            h.fill(value);
            return;
        }
        let mut counters = self.counters.lock();
        let counter = counters.entry(label.to_string()).or_default();
        counter.entries += 1;
        counter.sum += value;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_registry_fills_bins() {
        let registry = HistogramRegistry::new();
        registry.add("hvtx_x", 4, (-0.1, 0.1)).unwrap();
        for value in [-0.09, -0.01, 0.01, 0.02, 0.5, -1.0] {
            registry.fill("hvtx_x", value);
        }
        let h = registry.histogram("hvtx_x").unwrap();
        assert_eq!(h.counts, vec![1.0, 1.0, 2.0, 0.0]);
        assert_eq!(h.bin_edges.len(), 5);
        assert_eq!(registry.out_of_range("hvtx_x"), Some((1.0, 1.0)));
        assert_eq!(registry.entries("hvtx_x"), 6);
    }

    #[test]
    fn test_registry_rejects_duplicates_and_bad_binning() {
        let registry = HistogramRegistry::new();
        registry.add("hpt", 10, (0.0, 10.0)).unwrap();
        assert!(matches!(
            registry.add("hpt", 10, (0.0, 10.0)),
            Err(HfvtxError::RegistrationError { .. })
        ));
        assert!(registry.add("hbad", 0, (0.0, 1.0)).is_err());
        assert!(registry.add("hbad", 3, (1.0, 1.0)).is_err());
        assert_eq!(registry.names(), vec!["hpt".to_string()]);
    }

    #[test]
    fn test_unregistered_labels_are_counted() {
        let registry = HistogramRegistry::new();
        registry.fill("hSelPID", 1.0);
        registry.fill("hSelPID", 3.0);
        let counter = registry.counter("hSelPID").unwrap();
        assert_eq!(counter.entries, 2);
        assert_eq!(counter.sum, 4.0);
        assert_eq!(registry.entries("hSelPID"), 2);
        assert_eq!(registry.entries("never"), 0);
    }

    #[test]
    fn test_concurrent_fills() {
        let registry = Arc::new(HistogramRegistry::new());
        registry.add("h", 2, (0.0, 2.0)).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        registry.fill("h", (i % 2) as f64 + 0.5);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.histogram("h").unwrap().counts, vec![200.0, 200.0]);
    }
}
