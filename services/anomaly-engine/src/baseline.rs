//! Rolling per-(entity, parameter) baselines.
//!
//! Each series sits behind its own mutex; the outer map lock is only held long
//! enough to resolve (or lazily create) the slot. Readings for one series are
//! serialized through [`BaselineStore::with_series`], different series never
//! contend beyond that lookup.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub const DEFAULT_WINDOW_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub entity: String,
    pub parameter: String,
}

impl SeriesKey {
    pub fn new(entity: &str, parameter: &str) -> Self { Self { entity: entity.to_string(), parameter: parameter.to_string() } }
}

/// Window + last value of one series.
#[derive(Debug)]
pub struct Series {
    window: VecDeque<f64>,
    previous: Option<f64>,
    capacity: usize,
}

impl Series {
    fn with_capacity(capacity: usize) -> Self {
        Self { window: VecDeque::with_capacity(capacity + 1), previous: None, capacity }
    }

    /// Snapshot copy, oldest first.
    pub fn window(&self) -> Vec<f64> { self.window.iter().copied().collect() }
    pub fn previous(&self) -> Option<f64> { self.previous }
    pub fn len(&self) -> usize { self.window.len() }
    pub fn is_empty(&self) -> bool { self.window.is_empty() }

    pub fn record(&mut self, value: f64) {
        self.window.push_back(value);
        while self.window.len() > self.capacity { self.window.pop_front(); }
        self.previous = Some(value);
    }
}

#[derive(Debug)]
pub struct BaselineStore {
    capacity: usize,
    series: RwLock<HashMap<SeriesKey, Arc<Mutex<Series>>>>,
}

impl Default for BaselineStore {
    fn default() -> Self { Self::new(DEFAULT_WINDOW_SIZE) }
}

impl BaselineStore {
    /// `window_size` of 0 is bumped to 1.
    pub fn new(window_size: usize) -> Self {
        Self { capacity: window_size.max(1), series: RwLock::new(HashMap::new()) }
    }

    pub fn window_size(&self) -> usize { self.capacity }

    /// Number of tracked series.
    pub fn len(&self) -> usize { self.series.read().len() }
    pub fn is_empty(&self) -> bool { self.series.read().is_empty() }

    pub fn record(&self, entity: &str, parameter: &str, value: f64) {
        self.with_series(entity, parameter, |s| s.record(value));
    }

    pub fn window(&self, entity: &str, parameter: &str) -> Vec<f64> {
        self.existing(entity, parameter).map(|s| s.lock().window()).unwrap_or_default()
    }

    pub fn previous(&self, entity: &str, parameter: &str) -> Option<f64> {
        self.existing(entity, parameter).and_then(|s| s.lock().previous())
    }

    /// Runs `f` with the series locked, creating it on first use. Everything done
    /// inside `f` is atomic with respect to other callers on the same series.
    pub fn with_series<R>(&self, entity: &str, parameter: &str, f: impl FnOnce(&mut Series) -> R) -> R {
        let slot = self.slot(entity, parameter);
        let mut guard = slot.lock();
        f(&mut guard)
    }

    fn existing(&self, entity: &str, parameter: &str) -> Option<Arc<Mutex<Series>>> {
        self.series.read().get(&SeriesKey::new(entity, parameter)).cloned()
    }

    fn slot(&self, entity: &str, parameter: &str) -> Arc<Mutex<Series>> {
        if let Some(s) = self.existing(entity, parameter) { return s; }
        let capacity = self.capacity;
        self.series
            .write()
            .entry(SeriesKey::new(entity, parameter))
            .or_insert_with(|| Arc::new(Mutex::new(Series::with_capacity(capacity))))
            .clone()
    }
}
