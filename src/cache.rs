// src/cache.rs

use super::*;
use chrono::{NaiveDate, NaiveTime};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::trace;

/// Charts are keyed by the full local time, longitude and sex. The solar
/// time shift can move two instants of one clock hour into different hour
/// branches, so the key keeps minutes and seconds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    date: NaiveDate,
    time: NaiveTime,
    longitude_bits: u64,
    sex: Sex,
}

impl CacheKey {
    pub fn new(birth_info: &BirthInfo) -> Self {
        // -0.0 and 0.0 must share a key.
        let longitude = if birth_info.longitude() == 0.0 { 0.0 } else { birth_info.longitude() };
        CacheKey {
            date: birth_info.date_time().date(),
            time: birth_info.date_time().time(),
            longitude_bits: longitude.to_bits(),
            sex: birth_info.sex(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, Arc<Chart>>,
    order: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded first-in first-out chart cache.
#[derive(Debug)]
pub struct ChartCache {
    state: Mutex<CacheState>,
    capacity: usize,
}

impl ChartCache {
    pub fn new(capacity: usize) -> Self {
        ChartCache {
            state: Mutex::new(CacheState::default()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Chart>> {
        let mut state = self.state.lock();
        match state.entries.get(key).cloned() {
            Some(chart) => {
                state.hits += 1;
                Some(chart)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, key: CacheKey, chart: Arc<Chart>) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock();
        if state.entries.insert(key, chart).is_some() {
            return;
        }
        state.order.push_back(key);
        while state.entries.len() > self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            state.evictions += 1;
            trace!(?oldest, "evicted chart");
        }
    }

    /// Drops every entry and resets the counters.
    pub fn clear(&self) {
        *self.state.lock() = CacheState::default();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let lookups = state.hits + state.misses;
        CacheStats {
            size: state.entries.len(),
            capacity: self.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64
            },
        }
    }
}

/// A [`BaziEngine`] that remembers the charts it has produced.
#[derive(Debug)]
pub struct MemoizedEngine {
    engine: BaziEngine,
    cache: ChartCache,
}

impl MemoizedEngine {
    pub fn new(engine: BaziEngine) -> Self {
        let capacity = engine.config().cache_capacity;
        MemoizedEngine {
            engine,
            cache: ChartCache::new(capacity),
        }
    }

    pub fn engine(&self) -> &BaziEngine {
        &self.engine
    }

    pub fn cache(&self) -> &ChartCache {
        &self.cache
    }

    pub fn generate(&self, birth_info: &BirthInfo) -> Arc<Chart> {
        let key = CacheKey::new(birth_info);
        if let Some(chart) = self.cache.get(&key) {
            trace!(?key, "chart cache hit");
            return chart;
        }
        let chart = Arc::new(self.engine.generate(birth_info));
        self.cache.insert(key, Arc::clone(&chart));
        chart
    }
}
