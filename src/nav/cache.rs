use std::collections::{HashMap, VecDeque};

use crate::geo::LatLon;

const DEFAULT_CAPACITY: usize = 1000;

type Key = (u64, u64, u64, u64);

fn key(p1: LatLon, p2: LatLon) -> Key {
    (
        p1.lat.to_bits(),
        p1.lon.to_bits(),
        p2.lat.to_bits(),
        p2.lon.to_bits(),
    )
}

/// Bounded memo of `nav::distance`. The oldest entry is evicted first.
#[derive(Clone, Debug)]
pub struct DistanceCache {
    capacity: usize,
    values: HashMap<Key, f64>,
    order: VecDeque<Key>,
    hits: u64,
    misses: u64,
}

impl Default for DistanceCache {
    fn default() -> Self {
        DistanceCache::with_capacity(DEFAULT_CAPACITY)
    }
}

impl DistanceCache {
    pub fn new() -> Self {
        DistanceCache::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        DistanceCache {
            capacity,
            values: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn distance(&mut self, p1: LatLon, p2: LatLon) -> f64 {
        let k = key(p1, p2);
        if let Some(&d) = self.values.get(&k) {
            self.hits += 1;
            return d;
        }

        self.misses += 1;
        let d = super::distance(p1, p2);
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.values.remove(&oldest);
            }
        }
        self.values.insert(k, d);
        self.order.push_back(k);
        d
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// (hits, misses) since creation or the last `clear`.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.order.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_values_match_direct_computation() {
        let mut cache = DistanceCache::new();
        let a = LatLon::new(48.5734, 7.6287);
        let b = LatLon::new(48.8566, 2.3522);

        let first = cache.distance(a, b);
        let second = cache.distance(a, b);
        assert_eq!(first, crate::nav::distance(a, b));
        assert_eq!(first, second);
        assert_eq!(cache.stats(), (1, 1));
        assert_eq!(cache.capacity(), 1000);
    }

    #[test]
    fn oldest_entry_is_evicted() {
        let mut cache = DistanceCache::with_capacity(2);
        let origin = LatLon::new(45.0, 5.0);
        let p: Vec<LatLon> = (1..=3).map(|i| LatLon::new(45.0, 5.0 + i as f64)).collect();

        cache.distance(origin, p[0]);
        cache.distance(origin, p[1]);
        cache.distance(origin, p[2]);
        assert_eq!(cache.len(), 2);

        // p[0] was evicted, p[2] is still there.
        cache.distance(origin, p[2]);
        assert_eq!(cache.stats(), (1, 3));
        cache.distance(origin, p[0]);
        assert_eq!(cache.stats(), (1, 4));

        cache.clear();
        assert!(cache.is_empty());
    }
}
