//! Indexed parameter pools.

use std::collections::HashMap;

/// Feature key: number of senones covered by a pool.
pub const NUM_SENONES: &str = "num_senones";
/// Feature key: number of feature streams.
pub const NUM_STREAMS: &str = "num_streams";
/// Feature key: Gaussians per mixture.
pub const NUM_GAUSSIANS_PER_STATE: &str = "num_gaussians_per_state";

/// A dense id -> value collection with integer feature metadata. Filled once
/// during load, read-only afterwards.
#[derive(Debug, Clone)]
pub struct Pool<T> {
    name: String,
    items: Vec<T>,
    features: HashMap<String, i32>,
}

impl<T> Pool<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Pool {
            name: name.into(),
            items: Vec::new(),
            features: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends the value at the next dense id.
    pub fn put(&mut self, item: T) {
        self.items.push(item);
    }

    /// Panics on an out-of-range id; ids come from validated model indices.
    pub fn get(&self, id: usize) -> &T {
        &self.items[id]
    }

    pub fn try_get(&self, id: usize) -> Option<&T> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn set_feature(&mut self, name: &str, value: i32) {
        self.features.insert(name.to_string(), value);
    }

    pub fn feature(&self, name: &str) -> Option<i32> {
        self.features.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_features() {
        let mut pool: Pool<Vec<f32>> = Pool::new("means");
        pool.put(vec![0.0, 1.0]);
        pool.put(vec![2.0, 3.0]);
        pool.set_feature(NUM_SENONES, 2);

        assert_eq!(pool.name(), "means");
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(1), &vec![2.0, 3.0]);
        assert_eq!(pool.feature(NUM_SENONES), Some(2));
        assert_eq!(pool.feature(NUM_STREAMS), None);
        assert!(pool.try_get(2).is_none());
    }
}
