//! Deterministic weighted-variant selection.
//!
//! The resolution identity (config key followed by the caller's lookup key)
//! is hashed with 32-bit MurmurHash3 (x86 variant, seed 0) and scaled into the
//! total weight. Every client consuming the same records must use exactly
//! this mapping so that a given identity lands in the same bucket everywhere.

use std::io::Cursor;

use crate::model::{ConfigValue, WeightedValue};

/// Divisor that maps a 32-bit hash onto `[0, 1]`.
const HASH_SPACE: f64 = 4_294_967_294.0;

/// Picks one variant of a weighted-value set for an identity.
pub struct WeightedValueResolver<'a> {
    weights: &'a [WeightedValue],
    key: &'a str,
    lookup_key: Option<&'a str>,
}

impl<'a> WeightedValueResolver<'a> {
    pub fn new(weights: &'a [WeightedValue], key: &'a str, lookup_key: Option<&'a str>) -> Self {
        Self {
            weights,
            key,
            lookup_key,
        }
    }

    /// Returns the selected variant, or `None` for an empty set.
    pub fn resolve(&self) -> Option<&'a ConfigValue> {
        if self.weights.is_empty() {
            return None;
        }
        let index = self.variant_index(self.percent());
        Some(&self.weights[index].value)
    }

    /// Without a lookup key the config key alone is the identity, so every
    /// anonymous caller gets the same bucket.
    fn identity(&self) -> String {
        match self.lookup_key {
            Some(lookup_key) => format!("{}{}", self.key, lookup_key),
            None => self.key.to_string(),
        }
    }

    fn percent(&self) -> f64 {
        f64::from(hash_identity(&self.identity())) / HASH_SPACE
    }

    fn variant_index(&self, percent: f64) -> usize {
        let total: u64 = self.weights.iter().map(|w| u64::from(w.weight)).sum();
        let bucket = total as f64 * percent;

        let mut sum = 0u64;
        for (index, variant) in self.weights.iter().enumerate() {
            if bucket < (sum + u64::from(variant.weight)) as f64 {
                return index;
            }
            sum += u64::from(variant.weight);
        }
        self.weights.len() - 1
    }
}

/// 32-bit MurmurHash3 of the identity's UTF-8 bytes.
pub fn hash_identity(identity: &str) -> u32 {
    // An in-memory cursor cannot fail to read.
    murmur3::murmur3_32(&mut Cursor::new(identity.as_bytes()), 0).unwrap_or(0)
}
