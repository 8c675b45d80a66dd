// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache for formatted display amounts.
//!
//! Keyed by `(amount, currency)`. The converter clears it on every rate
//! refresh, so a formatted string never outlives the rates it was built from.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use rust_decimal::Decimal;

use super::Currency;

const MIN_CAPACITY: NonZeroUsize = NonZeroUsize::MIN;

/// In-process LRU cache of formatted amounts.
pub struct FormatCache {
    cache: Mutex<LruCache<(Decimal, Currency), String>>,
}

impl FormatCache {
    /// Create a new cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(MIN_CAPACITY),
            )),
        }
    }

    pub fn get(&self, amount: Decimal, currency: Currency) -> Option<String> {
        let mut cache = self.cache.lock().ok()?;
        cache.get(&(amount.normalize(), currency)).cloned()
    }

    pub fn put(&self, amount: Decimal, currency: Currency, formatted: String) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put((amount.normalize(), currency), formatted);
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
