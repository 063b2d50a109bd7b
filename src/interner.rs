//! Shared string table for path fragments repeated across many records.
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Deduplicating string table.
///
/// Interned values are `Arc<str>`, so a directory shared by thousands of
/// records is stored once. Safe to share between producer threads.
#[derive(Debug, Default)]
pub struct StringInterner {
    table: RwLock<HashSet<Arc<str>>>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical shared copy of `value`, inserting it if new.
    pub fn intern(&self, value: &str) -> Arc<str> {
        {
            let table = self.table.read().unwrap_or_else(|poison| poison.into_inner());
            if let Some(existing) = table.get(value) {
                return Arc::clone(existing);
            }
        }
        let mut table = self.table.write().unwrap_or_else(|poison| poison.into_inner());
        // Another writer may have inserted it between the two locks.
        if let Some(existing) = table.get(value) {
            return Arc::clone(existing);
        }
        let shared: Arc<str> = Arc::from(value);
        table.insert(Arc::clone(&shared));
        shared
    }

    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn repeated_values_share_storage() {
        let interner = StringInterner::new();
        let a = interner.intern("/proj/src");
        let b = interner.intern(&String::from("/proj/src"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn concurrent_interning_converges() {
        let interner = Arc::new(StringInterner::new());
        thread::scope(|scope| {
            for worker in 0..4 {
                let interner = Arc::clone(&interner);
                scope.spawn(move || {
                    for idx in 0..50 {
                        interner.intern(&format!("/proj/dir{}", (idx + worker) % 25));
                    }
                });
            }
        });
        assert_eq!(interner.len(), 25);
    }
}
