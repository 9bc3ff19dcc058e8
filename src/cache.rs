use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Memoized derived fields of one record.
///
/// The value is computed at most once per generation. `invalidate` starts a new
/// generation unconditionally.
#[derive(Debug, Default)]
pub struct DerivedCache<T> {
    slot: OnceLock<T>,
    generation: u64,
    derivations: AtomicU64,
}

impl<T> DerivedCache<T> {
    pub fn get_or_derive(&self, derive: impl FnOnce() -> T) -> &T {
        self.slot.get_or_init(|| {
            self.derivations.fetch_add(1, Ordering::Relaxed);
            derive()
        })
    }

    pub fn get(&self) -> Option<&T> {
        self.slot.get()
    }

    pub fn invalidate(&mut self) {
        self.slot = OnceLock::new();
        self.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of derivation passes run over the lifetime of this cache.
    pub fn derivations(&self) -> u64 {
        self.derivations.load(Ordering::Relaxed)
    }
}

impl<T: Clone> Clone for DerivedCache<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            generation: self.generation,
            derivations: AtomicU64::new(self.derivations()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_once_per_generation() {
        let mut cache = DerivedCache::<String>::default();
        assert_eq!(cache.get_or_derive(|| "a".to_owned()), "a");
        assert_eq!(cache.get_or_derive(|| "b".to_owned()), "a");
        assert_eq!(cache.derivations(), 1);

        cache.invalidate();
        assert!(cache.get().is_none());
        assert_eq!(cache.generation(), 1);
        assert_eq!(cache.get_or_derive(|| "b".to_owned()), "b");
        assert_eq!(cache.derivations(), 2);
    }
}
