use std::fmt;

/// Guard returned by `disable_all_caching`.
///
/// Caching stays disabled while the guard is alive; dropping it (or calling
/// [`release`](CachingScope::release)) restores the previous behavior.
pub struct CachingScope {
    restore: Option<Box<dyn FnOnce() + Send>>,
}

impl CachingScope {
    pub fn new(restore: impl FnOnce() + Send + 'static) -> Self {
        Self {
            restore: Some(Box::new(restore)),
        }
    }

    /// A scope with nothing to restore.
    pub fn noop() -> Self {
        Self { restore: None }
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for CachingScope {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

impl fmt::Debug for CachingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingScope")
            .field("active", &self.restore.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn drop_runs_restore_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _scope = CachingScope::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_restores_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let scope = CachingScope::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        scope.release();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_scope_is_inert() {
        let scope = CachingScope::noop();
        assert!(format!("{scope:?}").contains("false"));
    }
}
