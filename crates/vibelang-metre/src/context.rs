//! Thread-scoped scheduling state.
//!
//! Each performance thread has two private slots: the metre in force and the
//! bar being filled. Nothing here is shared between threads.

use crate::bar::Bar;
use crate::error::{Error, Result};
use crate::metre::SynchronisedMetre;
use std::cell::RefCell;
use std::sync::Arc;

/// A bar together with the metre it was opened under.
#[derive(Debug)]
pub struct OpenBar {
    pub bar: Bar,
    pub metre: Arc<SynchronisedMetre>,
}

thread_local! {
    /// Metre set by `use_metre` or the innermost `with_metre`.
    static CURRENT_METRE: RefCell<Option<Arc<SynchronisedMetre>>> = RefCell::new(None);

    /// The bar currently being filled, if any.
    static CURRENT_BAR: RefCell<Option<OpenBar>> = RefCell::new(None);
}

pub fn current_metre() -> Option<Arc<SynchronisedMetre>> {
    CURRENT_METRE.with(|slot| slot.borrow().clone())
}

/// Replace the thread's metre, returning the previous one.
pub fn set_current_metre(metre: Option<Arc<SynchronisedMetre>>) -> Option<Arc<SynchronisedMetre>> {
    CURRENT_METRE.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), metre))
}

pub fn in_bar() -> bool {
    CURRENT_BAR.with(|slot| slot.borrow().is_some())
}

/// Run `f` on the open bar. Returns `None` outside a bar.
///
/// The slot stays borrowed while `f` runs, so `f` must not call back into
/// anything that touches the bar slot.
pub fn with_open_bar<R>(f: impl FnOnce(&mut OpenBar) -> R) -> Option<R> {
    CURRENT_BAR.with(|slot| slot.borrow_mut().as_mut().map(f))
}

/// Puts the previous metre back when dropped.
#[must_use = "the metre is restored as soon as the guard is dropped"]
pub struct MetreRestore {
    previous: Option<Arc<SynchronisedMetre>>,
}

impl MetreRestore {
    pub fn install(metre: Arc<SynchronisedMetre>) -> Self {
        Self {
            previous: set_current_metre(Some(metre)),
        }
    }
}

impl Drop for MetreRestore {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // try_with: the slot may already be gone during thread teardown
        let _ = CURRENT_METRE.try_with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Owns the bar slot for the lifetime of a `bar` block.
#[must_use = "the bar is closed as soon as the guard is dropped"]
pub struct BarGuard {
    _private: (),
}

impl BarGuard {
    /// Open `bar` on this thread. Fails with [`Error::NestedBar`] if a bar is
    /// already open; the existing bar is left untouched.
    pub fn open(bar: Bar, metre: Arc<SynchronisedMetre>) -> Result<Self> {
        CURRENT_BAR.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(Error::NestedBar);
            }
            *slot = Some(OpenBar { bar, metre });
            Ok(BarGuard { _private: () })
        })
    }

    /// Close the bar and hand back its final state.
    pub fn close(self) -> Option<OpenBar> {
        CURRENT_BAR.with(|slot| slot.borrow_mut().take())
    }
}

impl Drop for BarGuard {
    fn drop(&mut self) {
        let _ = CURRENT_BAR.try_with(|slot| slot.borrow_mut().take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseRegistry;

    fn metre(spec: &str) -> Arc<SynchronisedMetre> {
        let registry = PhaseRegistry::new();
        Arc::new(
            SynchronisedMetre::with_registry(&spec.parse().unwrap(), None, &registry).unwrap(),
        )
    }

    #[test]
    fn test_metre_restore_nests() {
        assert!(current_metre().is_none());
        {
            let _outer = MetreRestore::install(metre("3/4"));
            {
                let _inner = MetreRestore::install(metre("6/8"));
                assert_eq!(current_metre().unwrap().key(), "6/8");
            }
            assert_eq!(current_metre().unwrap().key(), "3/4");
        }
        assert!(current_metre().is_none());
    }

    #[test]
    fn test_bar_guard_clears_slot() {
        let m = metre("2/4");
        {
            let _guard = BarGuard::open(Bar::new(Arc::clone(m.tree())), Arc::clone(&m)).unwrap();
            assert!(in_bar());
            with_open_bar(|open| open.bar.add_note(0, 1).unwrap());
            assert!(matches!(
                BarGuard::open(Bar::new(Arc::clone(m.tree())), Arc::clone(&m)),
                Err(Error::NestedBar)
            ));
            // the rejected open must not have replaced the bar
            let offset = with_open_bar(|open| open.bar.current_offset().clone()).unwrap();
            assert!(offset.is_positive());
        }
        assert!(!in_bar());
        assert!(with_open_bar(|_| ()).is_none());
    }

    #[test]
    fn test_close_returns_bar() {
        let m = metre("3/4");
        let guard = BarGuard::open(Bar::new(Arc::clone(m.tree())), m).unwrap();
        let open = guard.close().unwrap();
        assert!(open.bar.current_offset().is_zero());
        assert!(!in_bar());
    }
}
