#![forbid(unsafe_code)]

//! Observer registry: the per-collection set of enumerable observers.
//!
//! # Design
//!
//! The registry holds **non-owning** handles. Observers are registered as
//! `&Rc<O>` and stored as `Weak<dyn EnumerableObserver<..>>`; whoever owns the
//! `Rc` decides how long the observer lives. Dead handles are pruned lazily
//! on the next `add` or notification pass.
//!
//! Identity is the `Rc` allocation address, so adding the same observer twice
//! is a no-op and the same observer may be registered with any number of
//! collections independently.
//!
//! # Delivery
//!
//! A notification pass snapshots the entry list, releases the borrow, and
//! then calls each observer in registration order. Observers may therefore
//! add or remove observers (including themselves) from inside a callback:
//!
//! - an entry removed mid-pass is skipped if it has not been visited yet;
//! - an entry added mid-pass is not called until the next pass.
//!
//! Each entry records the last cycle id it saw for each hook, so an observer
//! is called at most once per hook per cycle even if the notifier is driven
//! re-entrantly.
//!
//! # Failure Modes
//!
//! - **Observer error**: the pass stops at the failing observer and the error
//!   is returned. Observers after it in the same pass are not called. Stamps
//!   of observers already called are kept.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::descriptor::MutationDescriptor;
use crate::error::ObserverError;

/// Pre/post mutation callbacks for a collection of type `C` holding `T`.
///
/// Both hooks default to doing nothing, so an observer only interested in
/// completed mutations implements `did_change` alone.
pub trait EnumerableObserver<C: ?Sized, T> {
    fn will_change(
        &self,
        _collection: &C,
        _descriptor: &MutationDescriptor<T>,
    ) -> Result<(), ObserverError> {
        Ok(())
    }

    fn did_change(
        &self,
        _collection: &C,
        _descriptor: &MutationDescriptor<T>,
    ) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Closure-backed observer. See [`observer_fn`].
pub struct FnObserver<W, D> {
    will: W,
    did: D,
}

/// Build an observer from two closures.
pub fn observer_fn<C, T, W, D>(will: W, did: D) -> FnObserver<W, D>
where
    C: ?Sized,
    W: Fn(&C, &MutationDescriptor<T>) -> Result<(), ObserverError>,
    D: Fn(&C, &MutationDescriptor<T>) -> Result<(), ObserverError>,
{
    FnObserver { will, did }
}

impl<C, T, W, D> EnumerableObserver<C, T> for FnObserver<W, D>
where
    C: ?Sized,
    W: Fn(&C, &MutationDescriptor<T>) -> Result<(), ObserverError>,
    D: Fn(&C, &MutationDescriptor<T>) -> Result<(), ObserverError>,
{
    fn will_change(&self, collection: &C, descriptor: &MutationDescriptor<T>) -> Result<(), ObserverError> {
        (self.will)(collection, descriptor)
    }

    fn did_change(&self, collection: &C, descriptor: &MutationDescriptor<T>) -> Result<(), ObserverError> {
        (self.did)(collection, descriptor)
    }
}

impl<W, D> fmt::Debug for FnObserver<W, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObserver").finish_non_exhaustive()
    }
}

type ObserverRc<C, T> = Rc<dyn EnumerableObserver<C, T>>;
type ObserverWeak<C, T> = Weak<dyn EnumerableObserver<C, T>>;

fn identity<O: ?Sized>(observer: &Rc<O>) -> usize {
    Rc::as_ptr(observer).cast::<()>() as usize
}

#[derive(Clone, Copy)]
enum Hook {
    Will,
    Did,
}

struct ObserverEntry<C: ?Sized, T> {
    handle: ObserverWeak<C, T>,
    key: usize,
    active: Cell<bool>,
    last_will: Cell<u64>,
    last_did: Cell<u64>,
}

impl<C: ?Sized, T> ObserverEntry<C, T> {
    fn is_live(&self) -> bool {
        self.active.get() && self.handle.strong_count() > 0
    }

    fn stamp(&self, hook: Hook) -> &Cell<u64> {
        match hook {
            Hook::Will => &self.last_will,
            Hook::Did => &self.last_did,
        }
    }
}

/// Insertion-ordered set of weakly held observers.
pub struct ObserverRegistry<C: ?Sized, T> {
    entries: RefCell<Vec<Rc<ObserverEntry<C, T>>>>,
}

impl<C: ?Sized, T> Default for ObserverRegistry<C, T> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }
}

impl<C: ?Sized, T> fmt::Debug for ObserverRegistry<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observer_count", &self.len())
            .finish()
    }
}

impl<C: ?Sized, T> ObserverRegistry<C, T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Returns `false` if it was already registered.
    pub fn add<O>(&self, observer: &Rc<O>) -> bool
    where
        O: EnumerableObserver<C, T> + 'static,
    {
        let erased: ObserverRc<C, T> = Rc::clone(observer) as ObserverRc<C, T>;
        self.add_dyn(&erased)
    }

    /// Register an already type-erased observer.
    pub fn add_dyn(&self, observer: &ObserverRc<C, T>) -> bool {
        let key = identity(observer);
        let mut entries = self.entries.borrow_mut();
        // Prune first: a dead entry may share its address with a new observer.
        entries.retain(|e| e.is_live());
        if entries.iter().any(|e| e.key == key) {
            return false;
        }
        entries.push(Rc::new(ObserverEntry {
            handle: Rc::downgrade(observer),
            key,
            active: Cell::new(true),
            last_will: Cell::new(0),
            last_did: Cell::new(0),
        }));
        true
    }

    /// Deregister an observer. Unknown observers are ignored.
    ///
    /// Returns `true` if the observer was registered. Takes effect
    /// immediately, including for a delivery pass already in progress.
    pub fn remove<O: ?Sized>(&self, observer: &Rc<O>) -> bool {
        let key = identity(observer);
        let mut entries = self.entries.borrow_mut();
        let Some(pos) = entries.iter().position(|e| e.key == key && e.active.get()) else {
            return false;
        };
        let entry = entries.remove(pos);
        entry.active.set(false);
        true
    }

    #[must_use]
    pub fn contains<O: ?Sized>(&self, observer: &Rc<O>) -> bool {
        let key = identity(observer);
        self.entries
            .borrow()
            .iter()
            .any(|e| e.key == key && e.is_live())
    }

    /// Number of live registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().iter().filter(|e| e.is_live()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deregister every observer.
    pub fn clear(&self) {
        for entry in self.entries.borrow_mut().drain(..) {
            entry.active.set(false);
        }
    }

    /// Deliver `will_change` for `cycle` to every registered observer.
    pub fn notify_will_change(
        &self,
        collection: &C,
        descriptor: &MutationDescriptor<T>,
        cycle: u64,
    ) -> Result<usize, ObserverError> {
        self.deliver(Hook::Will, collection, descriptor, cycle)
    }

    /// Deliver `did_change` for `cycle` to every registered observer.
    pub fn notify_did_change(
        &self,
        collection: &C,
        descriptor: &MutationDescriptor<T>,
        cycle: u64,
    ) -> Result<usize, ObserverError> {
        self.deliver(Hook::Did, collection, descriptor, cycle)
    }

    /// Returns the number of observers called.
    fn deliver(
        &self,
        hook: Hook,
        collection: &C,
        descriptor: &MutationDescriptor<T>,
        cycle: u64,
    ) -> Result<usize, ObserverError> {
        let snapshot: Vec<Rc<ObserverEntry<C, T>>> = {
            let mut entries = self.entries.borrow_mut();
            if entries.is_empty() {
                return Ok(0);
            }
            entries.retain(|e| e.is_live());
            entries.clone()
        };

        let mut delivered = 0;
        for entry in &snapshot {
            if !entry.active.get() {
                continue;
            }
            let stamp = entry.stamp(hook);
            if stamp.get() == cycle {
                continue;
            }
            let Some(observer) = entry.handle.upgrade() else {
                continue;
            };
            // Stamp before calling so a re-entrant pass skips this entry.
            stamp.set(cycle);
            delivered += 1;
            match hook {
                Hook::Will => observer.will_change(collection, descriptor)?,
                Hook::Did => observer.did_change(collection, descriptor)?,
            }
        }
        Ok(delivered)
    }
}
