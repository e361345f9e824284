#![forbid(unsafe_code)]

//! Derived-property invalidation: the collaborator the property bridge drives.
//!
//! # Design
//!
//! The bridge only needs one entry point, [`PropertyInvalidator::invalidate`].
//! Any property/dependency system can implement it. [`PropertyTable`] is the
//! reference implementation used by the bundled containers:
//!
//! - each [`PropertyKey`] has a dirty flag and an invalidation counter;
//! - property observers subscribe per key and are notified on every
//!   invalidation of that key;
//! - [`CachedProperty`] binds a compute function to a key and recomputes
//!   lazily on the next `get()` after an invalidation.
//!
//! `PropertyTable` uses `Rc<RefCell<..>>` for single-threaded shared
//! ownership. Property observers are stored as `Weak` callbacks and pruned
//! lazily during notification.
//!
//! # Invariants
//!
//! 1. Invalidation is a signal, never a recompute.
//! 2. Repeated invalidation before the next read is harmless: the key stays
//!    dirty and [`CachedProperty::get`] recomputes once.
//! 3. Property observers are notified in registration order.
//! 4. Dropping a [`PropertySubscription`] stops its callback before the next
//!    invalidation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// The two derived properties every observable collection exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// Scalar size property. Invalidated only when the length may differ.
    Length,
    /// Catch-all "anything changed" marker, named `[]`.
    Contents,
}

impl PropertyKey {
    pub const ALL: [Self; 2] = [Self::Length, Self::Contents];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::Contents => "[]",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Length => 0,
            Self::Contents => 1,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Entry point the property bridge calls. Implementations must tolerate
/// repeated invalidation of the same key.
pub trait PropertyInvalidator {
    fn invalidate(&self, key: PropertyKey);
}

type CallbackRc = Rc<dyn Fn(PropertyKey)>;
type CallbackWeak = Weak<dyn Fn(PropertyKey)>;

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    dirty: bool,
    invalidations: u64,
}

struct TableInner {
    slots: [Slot; 2],
    subscribers: Vec<(PropertyKey, CallbackWeak)>,
}

/// Dirty flags, counters, and property observers for [`PropertyKey`]s.
///
/// Cloning a `PropertyTable` creates a new handle to the **same** table.
#[derive(Clone)]
pub struct PropertyTable {
    inner: Rc<RefCell<TableInner>>,
}

impl Default for PropertyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PropertyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("PropertyTable")
            .field("length", &inner.slots[PropertyKey::Length.index()])
            .field("contents", &inner.slots[PropertyKey::Contents.index()])
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl PropertyTable {
    /// Create a table with every key clean.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(TableInner {
                slots: [Slot::default(); 2],
                subscribers: Vec::new(),
            })),
        }
    }

    /// Whether `key` has been invalidated since it was last marked clean.
    #[must_use]
    pub fn is_dirty(&self, key: PropertyKey) -> bool {
        self.inner.borrow().slots[key.index()].dirty
    }

    /// Total invalidations of `key` over the table's lifetime.
    #[must_use]
    pub fn invalidation_count(&self, key: PropertyKey) -> u64 {
        self.inner.borrow().slots[key.index()].invalidations
    }

    /// Clear the dirty flag, e.g. after the dependent value was recomputed.
    pub fn mark_clean(&self, key: PropertyKey) {
        self.inner.borrow_mut().slots[key.index()].dirty = false;
    }

    /// Observe invalidations of `key`.
    ///
    /// Returns a [`PropertySubscription`] guard; dropping it unsubscribes.
    pub fn observe(&self, key: PropertyKey, callback: impl Fn(PropertyKey) + 'static) -> PropertySubscription {
        let strong: CallbackRc = Rc::new(callback);
        self.inner
            .borrow_mut()
            .subscribers
            .push((key, Rc::downgrade(&strong)));
        PropertySubscription { _guard: strong }
    }

    /// Number of registered property observers (including dead ones not
    /// yet pruned).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    fn notify(&self, key: PropertyKey) {
        let callbacks: Vec<CallbackRc> = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|(_, w)| w.strong_count() > 0);
            inner
                .subscribers
                .iter()
                .filter(|(k, _)| *k == key)
                .filter_map(|(_, w)| w.upgrade())
                .collect()
        };
        for cb in &callbacks {
            cb(key);
        }
    }
}

impl PropertyInvalidator for PropertyTable {
    fn invalidate(&self, key: PropertyKey) {
        {
            let mut inner = self.inner.borrow_mut();
            let slot = &mut inner.slots[key.index()];
            slot.dirty = true;
            slot.invalidations += 1;
        }
        self.notify(key);
    }
}

/// RAII guard for a property observer.
///
/// Holds the only strong reference to the callback; the table keeps a
/// `Weak` that stops upgrading once this guard is dropped.
pub struct PropertySubscription {
    _guard: CallbackRc,
}

impl fmt::Debug for PropertySubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertySubscription").finish_non_exhaustive()
    }
}

struct CachedInner<T> {
    compute: Box<dyn Fn() -> T>,
    cached: Option<T>,
    version: u64,
}

/// A lazily recomputed value bound to one key of a [`PropertyTable`].
///
/// Becomes dirty whenever the key is invalidated; the next
/// [`get()`](Self::get) recomputes and caches the value.
///
/// Cloning a `CachedProperty` creates a new handle to the **same** cache.
pub struct CachedProperty<T> {
    inner: Rc<RefCell<CachedInner<T>>>,
    /// Kept outside the `RefCell` so an invalidation arriving while the
    /// compute function runs can still mark the value stale.
    dirty: Rc<Cell<bool>>,
    _subscription: Rc<PropertySubscription>,
}

impl<T> Clone for CachedProperty<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            dirty: Rc::clone(&self.dirty),
            _subscription: Rc::clone(&self._subscription),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CachedProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("CachedProperty")
            .field("cached", &inner.cached)
            .field("dirty", &self.dirty.get())
            .field("version", &inner.version)
            .finish()
    }
}

impl<T: Clone + 'static> CachedProperty<T> {
    /// Bind `compute` to `key` of `table`. Nothing is computed until the
    /// first `get()`.
    pub fn bind(table: &PropertyTable, key: PropertyKey, compute: impl Fn() -> T + 'static) -> Self {
        let dirty = Rc::new(Cell::new(true));
        let flag = Rc::downgrade(&dirty);
        let subscription = table.observe(key, move |_| {
            if let Some(flag) = flag.upgrade() {
                flag.set(true);
            }
        });
        Self {
            inner: Rc::new(RefCell::new(CachedInner {
                compute: Box::new(compute),
                cached: None,
                version: 0,
            })),
            dirty,
            _subscription: Rc::new(subscription),
        }
    }

    /// Current value, recomputing first if the key was invalidated.
    ///
    /// # Panics
    ///
    /// Panics if the compute function calls `get()` on the same property.
    #[must_use]
    pub fn get(&self) -> T {
        let mut inner = self.inner.borrow_mut();
        if !self.dirty.get()
            && let Some(value) = &inner.cached
        {
            return value.clone();
        }
        self.dirty.set(false);
        let value = (inner.compute)();
        inner.cached = Some(value.clone());
        inner.version += 1;
        value
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Force the next `get()` to recompute.
    pub fn invalidate(&self) {
        self.dirty.set(true);
    }

    /// Number of recomputations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }
}
