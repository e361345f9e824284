#![forbid(unsafe_code)]

//! Property bridge: turns a completed change cycle into invalidation signals.
//!
//! `[]` is invalidated on every completed cycle. `length` is invalidated only
//! when the end-call descriptor says the length may have changed.
//! The bridge never recomputes anything; it only calls
//! [`PropertyInvalidator::invalidate`].

use std::fmt;
use std::rc::Rc;

use crate::descriptor::MutationDescriptor;
use crate::property::{PropertyInvalidator, PropertyKey};

/// Which properties a cycle invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Invalidation {
    pub length: bool,
    pub contents: bool,
}

impl Invalidation {
    /// Decision for a descriptor, independent of any attached invalidator.
    #[must_use]
    pub fn for_descriptor<T>(descriptor: &MutationDescriptor<T>) -> Self {
        Self {
            length: descriptor.length_may_have_changed(),
            contents: true,
        }
    }

    #[must_use]
    pub const fn all() -> Self {
        Self {
            length: true,
            contents: true,
        }
    }
}

/// Holds the injected invalidation collaborator, if any.
#[derive(Clone, Default)]
pub struct PropertyBridge {
    invalidator: Option<Rc<dyn PropertyInvalidator>>,
}

impl fmt::Debug for PropertyBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBridge")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl PropertyBridge {
    #[must_use]
    pub fn new(invalidator: Rc<dyn PropertyInvalidator>) -> Self {
        Self {
            invalidator: Some(invalidator),
        }
    }

    /// A bridge with nothing to invalidate.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.invalidator.is_some()
    }

    /// Signal the invalidations a cycle ending with `descriptor` implies.
    ///
    /// Returns the decision even when detached.
    pub fn apply<T>(&self, descriptor: &MutationDescriptor<T>) -> Invalidation {
        let decision = Invalidation::for_descriptor(descriptor);
        self.signal(decision);
        decision
    }

    pub(crate) fn signal(&self, decision: Invalidation) {
        let Some(invalidator) = &self.invalidator else {
            return;
        };
        if decision.length {
            invalidator.invalidate(PropertyKey::Length);
        }
        if decision.contents {
            invalidator.invalidate(PropertyKey::Contents);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyTable;

    fn attached() -> (PropertyTable, PropertyBridge) {
        let table = PropertyTable::new();
        let bridge = PropertyBridge::new(Rc::new(table.clone()));
        (table, bridge)
    }

    #[test]
    fn unspecified_invalidates_both() {
        let (table, bridge) = attached();
        let inv = bridge.apply(&MutationDescriptor::<()>::unspecified());
        assert_eq!(inv, Invalidation::all());
        assert!(table.is_dirty(PropertyKey::Length));
        assert!(table.is_dirty(PropertyKey::Contents));
    }

    #[test]
    fn equal_items_skip_length() {
        let (table, bridge) = attached();
        let inv = bridge.apply(&MutationDescriptor::items(["bar"], ["foo"]));
        assert!(!inv.length);
        assert!(inv.contents);
        assert_eq!(table.invalidation_count(PropertyKey::Length), 0);
        assert_eq!(table.invalidation_count(PropertyKey::Contents), 1);
    }

    #[test]
    fn count_delta_invalidates_length() {
        let (table, bridge) = attached();
        bridge.apply(&MutationDescriptor::<()>::counts(1, 2));
        assert_eq!(table.invalidation_count(PropertyKey::Length), 1);
    }

    #[test]
    fn length_signaled_before_contents() {
        let (table, bridge) = attached();
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        let o1 = Rc::clone(&order);
        let o2 = Rc::clone(&order);
        let _a = table.observe(PropertyKey::Contents, move |k| o1.borrow_mut().push(k));
        let _b = table.observe(PropertyKey::Length, move |k| o2.borrow_mut().push(k));
        bridge.apply(&MutationDescriptor::<()>::unspecified());
        assert_eq!(*order.borrow(), vec![PropertyKey::Length, PropertyKey::Contents]);
    }

    #[test]
    fn detached_bridge_still_decides() {
        let bridge = PropertyBridge::detached();
        assert!(!bridge.is_attached());
        let inv = bridge.apply(&MutationDescriptor::<()>::counts(2, 2));
        assert_eq!(
            inv,
            Invalidation {
                length: false,
                contents: true
            }
        );
    }
}
