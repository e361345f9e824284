#![forbid(unsafe_code)]

//! Reference observable containers.
//!
//! Both keep their members in a `RefCell` so every mutator takes `&self`:
//! observers receive `&collection` during callbacks and may read it (or
//! start a cycle of their own, which the session rejects as nested).
//!
//! Every mutator wraps its change in a [`ChangeCycle`](crate::ChangeCycle),
//! so a failing `will_change` leaves the container untouched.
//!
//! A mutator called while the container already has a cycle pending (for
//! example from inside `will_change`) is refused with
//! [`ProtocolError::NestedBegin`] whatever the misuse policy, and changes
//! nothing. Mutating from `did_change` is fine: that cycle has already ended.
//! Bounds and positions are re-read after `will_change` returns.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::collection::ObservableCollection;
use crate::config::NotifierConfig;
use crate::descriptor::MutationDescriptor;
use crate::error::{ProtocolError, Result};
use crate::property::PropertyInvalidator;
use crate::protocol::{ChangeCycle, ChangeNotifier};

/// Enter a cycle for a container mutation, refusing it if one is pending.
fn enter_mutation<'a, C, T>(
    notifier: &'a ChangeNotifier<C, T>,
    collection: &'a C,
    descriptor: MutationDescriptor<T>,
) -> Result<ChangeCycle<'a, C, T>> {
    let cycle = notifier.cycle(collection, descriptor)?;
    if cycle.id().is_none() {
        return Err(ProtocolError::NestedBegin {
            cycle: notifier.session().cycle(),
        });
    }
    Ok(cycle)
}

/// An ordered, observable list.
pub struct ObservableVec<T> {
    content: RefCell<Vec<T>>,
    notifier: ChangeNotifier<Self, T>,
}

impl<T> Default for ObservableVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableVec")
            .field("content", &self.content.borrow())
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl<T> ObservableVec<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    #[must_use]
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            content: RefCell::new(items),
            notifier: ChangeNotifier::new(),
        }
    }

    #[must_use]
    pub fn with_invalidator(mut self, invalidator: Rc<dyn PropertyInvalidator>) -> Self {
        self.notifier = self.notifier.with_invalidator(invalidator);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: NotifierConfig) -> Self {
        self.notifier = self.notifier.with_config(config);
        self
    }

    /// Consume the container, returning its members.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.content.into_inner()
    }
}

impl<T: Clone> ObservableVec<T> {
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.content.borrow().get(index).cloned()
    }

    pub fn push(&self, item: T) -> Result<()> {
        let len = self.content.borrow().len();
        self.replace(len, 0, vec![item]).map(|_| ())
    }

    pub fn pop(&self) -> Result<Option<T>> {
        let len = self.content.borrow().len();
        if len == 0 {
            return Ok(None);
        }
        Ok(self.replace(len - 1, 1, Vec::new())?.pop())
    }

    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        self.replace(index, 0, vec![item]).map(|_| ())
    }

    /// Remove and return the member at `index`; `None` past the end.
    pub fn remove(&self, index: usize) -> Result<Option<T>> {
        if index >= self.content.borrow().len() {
            return Ok(None);
        }
        Ok(self.replace(index, 1, Vec::new())?.pop())
    }

    pub fn clear(&self) -> Result<()> {
        let len = self.content.borrow().len();
        self.replace(0, len, Vec::new()).map(|_| ())
    }

    /// Remove `amount` members at `index` and insert `items` in their place.
    ///
    /// `index` is clamped to the length and `amount` to the members after
    /// `index`. Returns the removed members. A replace that neither removes
    /// nor adds anything is not announced.
    pub fn replace(&self, index: usize, amount: usize, items: Vec<T>) -> Result<Vec<T>> {
        let (start, end) = self.clamp_range(index, amount);
        if start == end && items.is_empty() {
            return Ok(Vec::new());
        }

        let removed: Vec<T> = self.content.borrow()[start..end].to_vec();
        let cycle = enter_mutation(
            &self.notifier,
            self,
            MutationDescriptor::items(removed, items.clone()),
        )?;
        let (start, end) = self.clamp_range(index, amount);
        let removed: Vec<T> = self
            .content
            .borrow_mut()
            .splice(start..end, items.iter().cloned())
            .collect();
        cycle.finish(MutationDescriptor::items(removed.clone(), items))?;
        Ok(removed)
    }

    fn clamp_range(&self, index: usize, amount: usize) -> (usize, usize) {
        let len = self.content.borrow().len();
        let start = index.min(len);
        (start, start.saturating_add(amount).min(len))
    }

    /// Reverse in place. Announced as a same-count change, so `length` is
    /// left alone and only `[]` is invalidated.
    pub fn reverse(&self) -> Result<()> {
        let len = self.content.borrow().len();
        if len < 2 {
            return Ok(());
        }
        let cycle = enter_mutation(&self.notifier, self, MutationDescriptor::counts(len, len))?;
        self.content.borrow_mut().reverse();
        cycle.finish((len, len))
    }
}

impl<T: Clone> ObservableCollection for ObservableVec<T> {
    type Item = T;

    fn len(&self) -> usize {
        self.content.borrow().len()
    }

    fn object_at(&self, index: usize) -> Option<T> {
        self.get(index)
    }

    fn notifier(&self) -> &ChangeNotifier<Self, T> {
        &self.notifier
    }
}

/// An insertion-ordered collection of unique members.
pub struct ObservableSet<T> {
    content: RefCell<Vec<T>>,
    notifier: ChangeNotifier<Self, T>,
}

impl<T> Default for ObservableSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableSet")
            .field("content", &self.content.borrow())
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl<T> ObservableSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            content: RefCell::new(Vec::new()),
            notifier: ChangeNotifier::new(),
        }
    }

    #[must_use]
    pub fn with_invalidator(mut self, invalidator: Rc<dyn PropertyInvalidator>) -> Self {
        self.notifier = self.notifier.with_invalidator(invalidator);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: NotifierConfig) -> Self {
        self.notifier = self.notifier.with_config(config);
        self
    }
}

impl<T: Clone + PartialEq> ObservableSet<T> {
    /// Build a set, dropping duplicates after their first occurrence.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let mut content: Vec<T> = Vec::new();
        for item in items {
            if !content.contains(&item) {
                content.push(item);
            }
        }
        Self {
            content: RefCell::new(content),
            notifier: ChangeNotifier::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.content.borrow().contains(item)
    }

    /// Add `item` unless already present. Returns whether it was added;
    /// existing members are not announced.
    pub fn add_object(&self, item: T) -> Result<bool> {
        if self.contains(&item) {
            return Ok(false);
        }
        let descriptor = MutationDescriptor::items(Vec::new(), vec![item.clone()]);
        let cycle = enter_mutation(&self.notifier, self, descriptor.clone())?;
        if self.contains(&item) {
            cycle.finish(MutationDescriptor::counts(0, 0))?;
            return Ok(false);
        }
        self.content.borrow_mut().push(item);
        cycle.finish(descriptor)?;
        Ok(true)
    }

    /// Remove `item` if present. Returns whether it was removed.
    pub fn remove_object(&self, item: &T) -> Result<bool> {
        if !self.contains(item) {
            return Ok(false);
        }
        let descriptor = MutationDescriptor::items(vec![item.clone()], Vec::new());
        let cycle = enter_mutation(&self.notifier, self, descriptor.clone())?;
        let Some(pos) = self.position(item) else {
            cycle.finish(MutationDescriptor::counts(0, 0))?;
            return Ok(false);
        };
        self.content.borrow_mut().remove(pos);
        cycle.finish(descriptor)?;
        Ok(true)
    }

    fn position(&self, item: &T) -> Option<usize> {
        self.content.borrow().iter().position(|m| m == item)
    }
}

impl<T: Clone + PartialEq> ObservableCollection for ObservableSet<T> {
    type Item = T;

    fn len(&self) -> usize {
        self.content.borrow().len()
    }

    fn object_at(&self, index: usize) -> Option<T> {
        self.content.borrow().get(index).cloned()
    }

    fn notifier(&self) -> &ChangeNotifier<Self, T> {
        &self.notifier
    }
}
