#![forbid(unsafe_code)]

//! The `ObservableCollection` capability.
//!
//! A container becomes observable by reporting its length, exposing its
//! members by index, and handing out its embedded [`ChangeNotifier`]. The
//! provided methods are the protocol surface container authors call.

use std::rc::Rc;

use crate::descriptor::MutationDescriptor;
use crate::error::Result;
use crate::protocol::ChangeNotifier;
use crate::registry::EnumerableObserver;

pub trait ObservableCollection {
    type Item;

    fn len(&self) -> usize;

    /// Member at `index`, or `None` past the end.
    fn object_at(&self, index: usize) -> Option<Self::Item>;

    /// The collection's own notifier, created with the collection.
    fn notifier(&self) -> &ChangeNotifier<Self, Self::Item>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate members in index order.
    fn objects(&self) -> Objects<'_, Self>
    where
        Self: Sized,
    {
        Objects {
            collection: self,
            index: 0,
        }
    }

    fn to_vec(&self) -> Vec<Self::Item>
    where
        Self: Sized,
    {
        self.objects().collect()
    }

    fn enumerable_content_will_change(
        &self,
        descriptor: impl Into<MutationDescriptor<Self::Item>>,
    ) -> Result<()> {
        self.notifier().begin(self, descriptor)
    }

    fn enumerable_content_did_change(
        &self,
        descriptor: impl Into<MutationDescriptor<Self::Item>>,
    ) -> Result<()> {
        self.notifier().end(self, descriptor)
    }

    fn add_enumerable_observer<O>(&self, observer: &Rc<O>) -> bool
    where
        O: EnumerableObserver<Self, Self::Item> + 'static,
    {
        self.notifier().add_observer(observer)
    }

    fn remove_enumerable_observer<O: ?Sized>(&self, observer: &Rc<O>) -> bool {
        self.notifier().remove_observer(observer)
    }

    fn has_enumerable_observers(&self) -> bool {
        self.notifier().has_observers()
    }
}

/// Iterator returned by [`ObservableCollection::objects`].
///
/// Reads through `object_at`, so it reflects mutations made while iterating.
#[derive(Debug)]
pub struct Objects<'a, C> {
    collection: &'a C,
    index: usize,
}

impl<C: ObservableCollection> Iterator for Objects<'_, C> {
    type Item = C::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.collection.object_at(self.index)?;
        self.index += 1;
        Some(item)
    }
}
