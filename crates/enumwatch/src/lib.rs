#![forbid(unsafe_code)]

//! Enumwatch public facade crate.
//!
//! This crate provides the stable surface area for users.

pub mod prelude {
    pub use enumwatch_core as core;

    pub use enumwatch_core::{
        ChangeCycle, ChangeNotifier, EnumerableObserver, MutationDescriptor, ObservableCollection,
        ObservableSet, ObservableVec, ObserverError, PropertyInvalidator, PropertyKey, PropertyTable,
        ProtocolError, observer_fn,
    };
}
