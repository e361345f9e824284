#![forbid(unsafe_code)]

//! Mutation-notification protocol for observable collections.
//!
//! Any container can announce "about to mutate" and "just mutated"; every
//! registered observer hears about it exactly once per cycle, with a
//! normalized [`MutationDescriptor`], and the collection's derived `length`
//! and `[]` properties are invalidated only when the change could have
//! affected them.
//!
//! - [`MutationDescriptor`]: what changed (nothing specified, item lists, or
//!   count pairs).
//! - [`ChangeSession`]: the per-collection `Idle`/`Pending` state machine.
//! - [`ObserverRegistry`]: weakly held [`EnumerableObserver`]s.
//! - [`PropertyBridge`]: invalidation signals after each completed cycle.
//! - [`ChangeNotifier`]: the begin/end entry points tying it together, with
//!   the scoped [`ChangeCycle`] guard.
//! - [`ObservableCollection`]: the capability containers implement;
//!   [`ObservableVec`] and [`ObservableSet`] are ready-made ones.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use enumwatch_core::{
//!     ObservableCollection, ObservableVec, PropertyKey, PropertyTable,
//! };
//!
//! let props = PropertyTable::new();
//! let list = ObservableVec::from_vec(vec!["bar"]).with_invalidator(Rc::new(props.clone()));
//!
//! // Same-length replace: `[]` changes, `length` does not.
//! list.replace(0, 1, vec!["foo"]).unwrap();
//! assert_eq!(props.invalidation_count(PropertyKey::Length), 0);
//! assert_eq!(props.invalidation_count(PropertyKey::Contents), 1);
//!
//! list.push("baz").unwrap();
//! assert_eq!(props.invalidation_count(PropertyKey::Length), 1);
//! assert_eq!(list.len(), 2);
//! ```
//!
//! # Threading
//!
//! Everything here is single-threaded (`Rc`/`RefCell`/`Cell`). Callbacks run
//! synchronously on the caller's stack.

pub mod bridge;
pub mod collection;
pub mod config;
pub mod containers;
pub mod descriptor;
pub mod error;
pub mod property;
pub mod protocol;
pub mod registry;
pub mod session;

pub use bridge::{Invalidation, PropertyBridge};
pub use collection::{ObservableCollection, Objects};
pub use config::{MisusePolicy, NotifierConfig};
pub use containers::{ObservableSet, ObservableVec};
pub use descriptor::{DescriptorShape, MutationDescriptor};
pub use error::{ObserverError, ProtocolError, Result};
pub use property::{CachedProperty, PropertyInvalidator, PropertyKey, PropertySubscription, PropertyTable};
pub use protocol::{ChangeCycle, ChangeNotifier, NotifierStats};
pub use registry::{EnumerableObserver, FnObserver, ObserverRegistry, observer_fn};
pub use session::{ChangeSession, SessionState};
