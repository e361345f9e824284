#![forbid(unsafe_code)]

//! The change-notification protocol.
//!
//! # Design
//!
//! [`ChangeNotifier`] is embedded in every observable collection and owns the
//! collection's [`ChangeSession`], [`ObserverRegistry`], and
//! [`PropertyBridge`]. A container brackets each mutation:
//!
//! ```text
//! begin(desc) -> will_change to observers
//! <container mutates itself>
//! end(desc)   -> did_change to observers -> property bridge
//! ```
//!
//! Prefer [`ChangeNotifier::cycle`], which returns a [`ChangeCycle`] guard:
//! the pending state is released on every exit path, so an early return or
//! a `?` in the mutation can never leave the collection unable to notify.
//!
//! # Invariants
//!
//! 1. At most one cycle is pending per collection.
//! 2. Each observer sees at most one `will_change` and one `did_change` per
//!    cycle.
//! 3. Observers receive the end-call descriptor on `did_change`, even when it
//!    differs in shape from the begin-call descriptor.
//! 4. Property invalidation happens only after `did_change` delivery, never
//!    at begin.
//!
//! # Failure Modes
//!
//! - **Nested begin / end without begin**: reported per
//!   [`MisusePolicy`]; state is left untouched and nothing is delivered.
//! - **Observer fails in `will_change`**: the cycle is aborted (session back
//!   to `Idle`, nothing invalidated) and the error is returned. The caller
//!   must not perform the mutation.
//! - **Observer fails in `did_change`**: the session is already `Idle` and
//!   the bridge still runs; the error is returned afterwards.
//! - **Guard dropped without `finish`**: the session is released, observers
//!   get a best-effort `did_change(Unspecified)`, and both properties are
//!   invalidated. While the thread is panicking only the session is
//!   released; observers and property callbacks are not called, so cached
//!   properties may be stale after a caught panic.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::bridge::{Invalidation, PropertyBridge};
use crate::config::{MisusePolicy, NotifierConfig};
use crate::descriptor::MutationDescriptor;
use crate::error::{ProtocolError, Result};
use crate::property::PropertyInvalidator;
use crate::registry::{EnumerableObserver, ObserverRegistry};
use crate::session::{ChangeSession, SessionState, Transition};

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotifierStats {
    pub cycles_completed: u64,
    pub cycles_abandoned: u64,
    pub misuse_count: u64,
}

/// Orchestrates begin/end announcements for one collection of type `C`
/// holding items of type `T`.
pub struct ChangeNotifier<C: ?Sized, T> {
    session: ChangeSession,
    observers: ObserverRegistry<C, T>,
    bridge: PropertyBridge,
    config: NotifierConfig,
    cycles_completed: Cell<u64>,
    cycles_abandoned: Cell<u64>,
    misuse_count: Cell<u64>,
}

impl<C: ?Sized, T> Default for ChangeNotifier<C, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized, T> fmt::Debug for ChangeNotifier<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("state", &self.session.state())
            .field("cycle", &self.session.cycle())
            .field("observers", &self.observers.len())
            .field("bridge", &self.bridge)
            .field("config", &self.config)
            .finish()
    }
}

impl<C: ?Sized, T> ChangeNotifier<C, T> {
    /// A notifier with no invalidation collaborator and default config.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: ChangeSession::new(),
            observers: ObserverRegistry::new(),
            bridge: PropertyBridge::detached(),
            config: NotifierConfig::default(),
            cycles_completed: Cell::new(0),
            cycles_abandoned: Cell::new(0),
            misuse_count: Cell::new(0),
        }
    }

    /// Inject the property/dependency system the bridge invalidates.
    #[must_use]
    pub fn with_invalidator(mut self, invalidator: Rc<dyn PropertyInvalidator>) -> Self {
        self.bridge = PropertyBridge::new(invalidator);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: NotifierConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> NotifierConfig {
        self.config
    }

    #[must_use]
    pub fn session(&self) -> &ChangeSession {
        &self.session
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.session.is_pending()
    }

    #[must_use]
    pub fn observers(&self) -> &ObserverRegistry<C, T> {
        &self.observers
    }

    #[must_use]
    pub fn bridge(&self) -> &PropertyBridge {
        &self.bridge
    }

    #[must_use]
    pub fn stats(&self) -> NotifierStats {
        NotifierStats {
            cycles_completed: self.cycles_completed.get(),
            cycles_abandoned: self.cycles_abandoned.get(),
            misuse_count: self.misuse_count.get(),
        }
    }

    pub fn add_observer<O>(&self, observer: &Rc<O>) -> bool
    where
        O: EnumerableObserver<C, T> + 'static,
    {
        self.observers.add(observer)
    }

    pub fn remove_observer<O: ?Sized>(&self, observer: &Rc<O>) -> bool {
        self.observers.remove(observer)
    }

    #[must_use]
    pub fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    /// Announce that `collection` is about to mutate.
    pub fn begin(&self, collection: &C, descriptor: impl Into<MutationDescriptor<T>>) -> Result<()> {
        self.begin_ref(collection, &descriptor.into()).map(|_| ())
    }

    /// Announce that `collection` finished mutating.
    ///
    /// `descriptor` is authoritative for observers and invalidation, whatever
    /// was passed to the matching `begin`.
    pub fn end(&self, collection: &C, descriptor: impl Into<MutationDescriptor<T>>) -> Result<()> {
        self.end_ref(collection, &descriptor.into())
    }

    /// Begin a scoped cycle. Finish it with [`ChangeCycle::finish`].
    ///
    /// If a cycle is already pending the misuse is reported and the returned
    /// guard is inert: finishing or dropping it does nothing.
    pub fn cycle<'a>(
        &'a self,
        collection: &'a C,
        descriptor: impl Into<MutationDescriptor<T>>,
    ) -> Result<ChangeCycle<'a, C, T>> {
        let cycle = self.begin_ref(collection, &descriptor.into())?;
        Ok(ChangeCycle {
            notifier: self,
            collection,
            cycle,
        })
    }

    /// Did-only announcement for callers that never issue a begin.
    ///
    /// In `Idle` this runs a full begin/end pair with `descriptor`. In
    /// `Pending` it only ends the cycle, so a collaborator that already
    /// announced the begin does not see `will_change` twice.
    pub fn announce(&self, collection: &C, descriptor: impl Into<MutationDescriptor<T>>) -> Result<()> {
        let descriptor = descriptor.into();
        if !self.session.is_pending() {
            self.begin_ref(collection, &descriptor)?;
        }
        self.end_ref(collection, &descriptor)
    }

    /// Returns the entered cycle id, or `None` if the begin was misuse.
    fn begin_ref(&self, collection: &C, descriptor: &MutationDescriptor<T>) -> Result<Option<u64>> {
        let cycle = match self.session.enter(descriptor.shape()) {
            Ok(cycle) => cycle,
            Err(transition) => return self.misuse(transition).map(|()| None),
        };
        tracing::trace!(cycle, shape = ?descriptor.shape(), "change cycle begin");

        if let Err(err) = self.observers.notify_will_change(collection, descriptor, cycle) {
            // The mutation has not happened yet; abort the cycle.
            let _ = self.session.exit();
            tracing::debug!(cycle, error = %err, "will_change failed; cycle aborted");
            return Err(err.into());
        }
        Ok(Some(cycle))
    }

    fn end_ref(&self, collection: &C, descriptor: &MutationDescriptor<T>) -> Result<()> {
        let (cycle, begin_shape) = match self.session.exit() {
            Ok(exited) => exited,
            Err(transition) => return self.misuse(transition),
        };
        if begin_shape != descriptor.shape() {
            tracing::debug!(
                cycle,
                begin = ?begin_shape,
                end = ?descriptor.shape(),
                "descriptor shape changed between begin and end"
            );
        }

        let delivered = self.observers.notify_did_change(collection, descriptor, cycle);
        let invalidation = self.bridge.apply(descriptor);
        self.cycles_completed.set(self.cycles_completed.get() + 1);
        tracing::trace!(
            cycle,
            length = invalidation.length,
            contents = invalidation.contents,
            "change cycle end"
        );
        delivered?;
        Ok(())
    }

    /// Release a cycle whose guard was dropped without `finish`.
    fn abandon(&self, collection: &C, cycle: u64) {
        if !self.owns(cycle) {
            return;
        }
        let _ = self.session.exit();
        self.cycles_abandoned.set(self.cycles_abandoned.get() + 1);
        tracing::warn!(cycle, "change cycle dropped without end; releasing");

        // No user callbacks during unwinding: a second panic would abort.
        if std::thread::panicking() {
            return;
        }
        if let Err(err) =
            self.observers
                .notify_did_change(collection, &MutationDescriptor::Unspecified, cycle)
        {
            tracing::error!(cycle, error = %err, "observer failed while releasing abandoned cycle");
        }
        self.bridge.signal(Invalidation::all());
    }

    /// Whether `cycle` is the one currently pending.
    fn owns(&self, cycle: u64) -> bool {
        self.session.is_pending() && self.session.cycle() == cycle
    }

    fn misuse(&self, transition: Transition) -> Result<()> {
        self.misuse_count.set(self.misuse_count.get() + 1);
        let err = match transition {
            Transition::AlreadyPending { cycle } => ProtocolError::NestedBegin { cycle },
            Transition::NotPending => ProtocolError::EndWithoutBegin,
        };
        match self.config.misuse {
            MisusePolicy::Ignore => Ok(()),
            MisusePolicy::Warn => {
                tracing::warn!(error = %err, "change protocol misuse ignored");
                Ok(())
            }
            MisusePolicy::DebugAssert => {
                if cfg!(debug_assertions) {
                    panic!("change protocol misuse: {err}");
                }
                tracing::warn!(error = %err, "change protocol misuse ignored");
                Ok(())
            }
            MisusePolicy::Reject => Err(err),
        }
    }
}

/// Scoped change cycle returned by [`ChangeNotifier::cycle`].
///
/// Call [`finish`](Self::finish) after the mutation. Dropping the guard
/// instead releases the pending state (see the module docs).
#[must_use = "dropping a ChangeCycle abandons the cycle"]
pub struct ChangeCycle<'a, C: ?Sized, T> {
    notifier: &'a ChangeNotifier<C, T>,
    collection: &'a C,
    cycle: Option<u64>,
}

impl<C: ?Sized, T> fmt::Debug for ChangeCycle<'_, C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeCycle")
            .field("cycle", &self.cycle)
            .finish_non_exhaustive()
    }
}

impl<C: ?Sized, T> ChangeCycle<'_, C, T> {
    /// Id of the owned cycle; `None` for an inert guard.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.cycle
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cycle.is_some_and(|cycle| self.notifier.owns(cycle))
    }

    /// End the cycle with the authoritative descriptor.
    pub fn finish(mut self, descriptor: impl Into<MutationDescriptor<T>>) -> Result<()> {
        match self.cycle.take() {
            Some(cycle) if self.notifier.owns(cycle) => {
                self.notifier.end_ref(self.collection, &descriptor.into())
            }
            _ => Ok(()),
        }
    }
}

impl<C: ?Sized, T> Drop for ChangeCycle<'_, C, T> {
    fn drop(&mut self) {
        if let Some(cycle) = self.cycle.take() {
            self.notifier.abandon(self.collection, cycle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ObserverError;
    use crate::property::{PropertyKey, PropertyTable};
    use std::cell::RefCell;

    #[derive(Debug)]
    struct Subject;

    type Log = Rc<RefCell<Vec<(&'static str, MutationDescriptor<&'static str>)>>>;

    struct Recorder {
        log: Log,
    }

    impl EnumerableObserver<Subject, &'static str> for Recorder {
        fn will_change(
            &self,
            _collection: &Subject,
            descriptor: &MutationDescriptor<&'static str>,
        ) -> std::result::Result<(), ObserverError> {
            self.log.borrow_mut().push(("will", descriptor.clone()));
            Ok(())
        }

        fn did_change(
            &self,
            _collection: &Subject,
            descriptor: &MutationDescriptor<&'static str>,
        ) -> std::result::Result<(), ObserverError> {
            self.log.borrow_mut().push(("did", descriptor.clone()));
            Ok(())
        }
    }

    fn setup() -> (ChangeNotifier<Subject, &'static str>, PropertyTable, Rc<Recorder>, Log) {
        let table = PropertyTable::new();
        let notifier = ChangeNotifier::new().with_invalidator(Rc::new(table.clone()));
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let recorder = Rc::new(Recorder {
            log: Rc::clone(&log),
        });
        notifier.add_observer(&recorder);
        (notifier, table, recorder, log)
    }

    #[test]
    fn no_arg_cycle_notifies_and_invalidates_length() {
        let (notifier, table, _rec, log) = setup();
        notifier.begin(&Subject, ()).unwrap();
        assert!(notifier.is_pending());
        assert_eq!(table.invalidation_count(PropertyKey::Length), 0);

        notifier.end(&Subject, ()).unwrap();
        assert_eq!(notifier.state(), SessionState::Idle);
        assert_eq!(
            *log.borrow(),
            vec![
                ("will", MutationDescriptor::Unspecified),
                ("did", MutationDescriptor::Unspecified)
            ]
        );
        assert_eq!(table.invalidation_count(PropertyKey::Length), 1);
        assert_eq!(table.invalidation_count(PropertyKey::Contents), 1);
    }

    #[test]
    fn end_descriptor_is_authoritative() {
        let (notifier, table, _rec, log) = setup();
        notifier.begin(&Subject, ()).unwrap();
        notifier
            .end(&Subject, MutationDescriptor::items(["bar"], ["foo"]))
            .unwrap();
        assert_eq!(log.borrow()[1].1, MutationDescriptor::items(["bar"], ["foo"]));
        assert_eq!(table.invalidation_count(PropertyKey::Length), 0);
        assert_eq!(table.invalidation_count(PropertyKey::Contents), 1);
    }

    #[test]
    fn nested_begin_is_noop_under_warn() {
        let (notifier, _table, _rec, log) = setup();
        notifier.begin(&Subject, ()).unwrap();
        notifier.begin(&Subject, ()).unwrap();
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(notifier.stats().misuse_count, 1);
        notifier.end(&Subject, ()).unwrap();
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn end_without_begin_is_noop_under_warn() {
        let (notifier, table, _rec, log) = setup();
        notifier.end(&Subject, ()).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(table.invalidation_count(PropertyKey::Contents), 0);
        assert_eq!(notifier.stats().misuse_count, 1);
    }

    #[test]
    fn reject_policy_surfaces_misuse() {
        let notifier: ChangeNotifier<Subject, ()> = ChangeNotifier::new()
            .with_config(NotifierConfig::new().with_misuse(MisusePolicy::Reject));
        let err = notifier.end(&Subject, ()).unwrap_err();
        assert!(matches!(err, ProtocolError::EndWithoutBegin));

        notifier.begin(&Subject, ()).unwrap();
        let err = notifier.begin(&Subject, ()).unwrap_err();
        assert!(matches!(err, ProtocolError::NestedBegin { cycle: 1 }));
        assert!(notifier.is_pending());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "change protocol misuse")]
    fn debug_assert_policy_panics_in_debug() {
        let notifier: ChangeNotifier<Subject, ()> = ChangeNotifier::new()
            .with_config(NotifierConfig::new().with_misuse(MisusePolicy::DebugAssert));
        let _ = notifier.end(&Subject, ());
    }

    #[test]
    fn guard_finish_completes_cycle() {
        let (notifier, table, _rec, log) = setup();
        let cycle = notifier.cycle(&Subject, (1usize, 2usize)).unwrap();
        assert!(cycle.is_active());
        assert_eq!(cycle.id(), Some(1));
        cycle.finish((1usize, 2usize)).unwrap();
        assert!(!notifier.is_pending());
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(table.invalidation_count(PropertyKey::Length), 1);
        assert_eq!(notifier.stats().cycles_completed, 1);
    }

    #[test]
    fn dropped_guard_releases_session() {
        let (notifier, table, _rec, log) = setup();
        {
            let _cycle = notifier
                .cycle(&Subject, MutationDescriptor::items(["a"], ["b"]))
                .unwrap();
        }
        assert!(!notifier.is_pending());
        assert_eq!(log.borrow()[1], ("did", MutationDescriptor::Unspecified));
        assert_eq!(table.invalidation_count(PropertyKey::Length), 1);
        assert_eq!(notifier.stats().cycles_abandoned, 1);

        // The session is usable again.
        notifier.begin(&Subject, ()).unwrap();
        notifier.end(&Subject, ()).unwrap();
        assert_eq!(log.borrow().len(), 4);
    }

    #[test]
    fn guard_dropped_while_unwinding_skips_callbacks() {
        let (notifier, table, _rec, log) = setup();
        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _cycle = notifier.cycle(&Subject, ()).unwrap();
            panic!("mutation failed");
        }));
        assert!(unwound.is_err());

        assert!(!notifier.is_pending());
        assert_eq!(notifier.stats().cycles_abandoned, 1);
        // Only the will_change from before the panic.
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(table.invalidation_count(PropertyKey::Length), 0);
        assert_eq!(table.invalidation_count(PropertyKey::Contents), 0);
    }

    #[test]
    fn nested_guard_is_inert() {
        let (notifier, _table, _rec, log) = setup();
        let outer = notifier.cycle(&Subject, ()).unwrap();
        let inner = notifier.cycle(&Subject, ()).unwrap();
        assert_eq!(inner.id(), None);
        inner.finish(()).unwrap();
        assert!(notifier.is_pending());
        outer.finish(()).unwrap();
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn announce_from_idle_runs_full_pair() {
        let (notifier, _table, _rec, log) = setup();
        notifier.announce(&Subject, ()).unwrap();
        let kinds: Vec<_> = log.borrow().iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec!["will", "did"]);
        assert!(!notifier.is_pending());
    }

    #[test]
    fn announce_while_pending_does_not_refire_will() {
        let (notifier, _table, _rec, log) = setup();
        notifier.begin(&Subject, ()).unwrap();
        notifier.announce(&Subject, ()).unwrap();
        let kinds: Vec<_> = log.borrow().iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec!["will", "did"]);
        assert_eq!(notifier.stats().misuse_count, 0);
    }

    #[test]
    fn will_change_failure_aborts_cycle() {
        let table = PropertyTable::new();
        let notifier: ChangeNotifier<Subject, ()> =
            ChangeNotifier::new().with_invalidator(Rc::new(table.clone()));
        let failing = Rc::new(crate::registry::observer_fn(
            |_: &Subject, _: &MutationDescriptor<()>| Err(ObserverError::new("veto")),
            |_: &Subject, _: &MutationDescriptor<()>| Ok(()),
        ));
        notifier.add_observer(&failing);

        let err = notifier.begin(&Subject, ()).unwrap_err();
        assert!(!err.is_misuse());
        assert!(!notifier.is_pending());
        assert_eq!(table.invalidation_count(PropertyKey::Contents), 0);
    }

    #[test]
    fn did_change_failure_still_invalidates() {
        let table = PropertyTable::new();
        let notifier: ChangeNotifier<Subject, ()> =
            ChangeNotifier::new().with_invalidator(Rc::new(table.clone()));
        let failing = Rc::new(crate::registry::observer_fn(
            |_: &Subject, _: &MutationDescriptor<()>| Ok(()),
            |_: &Subject, _: &MutationDescriptor<()>| Err(ObserverError::new("boom")),
        ));
        notifier.add_observer(&failing);

        notifier.begin(&Subject, ()).unwrap();
        let err = notifier.end(&Subject, ()).unwrap_err();
        assert_eq!(err.to_string(), "observer failed: boom");
        assert!(!notifier.is_pending());
        assert_eq!(table.invalidation_count(PropertyKey::Length), 1);
        assert_eq!(table.invalidation_count(PropertyKey::Contents), 1);
    }

    #[test]
    fn removed_while_pending_gets_no_did_change() {
        let (notifier, _table, rec, log) = setup();
        notifier.begin(&Subject, ()).unwrap();
        assert!(notifier.remove_observer(&rec));
        notifier.end(&Subject, ()).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn empty_registry_cycle_without_invalidator() {
        let notifier: ChangeNotifier<Subject, u32> = ChangeNotifier::new();
        assert!(!notifier.has_observers());
        notifier.begin(&Subject, (vec![1], vec![2, 3])).unwrap();
        notifier.end(&Subject, (vec![1], vec![2, 3])).unwrap();
        assert_eq!(notifier.state(), SessionState::Idle);
        let dbg = format!("{notifier:?}");
        assert!(dbg.contains("Idle"));
    }
}
