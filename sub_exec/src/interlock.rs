//! # Enable interlock state machine
//!
//! The soft interlock gating the vehicle's actuation subsystem. The state is
//! owned by a single [`Interlock`] instance per process and every transition
//! runs under one mutex: a second toggle arriving while a transition is in
//! flight blocks until the first completes, so transitions are linearizable
//! and observers can never run interleaved.
//!
//! Transitions happen only on explicit triggers (a control message or the
//! operator's toggle button). Loss of the link does not change the state by
//! itself; the owning loop reacts to it by requesting an explicit disable.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};

use std::sync::Mutex;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The enable interlock.
///
/// Initial state is [`InterlockState::Disabled`].
pub struct Interlock {
    state: Mutex<InterlockState>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// State of the actuation soft interlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterlockState {
    /// Actuation is inhibited. All intents except the enable toggle are
    /// ignored.
    Disabled,

    /// Actuation is live.
    Enabled,
}

/// Outcome of a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The state changed and the observer's action ran.
    Entered(InterlockState),

    /// The machine was already in the requested state; nothing ran.
    NoChange(InterlockState),
}

// ---------------------------------------------------------------------------
// OBSERVER
// ---------------------------------------------------------------------------

/// Actions to run when the interlock changes state.
///
/// Observers run while the transition lock is held: a failing action leaves
/// the state unchanged, and no second transition can start until the action
/// returns.
pub trait InterlockObserver {
    /// An error which can occur while entering a state.
    type Error;

    /// Called on entering `Enabled`.
    fn on_enable(&mut self) -> Result<(), Self::Error>;

    /// Called on entering `Disabled`.
    fn on_disable(&mut self) -> Result<(), Self::Error>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Interlock {
    /// Create a new interlock in the `Disabled` state.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InterlockState::Disabled),
        }
    }

    /// The current state.
    pub fn state(&self) -> InterlockState {
        *self.state.lock().unwrap()
    }

    /// Request a transition to `Enabled`.
    ///
    /// A no-op if already enabled (no second enable action runs).
    pub fn enable<O: InterlockObserver>(&self, obs: &mut O) -> Result<Transition, O::Error> {
        self.transition(InterlockState::Enabled, obs)
    }

    /// Request a transition to `Disabled`.
    ///
    /// A no-op if already disabled.
    pub fn disable<O: InterlockObserver>(&self, obs: &mut O) -> Result<Transition, O::Error> {
        self.transition(InterlockState::Disabled, obs)
    }

    /// Toggle the state, as driven by the operator's enable button.
    pub fn toggle<O: InterlockObserver>(&self, obs: &mut O) -> Result<Transition, O::Error> {
        let target = {
            // Read under the lock so a toggle racing a transition still
            // resolves to one serialization of the two
            match *self.state.lock().unwrap() {
                InterlockState::Disabled => InterlockState::Enabled,
                InterlockState::Enabled => InterlockState::Disabled,
            }
        };

        self.transition(target, obs)
    }

    /// Execute one transition under the lock.
    fn transition<O: InterlockObserver>(
        &self,
        target: InterlockState,
        obs: &mut O,
    ) -> Result<Transition, O::Error> {
        let mut state = self.state.lock().unwrap();

        if *state == target {
            debug!("Interlock already {:?}, no transition", target);
            return Ok(Transition::NoChange(target));
        }

        // Run the entry action before committing the state, so a failed
        // action (e.g. the consumer could not be spawned) leaves the machine
        // where it was
        match target {
            InterlockState::Enabled => obs.on_enable()?,
            InterlockState::Disabled => obs.on_disable()?,
        }

        *state = target;
        info!("Interlock now {:?}", target);

        Ok(Transition::Entered(target))
    }
}

impl Default for Interlock {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Observer counting how many times each action ran.
    #[derive(Default)]
    struct CountingObserver {
        enables: usize,
        disables: usize,
    }

    impl InterlockObserver for CountingObserver {
        type Error = ();

        fn on_enable(&mut self) -> Result<(), ()> {
            self.enables += 1;
            Ok(())
        }

        fn on_disable(&mut self) -> Result<(), ()> {
            self.disables += 1;
            Ok(())
        }
    }

    /// Observer that refuses to enter the enabled state.
    struct FailingObserver;

    impl InterlockObserver for FailingObserver {
        type Error = &'static str;

        fn on_enable(&mut self) -> Result<(), &'static str> {
            Err("spawn failed")
        }

        fn on_disable(&mut self) -> Result<(), &'static str> {
            Ok(())
        }
    }

    #[test]
    fn test_initial_state_disabled() {
        assert_eq!(Interlock::new().state(), InterlockState::Disabled);
    }

    #[test]
    fn test_enable_idempotent() {
        let interlock = Interlock::new();
        let mut obs = CountingObserver::default();

        assert_eq!(
            interlock.enable(&mut obs).unwrap(),
            Transition::Entered(InterlockState::Enabled)
        );
        assert_eq!(
            interlock.enable(&mut obs).unwrap(),
            Transition::NoChange(InterlockState::Enabled)
        );

        // Only one enable action ran, no second consumer would be spawned
        assert_eq!(obs.enables, 1);
    }

    #[test]
    fn test_disable_idempotent() {
        let interlock = Interlock::new();
        let mut obs = CountingObserver::default();

        assert_eq!(
            interlock.disable(&mut obs).unwrap(),
            Transition::NoChange(InterlockState::Disabled)
        );
        assert_eq!(obs.disables, 0);
    }

    #[test]
    fn test_toggle_cycles() {
        let interlock = Interlock::new();
        let mut obs = CountingObserver::default();

        interlock.toggle(&mut obs).unwrap();
        assert_eq!(interlock.state(), InterlockState::Enabled);
        interlock.toggle(&mut obs).unwrap();
        assert_eq!(interlock.state(), InterlockState::Disabled);

        assert_eq!(obs.enables, 1);
        assert_eq!(obs.disables, 1);
    }

    #[test]
    fn test_failed_action_leaves_state() {
        let interlock = Interlock::new();

        assert!(interlock.enable(&mut FailingObserver).is_err());
        assert_eq!(interlock.state(), InterlockState::Disabled);
    }

    /// Observer sharing counters so racing threads can be checked.
    struct SharedObserver {
        enables: Arc<AtomicUsize>,
        disables: Arc<AtomicUsize>,
    }

    impl InterlockObserver for SharedObserver {
        type Error = ();

        fn on_enable(&mut self) -> Result<(), ()> {
            self.enables.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_disable(&mut self) -> Result<(), ()> {
            self.disables.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_concurrent_requests_serialize() {
        let interlock = Arc::new(Interlock::new());
        let enables = Arc::new(AtomicUsize::new(0));
        let disables = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for request_enable in &[true, false] {
            let request_enable = *request_enable;
            let interlock = interlock.clone();
            let mut obs = SharedObserver {
                enables: enables.clone(),
                disables: disables.clone(),
            };

            handles.push(std::thread::spawn(move || {
                if request_enable {
                    interlock.enable(&mut obs).unwrap();
                } else {
                    interlock.disable(&mut obs).unwrap();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        // Either serialization is fine, but the counts must be consistent
        // with the final state: starting Disabled, state is Enabled iff the
        // enable ran after the disable
        let n_en = enables.load(Ordering::SeqCst);
        let n_dis = disables.load(Ordering::SeqCst);
        match interlock.state() {
            InterlockState::Enabled => {
                assert_eq!(n_en, 1);
                assert_eq!(n_dis, 0);
            }
            InterlockState::Disabled => {
                assert_eq!(n_en, 1);
                assert_eq!(n_dis, 1);
            }
        }
    }
}
