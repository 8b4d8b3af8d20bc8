//! Credential injection gate.
//!
//! After the third challenge the negotiation has handed the nonce to the TPM
//! side and must hold its response until a SAS token comes back from a
//! different thread. The gate is a single-shot slot guarded by a condition
//! variable:
//!
//! ```text
//!  negotiation thread                      credential pipeline
//!  ──────────────────                      ───────────────────
//!  provide_nonce(nonce) ─────────────────► sign(nonce)
//!  gate.wait(timeout)  ◄── notify ──────── submitter.submit(token)
//! ```
//!
//! The wait wakes on submission, on cancellation, when the submitter is
//! dropped without submitting, or when the timeout elapses, whichever comes
//! first. There is no polling interval.

use std::{
    fmt,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// Why a token wait ended without a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCause {
    /// The timeout elapsed
    Elapsed,
    /// A [`CancelHandle`] fired
    Cancelled,
    /// The [`TokenSubmitter`] was dropped without submitting
    SubmitterDropped,
}

impl fmt::Display for WaitCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elapsed => f.write_str("timed out"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::SubmitterDropped => f.write_str("credential pipeline went away"),
        }
    }
}

/// Failed token wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitFailure {
    /// Why the wait ended
    pub cause: WaitCause,
    /// Time spent waiting
    pub waited: Duration,
}

#[derive(Debug, Default)]
struct SlotState {
    token: Option<String>,
    cancelled: bool,
    submitter_dropped: bool,
    waiter_gone: bool,
}

impl SlotState {
    fn pending(&self) -> bool {
        self.token.is_none() && !self.cancelled && !self.submitter_dropped
    }
}

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // The state is plain flags; a panicking holder cannot leave it torn.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut SlotState)) {
        f(&mut self.lock());
        self.ready.notify_all();
    }
}

/// Create a connected submitter/gate pair.
pub fn token_gate() -> (TokenSubmitter, TokenGate) {
    let slot = Arc::new(Slot::default());
    (TokenSubmitter { slot: Some(Arc::clone(&slot)) }, TokenGate { slot })
}

/// Write side of the gate, handed to the credential pipeline.
///
/// [`TokenSubmitter::submit`] consumes the submitter, so a token can be
/// supplied at most once.
#[derive(Debug)]
pub struct TokenSubmitter {
    slot: Option<Arc<Slot>>,
}

impl TokenSubmitter {
    /// Supply the SAS token and wake the waiting negotiation.
    ///
    /// A token supplied after the negotiation stopped waiting is stored and
    /// has no further effect.
    pub fn submit(mut self, token: impl Into<String>) {
        let Some(slot) = self.slot.take() else { return };
        let token = token.into();
        let len = token.len();

        let mut late = false;
        slot.update(|state| {
            late = state.waiter_gone;
            state.token = Some(token);
        });

        if late {
            tracing::debug!(len, "SAS token submitted after the negotiation stopped waiting");
        } else {
            tracing::debug!(len, "SAS token submitted");
        }
    }
}

impl Drop for TokenSubmitter {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.update(|state| state.submitter_dropped = true);
        }
    }
}

/// Cloneable handle that aborts a pending token wait from any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    slot: Arc<Slot>,
}

impl CancelHandle {
    /// Abort the wait.
    ///
    /// A token that was already submitted still wins.
    pub fn cancel(&self) {
        self.slot.update(|state| state.cancelled = true);
    }
}

/// Read side of the gate, owned by the negotiation.
#[derive(Debug)]
pub struct TokenGate {
    slot: Arc<Slot>,
}

impl TokenGate {
    /// Handle that can abort [`TokenGate::wait`].
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { slot: Arc::clone(&self.slot) }
    }

    /// True once a token has been submitted and not yet taken.
    pub fn is_fulfilled(&self) -> bool {
        self.slot.lock().token.is_some()
    }

    /// Block until a token arrives or `timeout` elapses.
    ///
    /// Returns immediately if the token was submitted before the call.
    ///
    /// # Errors
    ///
    /// [`WaitFailure`] when the timeout elapses, the wait is cancelled or the
    /// submitter is dropped before a token arrives.
    pub fn wait(&self, timeout: Duration) -> Result<String, WaitFailure> {
        let started = Instant::now();
        let guard = self.slot.lock();
        let (mut state, _) = self
            .slot
            .ready
            .wait_timeout_while(guard, timeout, |state| state.pending())
            .unwrap_or_else(PoisonError::into_inner);
        let waited = started.elapsed();

        if let Some(token) = state.token.take() {
            return Ok(token);
        }

        state.waiter_gone = true;
        let cause = if state.cancelled {
            WaitCause::Cancelled
        } else if state.submitter_dropped {
            WaitCause::SubmitterDropped
        } else {
            WaitCause::Elapsed
        };

        Err(WaitFailure { cause, waited })
    }
}
