use super::LifecycleError;
use std::fmt;
use tokio::sync::watch;

/// Observable phase of the lifecycle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Not started.
    #[default]
    Idle,
    /// Generating a key and CSR.
    Issuing,
    /// Waiting for the authority's answer.
    AwaitingApproval,
    /// Holding a valid certificate; sleeping until renewal.
    Active,
    /// Sleeping before the next attempt after a failure.
    BackingOff,
    /// Stopped on a terminal error.
    Fatal,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Issuing => "issuing",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Active => "active",
            Self::BackingOff => "backing_off",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Receives engine state transitions.
///
/// Obtained from [`CertificateLifecycleEngine::updates`](super::CertificateLifecycleEngine::updates).
/// Intermediate states may be skipped when the observer is slower than the
/// engine; the last published state is always observable.
#[derive(Debug, Clone)]
pub struct EngineUpdates {
    pub(super) rx: watch::Receiver<EngineState>,
}

impl EngineUpdates {
    /// Waits for the next state change and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Closed`] once the engine has been dropped.
    pub async fn changed(&mut self) -> Result<EngineState, LifecycleError> {
        self.rx.changed().await.map_err(|_| LifecycleError::Closed)?;
        Ok(*self.rx.borrow_and_update())
    }

    /// Returns the last published state without waiting.
    pub fn last(&self) -> EngineState {
        *self.rx.borrow()
    }

    /// Waits until the state satisfies `f`, checking the current state first.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Closed`] if the engine is dropped first.
    pub async fn wait_for<F>(&mut self, mut f: F) -> Result<EngineState, LifecycleError>
    where
        F: FnMut(&EngineState) -> bool,
    {
        let current = self.last();
        if f(&current) {
            return Ok(current);
        }
        loop {
            let state = self.changed().await?;
            if f(&state) {
                return Ok(state);
            }
        }
    }
}
