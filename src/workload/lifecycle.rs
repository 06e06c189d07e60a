use super::ServeError;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Phase of a [`WorkloadCredentialServer`](super::WorkloadCredentialServer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    /// Constructed, or back here after a failed bind.
    Created = 0,
    /// Bound and accepting connections.
    Serving = 1,
    /// Stop requested; the listener is closing.
    Stopping = 2,
    /// Listener closed. Terminal.
    Stopped = 3,
}

impl ServerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Serving,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Stop/done signalling shared by a server, its closer task and any number
/// of observers.
///
/// `stop` happens-before the listener closes, and `done` is published only
/// after it has closed.
#[derive(Debug)]
pub(super) struct ServerLifecycle {
    state: AtomicU8,
    stop: CancellationToken,
    done: watch::Sender<bool>,
}

impl ServerLifecycle {
    pub(super) fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            state: AtomicU8::new(ServerState::Created as u8),
            stop: CancellationToken::new(),
            done,
        }
    }

    pub(super) fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: ServerState, to: ServerState) -> Result<(), ServerState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ServerState::from_u8)
    }

    /// Claims the right to bind. Only one `serve` may run at a time.
    pub(super) fn begin_serve(&self) -> Result<(), ServeError> {
        match self.transition(ServerState::Created, ServerState::Serving) {
            Ok(()) => Ok(()),
            Err(ServerState::Stopped) => Err(ServeError::Stopped),
            Err(_) => Err(ServeError::AlreadyServing),
        }
    }

    /// Returns to `Created` after a failed bind, unless a stop arrived
    /// meanwhile, in which case the server is finished.
    pub(super) fn bind_failed(&self) {
        if self
            .transition(ServerState::Serving, ServerState::Created)
            .is_err()
        {
            self.finish();
        }
    }

    /// Requests a stop. Returns `true` for the call that actually stopped
    /// the server; repeated calls are no-ops.
    pub(super) fn stop(&self) -> bool {
        loop {
            match self.state() {
                ServerState::Created => {
                    if self
                        .transition(ServerState::Created, ServerState::Stopped)
                        .is_ok()
                    {
                        self.stop.cancel();
                        self.done.send_replace(true);
                        return true;
                    }
                }
                ServerState::Serving => {
                    if self
                        .transition(ServerState::Serving, ServerState::Stopping)
                        .is_ok()
                    {
                        self.stop.cancel();
                        return true;
                    }
                }
                ServerState::Stopping | ServerState::Stopped => return false,
            }
        }
    }

    /// Token cancelled when a stop is requested.
    pub(super) fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Marks the listener closed and wakes every `wait_done` caller.
    pub(super) fn finish(&self) {
        self.state
            .store(ServerState::Stopped as u8, Ordering::Release);
        self.done.send_replace(true);
    }

    pub(super) fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    pub(super) async fn wait_done(&self) {
        let mut rx = self.done.subscribe();
        // The sender lives as long as `self`.
        let _ = rx.wait_for(|done| *done).await;
    }
}
