//! Cancellation requests, routed by id to running transfer tasks.
//!
//! Each task registers a [`CancelListener`] for its own id and races it
//! against its work. A request reaches exactly the listener it names, no
//! matter how many other transfers are cancelled around it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use lanshare_protocol::{CancelCommand, TransferId};

type Waiters = HashMap<TransferId, oneshot::Sender<CancelCommand>>;

/// Sends cancel requests to running transfers. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct CancelBus {
    waiters: Arc<Mutex<Waiters>>,
}

impl CancelBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the transfer `id` to stop.
    ///
    /// Returns `false` when `id` is not running or was already cancelled.
    pub fn cancel(&self, id: TransferId, command: CancelCommand) -> bool {
        let Some(tx) = self.lock().remove(&id) else {
            debug!(%id, "cancel for a transfer that is not running");
            return false;
        };
        tx.send(command).is_ok()
    }

    /// Registers a listener for `id`. Requests sent before this call are not
    /// seen.
    pub(crate) fn listen(&self, id: TransferId) -> CancelListener {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        CancelListener {
            id,
            rx: Some(rx),
            waiters: Arc::clone(&self.waiters),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Waiters> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deregisters its id on drop.
pub(crate) struct CancelListener {
    id: TransferId,
    rx: Option<oneshot::Receiver<CancelCommand>>,
    waiters: Arc<Mutex<Waiters>>,
}

impl CancelListener {
    /// Resolves with the command of the request aimed at this id.
    ///
    /// Never resolves if the bus is gone or a command was already taken.
    pub(crate) async fn wait(&mut self) -> CancelCommand {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        match rx.await {
            Ok(command) => {
                self.rx = None;
                command
            }
            Err(_) => {
                self.rx = None;
                std::future::pending().await
            }
        }
    }
}

impl Drop for CancelListener {
    fn drop(&mut self) {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
