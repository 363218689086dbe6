//! Requests waiting for their result, keyed by request id.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use tokio::sync::oneshot;

use crate::{
    error::{Error, Result},
    message::CommandResult,
};

#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    state: Mutex<PendingState>,
}

#[derive(Debug, Default)]
struct PendingState {
    slots: HashMap<u64, oneshot::Sender<CommandResult>>,
    closed: bool,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserves the slot for `id`. The slot is released when the returned
    /// guard is dropped, whether or not a result arrived.
    pub(crate) fn reserve(&self, id: u64) -> Result<PendingSlot<'_>> {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.lock();
        if state.closed {
            return Err(Error::ConnectionClosed);
        }
        state.slots.insert(id, sender);

        Ok(PendingSlot {
            table: self,
            id,
            receiver,
        })
    }

    /// Hands `result` to the caller waiting on its id. Returns `false` when
    /// nobody is waiting for it any more.
    pub(crate) fn deliver(&self, result: CommandResult) -> bool {
        let sender = self.lock().slots.remove(&result.id);
        match sender {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }

    /// Drops every slot so waiting callers observe the connection closing,
    /// and refuses new reservations.
    pub(crate) fn close(&self) {
        let slots = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.slots)
        };
        drop(slots);
    }

    fn release(&self, id: u64) {
        self.lock().slots.remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().slots.len()
    }
}

/// A reserved slot; removes itself from the table when dropped.
#[derive(Debug)]
pub(crate) struct PendingSlot<'a> {
    table: &'a PendingTable,
    id: u64,
    receiver: oneshot::Receiver<CommandResult>,
}

impl PendingSlot<'_> {
    pub(crate) async fn wait(&mut self) -> Result<CommandResult> {
        (&mut self.receiver)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.table.release(self.id);
    }
}
