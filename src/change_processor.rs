//! Defines the process by which change notifications are pulled from the
//! remote store and used to reconcile the local mirror during a live
//! session.
//!
//! This object is owned by a SyncSession.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{select, Receiver, Sender};
use jod_thread::JoinHandle;

use crate::{
    message_queue::MessageQueue,
    reconcile,
    store::{StoreEvent, TreeStore},
    sync_session::{SyncState, SyncUpdate},
};

pub(crate) struct ChangeProcessor {
    shutdown_sender: Sender<()>,
    _thread_handle: JoinHandle<()>,
}

impl ChangeProcessor {
    pub(crate) fn start<S: TreeStore + Send + Sync + 'static>(
        store: Arc<S>,
        state: Arc<Mutex<SyncState>>,
        message_queue: Arc<MessageQueue<SyncUpdate>>,
    ) -> Self {
        let (shutdown_sender, shutdown_receiver) = crossbeam_channel::bounded(1);
        let events = store.event_receiver();

        let thread_handle = jod_thread::Builder::new()
            .name("treesync change processor".to_owned())
            .spawn(move || {
                log::trace!("ChangeProcessor thread started");
                Self::main_task(shutdown_receiver, events, store, state, message_queue);
                log::trace!("ChangeProcessor thread stopped");
            })
            .expect("Could not start ChangeProcessor thread");

        Self {
            shutdown_sender,
            _thread_handle: thread_handle,
        }
    }

    fn main_task<S: TreeStore>(
        shutdown_receiver: Receiver<()>,
        events: Receiver<StoreEvent>,
        store: Arc<S>,
        state: Arc<Mutex<SyncState>>,
        message_queue: Arc<MessageQueue<SyncUpdate>>,
    ) {
        loop {
            select! {
                recv(events) -> event => {
                    let event = match event {
                        Ok(event) => event,
                        // The store itself is gone; nothing left to pump.
                        Err(_) => break,
                    };

                    log::trace!("Store event: {:?}", event);

                    let update = {
                        let mut state = state.lock().unwrap();

                        match &mut *state {
                            SyncState::Active(active) => {
                                reconcile::apply_store_event(store.as_ref(), active, &event)
                                    .map(|mirror| SyncUpdate { mirror })
                            }
                            _ => {
                                log::trace!("Discarding event delivered to an inactive session");
                                None
                            }
                        }
                    };

                    if let Some(update) = update {
                        message_queue.push(update);
                    }
                },
                recv(shutdown_receiver) -> _ => {
                    log::trace!("ChangeProcessor shutdown signal received...");
                    break;
                },
            }
        }
    }
}

impl Drop for ChangeProcessor {
    fn drop(&mut self) {
        let _ = self.shutdown_sender.send(());
    }
}
