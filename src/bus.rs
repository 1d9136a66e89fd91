use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::TransportError;
use crate::types::{ActivationRequest, ActivationResponse, TabId};

const QUEUE_DEPTH: usize = 8;

/// A request on its way to an interactor, with the slot for its reply.
#[derive(Debug)]
pub struct Envelope {
    pub request: ActivationRequest,
    pub reply: oneshot::Sender<ActivationResponse>,
}

/// Routes requests to the interactor registered for each tab.
#[derive(Clone, Default)]
pub struct MessageBus {
    routes: Arc<Mutex<HashMap<TabId, mpsc::Sender<Envelope>>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `tab`, replacing any earlier one.
    pub fn register(&self, tab: TabId) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        debug!(%tab, "registering interactor");
        self.lock().insert(tab, tx);
        rx
    }

    pub fn unregister(&self, tab: &TabId) -> bool {
        self.lock().remove(tab).is_some()
    }

    /// Keeps only the routes whose tab passes `keep` and returns the tabs
    /// that were dropped. A dropped route ends its listener's queue.
    pub fn retain(&self, keep: impl Fn(&TabId) -> bool) -> Vec<TabId> {
        let mut routes = self.lock();
        let dropped: Vec<TabId> = routes.keys().filter(|tab| !keep(tab)).cloned().collect();
        for tab in &dropped {
            routes.remove(tab);
        }
        dropped
    }

    pub fn is_registered(&self, tab: &TabId) -> bool {
        self.lock().get(tab).is_some_and(|tx| !tx.is_closed())
    }

    /// Delivers one request and waits for its reply.
    pub async fn send(
        &self,
        tab: &TabId,
        request: ActivationRequest,
    ) -> Result<ActivationResponse, TransportError> {
        let sender = self
            .lock()
            .get(tab)
            .cloned()
            .ok_or_else(|| TransportError::NotRegistered(tab.clone()))?;

        let (reply, response) = oneshot::channel();
        sender
            .send(Envelope { request, reply })
            .await
            .map_err(|_| TransportError::Disconnected(tab.clone()))?;

        response
            .await
            .map_err(|_| TransportError::NoReply(tab.clone()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TabId, mpsc::Sender<Envelope>>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
