use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::bus::MessageBus;
use crate::types::{ActivationRequest, CycleEvent, TabInfo, TriggerOutcome};

const EVENT_CAPACITY: usize = 64;

/// Reacts to the user's trigger on a tab. Only tabs on the target site get a
/// request; everything else is ignored without a word to the page.
pub struct TriggerController {
    target_marker: String,
    bus: MessageBus,
    events: broadcast::Sender<CycleEvent>,
}

impl TriggerController {
    pub fn new(target_marker: impl Into<String>, bus: MessageBus) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            target_marker: target_marker.into(),
            bus,
            events,
        }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent> {
        self.events.subscribe()
    }

    pub fn is_target(&self, url: &str) -> bool {
        url.contains(&self.target_marker)
    }

    pub async fn trigger(&self, tab: &TabInfo) -> TriggerOutcome {
        info!(tab = %tab.id, url = %tab.url, "trigger received");

        if !self.is_target(&tab.url) {
            debug!(tab = %tab.id, "not a target page, ignoring");
            self.publish(CycleEvent::Ignored {
                tab: tab.id.clone(),
                url: tab.url.clone(),
            });
            return TriggerOutcome::Ignored;
        }

        self.publish(CycleEvent::Dispatched { tab: tab.id.clone() });
        match self
            .bus
            .send(&tab.id, ActivationRequest::AddSampleComment)
            .await
        {
            Ok(response) => {
                if response.success {
                    info!(tab = %tab.id, ?response, "interactor replied");
                } else {
                    warn!(tab = %tab.id, error = ?response.error, "interactor reported failure");
                }
                self.publish(CycleEvent::Completed {
                    tab: tab.id.clone(),
                    response: response.clone(),
                });
                TriggerOutcome::Completed { response }
            }
            Err(err) => {
                error!(tab = %tab.id, kind = ?err.kind(), error = %err, "failed to reach interactor");
                self.publish(CycleEvent::TransportFailed {
                    tab: tab.id.clone(),
                    error: err.to_string(),
                });
                TriggerOutcome::TransportFailed {
                    error: err.to_string(),
                }
            }
        }
    }

    fn publish(&self, event: CycleEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
