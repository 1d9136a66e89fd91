use serde::{Deserialize, Serialize};
use std::fmt;

/// Request sent from the controller to a tab's interactor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ActivationRequest {
    AddSampleComment,
}

/// What a successful cycle touched and typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationResult {
    pub comment_button: String,
    pub text_input: String,
    pub sample_text: String,
}

/// Reply to an [`ActivationRequest`].
///
/// Serialized as `{"success":true,"result":{..}}` or
/// `{"success":false,"error":".."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActivationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActivationResponse {
    pub fn ok(result: ActivationResult) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
        }
    }

    pub fn into_result(self) -> Result<ActivationResult, String> {
        match (self.success, self.result, self.error) {
            (true, Some(result), _) => Ok(result),
            (_, _, Some(error)) => Err(error),
            _ => Err("malformed response".to_string()),
        }
    }
}

/// CDP target id of a browser tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub String);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The tab a trigger was raised on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
}

impl TabInfo {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: TabId(id.into()),
            url: url.into(),
        }
    }
}

/// Events streamed to observers of the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CycleEvent {
    Ignored { tab: TabId, url: String },
    Dispatched { tab: TabId },
    Completed { tab: TabId, response: ActivationResponse },
    TransportFailed { tab: TabId, error: String },
}

impl CycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CycleEvent::Ignored { .. } => "ignored",
            CycleEvent::Dispatched { .. } => "dispatched",
            CycleEvent::Completed { .. } => "completed",
            CycleEvent::TransportFailed { .. } => "transport_failed",
        }
    }
}

/// What a single trigger ended in, as seen by the trigger surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Ignored,
    Completed { response: ActivationResponse },
    TransportFailed { error: String },
}
