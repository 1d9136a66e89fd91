use thiserror::Error;

use crate::types::TabId;

/// Coarse classification used when logging failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ElementNotFound,
    TransportFailure,
    DomOperationFailure,
}

/// Failure of a single page operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomError {
    #[error("element is no longer attached to the page: {0}")]
    Detached(String),

    #[error("page script failed: {0}")]
    Script(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),
}

/// Why an activation cycle ended in failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InteractError {
    #[error("Comment button not found")]
    ActivationControlNotFound,

    #[error("Comment text input not found after click")]
    InputNotFound,

    #[error(transparent)]
    Dom(#[from] DomError),
}

impl InteractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InteractError::ActivationControlNotFound | InteractError::InputNotFound => {
                ErrorKind::ElementNotFound
            }
            InteractError::Dom(_) => ErrorKind::DomOperationFailure,
        }
    }
}

/// Delivery failure between the controller and a tab's interactor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("no interactor registered for tab {0}")]
    NotRegistered(TabId),

    #[error("interactor for tab {0} is gone")]
    Disconnected(TabId),

    #[error("interactor for tab {0} dropped the request without replying")]
    NoReply(TabId),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TransportFailure
    }
}
