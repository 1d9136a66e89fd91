//! Sample-comment automation for a single target site.
//!
//! A [`controller::TriggerController`] decides whether a tab is on the target
//! site and asks that tab's interactor, over the [`bus::MessageBus`], to run one
//! activation cycle. The [`interactor::Interactor`] drives a [`page::Page`]
//! through the cycle: find the comment button, press it, find the text input
//! that appears and type the sample text into it.

pub mod bus;
pub mod config;
pub mod controller;
pub mod error;
pub mod interactor;
pub mod page;
pub mod race;
pub mod types;

pub use bus::MessageBus;
pub use config::{Config, InteractorConfig};
pub use controller::TriggerController;
pub use error::{DomError, ErrorKind, InteractError, TransportError};
pub use interactor::{Interactor, spawn_interactor};
pub use page::{ElementHandle, ElementKind, Page, SyntheticEvent};
pub use types::{
    ActivationRequest, ActivationResponse, ActivationResult, CycleEvent, TabId, TabInfo,
    TriggerOutcome,
};
