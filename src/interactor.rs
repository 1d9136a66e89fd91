//! The activation cycle run inside a tab.
//!
//! ```text
//! Idle -> LocatingActivationControl -> ActivatingControl
//!      -> LocatingInputElement -> PopulatingInput -> Done
//! ```
//!
//! Retries only happen inside the locate steps; any error ends the cycle.

use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::bus::MessageBus;
use crate::config::{InputStrategy, InteractorConfig};
use crate::error::{DomError, InteractError};
use crate::page::{ElementHandle, ElementKind, Page, SyntheticEvent};
use crate::race::{Raced, first_or_timeout, retry_find};
use crate::types::{ActivationRequest, ActivationResponse, ActivationResult, TabId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    LocatingActivationControl,
    ActivatingControl,
    LocatingInputElement,
    PopulatingInput,
    Done,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::LocatingActivationControl => "locating_activation_control",
            CycleState::ActivatingControl => "activating_control",
            CycleState::LocatingInputElement => "locating_input_element",
            CycleState::PopulatingInput => "populating_input",
            CycleState::Done => "done",
        };
        f.write_str(name)
    }
}

/// First `max_chars` characters of `html`, always followed by `...`.
pub fn preview(html: &str, max_chars: usize) -> String {
    let mut out: String = html.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

pub struct Interactor<P> {
    page: P,
    config: Arc<InteractorConfig>,
}

impl<P: Page> Interactor<P> {
    pub fn new(page: P, config: Arc<InteractorConfig>) -> Self {
        Self { page, config }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// Answers one request. Failures become a failed response.
    pub async fn handle(&self, request: ActivationRequest) -> ActivationResponse {
        match request {
            ActivationRequest::AddSampleComment => match self.run_cycle().await {
                Ok(result) => {
                    info!(sample_text = %result.sample_text, "sample comment typed");
                    ActivationResponse::ok(result)
                }
                Err(err) => {
                    warn!(kind = ?err.kind(), error = %err, "activation cycle failed");
                    ActivationResponse::failed(err.to_string())
                }
            },
        }
    }

    /// Runs one full cycle and releases every handle it took, whatever the
    /// outcome.
    pub async fn run_cycle(&self) -> Result<ActivationResult, InteractError> {
        let outcome = self.interact().await;
        self.enter(CycleState::Done);
        if let Err(err) = self.page.release().await {
            debug!(error = %err, "failed to release element handles");
        }
        outcome
    }

    async fn interact(&self) -> Result<ActivationResult, InteractError> {
        self.enter(CycleState::LocatingActivationControl);
        let button = self.locate_activation_control().await?;

        self.enter(CycleState::ActivatingControl);
        self.activate(button).await?;

        self.enter(CycleState::LocatingInputElement);
        let input = self.locate_input().await?;

        self.enter(CycleState::PopulatingInput);
        self.populate(input).await?;

        let chars = self.config.preview_chars;
        Ok(ActivationResult {
            comment_button: preview(&self.page.outer_html(button).await?, chars),
            text_input: preview(&self.page.outer_html(input).await?, chars),
            sample_text: self.config.sample_text.clone(),
        })
    }

    fn enter(&self, state: CycleState) {
        debug!(%state, "cycle state");
    }

    async fn locate_activation_control(&self) -> Result<ElementHandle, InteractError> {
        let selector = self.config.activation_selector.as_str();
        let found = retry_find(
            self.config.activation_attempts,
            self.config.activation_retry_delay(),
            |attempt| async move {
                debug!(attempt, selector, "looking for comment button");
                self.page.deep_query(selector).await
            },
        )
        .await?;

        let button = found.ok_or(InteractError::ActivationControlNotFound)?;
        let source = self.page.attribute(button, "source").await?;
        let action = self.page.attribute(button, "action").await?;
        let noun = self.page.attribute(button, "noun").await?;
        info!(?source, ?action, ?noun, "found comment button");
        Ok(button)
    }

    async fn activate(&self, button: ElementHandle) -> Result<(), InteractError> {
        self.page.focus(button).await?;
        self.page.dispatch(button, &SyntheticEvent::MouseDown).await?;
        tokio::time::sleep(self.config.press_pause()).await;
        self.page.dispatch(button, &SyntheticEvent::MouseUp).await?;
        self.page.click(button).await?;

        debug!("waiting for the comment box to render");
        tokio::time::sleep(self.config.activation_settle()).await;
        Ok(())
    }

    async fn locate_input(&self) -> Result<ElementHandle, InteractError> {
        for strategy in &self.config.input_strategies {
            match self.try_strategy(strategy).await {
                Ok(Some(input)) => {
                    info!(strategy = %strategy.name, "found text input");
                    return Ok(input);
                }
                Ok(None) => {}
                Err(err) => debug!(strategy = %strategy.name, error = %err, "strategy failed"),
            }
        }

        info!("selector strategies exhausted, watching for an inserted text input");
        self.watch_for_input().await?.ok_or(InteractError::InputNotFound)
    }

    async fn try_strategy(
        &self,
        strategy: &InputStrategy,
    ) -> Result<Option<ElementHandle>, DomError> {
        let selector = strategy.selector.as_str();
        debug!(strategy = %strategy.name, selector, "trying selector");
        let candidate = retry_find(
            self.config.input_attempts,
            self.config.input_retry_delay(),
            |_| self.page.deep_query(selector),
        )
        .await?;

        let Some(candidate) = candidate else {
            return Ok(None);
        };
        if !strategy.validity.needs_height() {
            return Ok(Some(candidate));
        }
        let height = self.page.offset_height(candidate).await?;
        if strategy.validity.accepts(height) {
            Ok(Some(candidate))
        } else {
            debug!(strategy = %strategy.name, height, "rejecting candidate");
            Ok(None)
        }
    }

    async fn watch_for_input(&self) -> Result<Option<ElementHandle>, DomError> {
        let selector = self.config.fallback_selector.as_str();
        if let Some(existing) = self.page.query(selector).await? {
            return Ok(Some(existing));
        }

        match first_or_timeout(
            self.page.watch_insertion(selector),
            self.config.observer_timeout(),
        )
        .await
        {
            Raced::Event(found) => found,
            Raced::TimedOut => {
                debug!(selector, "no text input inserted before timeout");
                self.page.stop_watching().await?;
                Ok(None)
            }
        }
    }

    async fn populate(&self, input: ElementHandle) -> Result<(), InteractError> {
        let page = &self.page;
        let text = self.config.sample_text.as_str();

        page.focus(input).await?;
        page.click(input).await?;
        for event in [
            SyntheticEvent::MouseDown,
            SyntheticEvent::MouseUp,
            SyntheticEvent::Focus,
            SyntheticEvent::Click,
        ] {
            page.dispatch(input, &event).await?;
        }
        tokio::time::sleep(self.config.focus_settle()).await;

        let kind = page.kind(input).await?;
        debug!(?kind, "typing sample comment");
        match kind {
            ElementKind::FormControl => {
                page.set_value(input, "").await?;
                page.set_value(input, text).await?;
                page.dispatch(input, &SyntheticEvent::input()).await?;
                page.dispatch(input, &SyntheticEvent::Change).await?;
            }
            ElementKind::Editable => {
                page.set_inner_text(input, "").await?;
                page.set_inner_text(input, text).await?;
                page.collapse_selection_to_end(input).await?;
                page.dispatch(input, &SyntheticEvent::insert_text(text)).await?;
            }
            ElementKind::Other => {
                page.set_text_content(input, text).await?;
                page.dispatch(input, &SyntheticEvent::input_data(text)).await?;
            }
        }
        Ok(())
    }
}

/// Registers an interactor for `tab` on `bus` and serves its requests one at
/// a time until the route is dropped.
pub fn spawn_interactor<P>(
    tab: TabId,
    page: P,
    config: Arc<InteractorConfig>,
    bus: &MessageBus,
) -> JoinHandle<()>
where
    P: Page + 'static,
{
    let mut requests = bus.register(tab.clone());
    let interactor = Interactor::new(page, config);
    let span = info_span!("interactor", %tab);

    tokio::spawn(
        async move {
            info!("interactor ready");
            interactor.enter(CycleState::Idle);
            while let Some(envelope) = requests.recv().await {
                debug!(request = ?envelope.request, "received request");
                let response = interactor.handle(envelope.request).await;
                if envelope.reply.send(response).is_err() {
                    debug!("requester went away before the reply");
                }
                interactor.enter(CycleState::Idle);
            }
            debug!("interactor stopped");
        }
        .instrument(span),
    )
}
