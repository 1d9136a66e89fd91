use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DomError;

/// Reference to a live node held by a [`Page`].
///
/// Only meaningful to the page that produced it, and only until the next
/// [`Page::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub u64);

/// How text gets into an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// `<textarea>` or `<input>`, written through `value`.
    FormControl,
    /// `contenteditable="true"`, written through `innerText`.
    Editable,
    Other,
}

impl ElementKind {
    /// Classifies from `tagName` and the `contentEditable` property.
    pub fn classify(tag_name: &str, content_editable: &str) -> Self {
        if tag_name.eq_ignore_ascii_case("textarea") || tag_name.eq_ignore_ascii_case("input") {
            ElementKind::FormControl
        } else if content_editable == "true" {
            ElementKind::Editable
        } else {
            ElementKind::Other
        }
    }
}

/// DOM events we synthesize. All of them bubble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticEvent {
    MouseDown,
    MouseUp,
    Click,
    Focus,
    /// A plain `Event("input")` when `data` is `None`, an `InputEvent`
    /// otherwise.
    Input {
        data: Option<String>,
        input_type: Option<String>,
    },
    Change,
}

impl SyntheticEvent {
    pub fn input() -> Self {
        SyntheticEvent::Input {
            data: None,
            input_type: None,
        }
    }

    pub fn insert_text(text: &str) -> Self {
        SyntheticEvent::Input {
            data: Some(text.to_string()),
            input_type: Some("insertText".to_string()),
        }
    }

    pub fn input_data(text: &str) -> Self {
        SyntheticEvent::Input {
            data: Some(text.to_string()),
            input_type: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SyntheticEvent::MouseDown => "mousedown",
            SyntheticEvent::MouseUp => "mouseup",
            SyntheticEvent::Click => "click",
            SyntheticEvent::Focus => "focus",
            SyntheticEvent::Input { .. } => "input",
            SyntheticEvent::Change => "change",
        }
    }
}

/// The DOM operations an activation cycle needs from a loaded page.
///
/// Reads, clicks and dispatched events still reach a node the page has since
/// removed. Focusing and writing text need the node in the document and fail
/// with [`DomError::Detached`] otherwise.
#[async_trait]
pub trait Page: Send + Sync {
    /// First match for `selector`, looking inside open shadow roots too.
    async fn deep_query(&self, selector: &str) -> Result<Option<ElementHandle>, DomError>;

    /// First match for `selector` in the light DOM of the document.
    async fn query(&self, selector: &str) -> Result<Option<ElementHandle>, DomError>;

    /// Resolves with the first node matching `selector` that gets inserted
    /// under the document body, or one that already exists. Never resolves
    /// when nothing shows up; callers race it against a timeout and then call
    /// [`Page::stop_watching`].
    async fn watch_insertion(&self, selector: &str) -> Result<Option<ElementHandle>, DomError>;

    async fn stop_watching(&self) -> Result<(), DomError>;

    async fn attribute(&self, el: ElementHandle, name: &str) -> Result<Option<String>, DomError>;

    async fn focus(&self, el: ElementHandle) -> Result<(), DomError>;

    /// Native `HTMLElement.click()`.
    async fn click(&self, el: ElementHandle) -> Result<(), DomError>;

    async fn dispatch(&self, el: ElementHandle, event: &SyntheticEvent) -> Result<(), DomError>;

    async fn offset_height(&self, el: ElementHandle) -> Result<f64, DomError>;

    async fn kind(&self, el: ElementHandle) -> Result<ElementKind, DomError>;

    async fn set_value(&self, el: ElementHandle, text: &str) -> Result<(), DomError>;

    async fn set_inner_text(&self, el: ElementHandle, text: &str) -> Result<(), DomError>;

    async fn set_text_content(&self, el: ElementHandle, text: &str) -> Result<(), DomError>;

    /// Puts the caret after the last character of `el`.
    async fn collapse_selection_to_end(&self, el: ElementHandle) -> Result<(), DomError>;

    async fn outer_html(&self, el: ElementHandle) -> Result<String, DomError>;

    /// Forgets every handle handed out so far.
    async fn release(&self) -> Result<(), DomError>;
}
