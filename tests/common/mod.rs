#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use comment_helper::config::InteractorConfig;
use comment_helper::{DomError, ElementHandle, ElementKind, Page, SyntheticEvent};

/// A node of the scripted page.
#[derive(Debug, Clone)]
pub struct FakeElement {
    pub tag: String,
    pub content_editable: String,
    pub selectors: Vec<String>,
    pub in_shadow: bool,
    pub height: f64,
    pub appears_after: Duration,
    pub attributes: BTreeMap<String, String>,
    pub broken: bool,
    pub detaches_on_click: bool,
    pub detached: bool,
    pub value: String,
    pub inner_text: String,
    pub text_content: String,
    pub caret_at_end: bool,
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_uppercase(),
            content_editable: "inherit".to_string(),
            selectors: Vec::new(),
            in_shadow: false,
            height: 0.0,
            appears_after: Duration::ZERO,
            attributes: BTreeMap::new(),
            broken: false,
            detaches_on_click: false,
            detached: false,
            value: String::new(),
            inner_text: String::new(),
            text_content: String::new(),
            caret_at_end: false,
        }
    }

    pub fn matching(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    pub fn editable(mut self) -> Self {
        self.content_editable = "true".to_string();
        self
    }

    pub fn height(mut self, px: f64) -> Self {
        self.height = px;
        self
    }

    /// Rendered `ms` after the page was created.
    pub fn appearing_after(mut self, ms: u64) -> Self {
        self.appears_after = Duration::from_millis(ms);
        self
    }

    pub fn in_shadow(mut self) -> Self {
        self.in_shadow = true;
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Every operation on the element fails.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// The page removes the element as soon as it is clicked.
    pub fn detached_after_click(mut self) -> Self {
        self.detaches_on_click = true;
        self
    }

    fn outer_html(&self) -> String {
        let tag = self.tag.to_lowercase();
        let attrs: String = self
            .attributes
            .iter()
            .map(|(k, v)| format!(" {k}=\"{v}\""))
            .collect();
        format!("<{tag}{attrs}>{}</{tag}>", self.text_content)
    }
}

pub fn comment_button() -> FakeElement {
    FakeElement::new("faceplate-tracker")
        .matching(&InteractorConfig::default().activation_selector)
        .attr("source", "post_detail")
        .attr("action", "click")
        .attr("noun", "add_comment_button")
        .height(32.0)
}

pub fn textarea() -> FakeElement {
    FakeElement::new("textarea")
        .matching("textarea")
        .attr("name", "comment")
        .height(120.0)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Focus,
    Click,
    Dispatch(SyntheticEvent),
    SetValue(String),
    SetInnerText(String),
    SetTextContent(String),
    CollapseToEnd,
}

struct State {
    start: Instant,
    elements: Vec<(String, FakeElement)>,
    handles: HashMap<u64, usize>,
    next_handle: u64,
    deep_queries: HashMap<String, u32>,
    direct_queries: HashMap<String, u32>,
    watches: u32,
    stopped_watches: u32,
    releases: u32,
    ops: Vec<(String, Op)>,
}

impl State {
    fn visible(&self, el: &FakeElement) -> bool {
        Instant::now() >= self.start + el.appears_after
    }

    fn handle_for(&mut self, index: usize) -> ElementHandle {
        if let Some((&id, _)) = self.handles.iter().find(|(_, i)| **i == index) {
            return ElementHandle(id);
        }
        self.next_handle += 1;
        self.handles.insert(self.next_handle, index);
        ElementHandle(self.next_handle)
    }

    fn find(&mut self, selector: &str, pierce_shadow: bool) -> Option<ElementHandle> {
        let index = self.elements.iter().position(|(_, el)| {
            el.selectors.iter().any(|s| s == selector)
                && (pierce_shadow || !el.in_shadow)
                && !el.detached
                && self.visible(el)
        })?;
        Some(self.handle_for(index))
    }

    fn element(&mut self, el: ElementHandle) -> Result<(String, &mut FakeElement), DomError> {
        let index = *self
            .handles
            .get(&el.0)
            .ok_or_else(|| DomError::Detached(format!("#{}", el.0)))?;
        let (label, element) = &mut self.elements[index];
        if element.broken {
            return Err(DomError::Script("element exploded".to_string()));
        }
        Ok((label.clone(), element))
    }

    /// Like `element`, but the node must still be in the document.
    fn live(&mut self, el: ElementHandle) -> Result<(String, &mut FakeElement), DomError> {
        let (label, element) = self.element(el)?;
        if element.detached {
            return Err(DomError::Detached(format!("#{} is not in the document", el.0)));
        }
        Ok((label, element))
    }

    fn record(&mut self, el: ElementHandle, op: Op) -> Result<(), DomError> {
        let (label, _) = self.element(el)?;
        self.ops.push((label, op));
        Ok(())
    }
}

/// In-memory page with a scripted render timeline, driven by tokio's clock.
#[derive(Clone)]
pub struct FakePage {
    state: Arc<Mutex<State>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                start: Instant::now(),
                elements: Vec::new(),
                handles: HashMap::new(),
                next_handle: 0,
                deep_queries: HashMap::new(),
                direct_queries: HashMap::new(),
                watches: 0,
                stopped_watches: 0,
                releases: 0,
                ops: Vec::new(),
            })),
        }
    }

    pub fn with(self, label: &str, element: FakeElement) -> Self {
        self.add(label, element);
        self
    }

    pub fn add(&self, label: &str, element: FakeElement) {
        self.lock().elements.push((label.to_string(), element));
    }

    pub fn element(&self, label: &str) -> FakeElement {
        self.lock()
            .elements
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, el)| el.clone())
            .unwrap_or_else(|| panic!("no element labelled {label}"))
    }

    pub fn ops_on(&self, label: &str) -> Vec<Op> {
        self.lock()
            .ops
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, op)| op.clone())
            .collect()
    }

    pub fn deep_queries(&self, selector: &str) -> u32 {
        self.lock().deep_queries.get(selector).copied().unwrap_or(0)
    }

    pub fn direct_queries(&self, selector: &str) -> u32 {
        self.lock().direct_queries.get(selector).copied().unwrap_or(0)
    }

    pub fn watches(&self) -> u32 {
        self.lock().watches
    }

    pub fn stopped_watches(&self) -> u32 {
        self.lock().stopped_watches
    }

    pub fn releases(&self) -> u32 {
        self.lock().releases
    }

    pub fn outstanding_handles(&self) -> usize {
        self.lock().handles.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Page for FakePage {
    async fn deep_query(&self, selector: &str) -> Result<Option<ElementHandle>, DomError> {
        let mut state = self.lock();
        *state.deep_queries.entry(selector.to_string()).or_default() += 1;
        Ok(state.find(selector, true))
    }

    async fn query(&self, selector: &str) -> Result<Option<ElementHandle>, DomError> {
        let mut state = self.lock();
        *state.direct_queries.entry(selector.to_string()).or_default() += 1;
        Ok(state.find(selector, false))
    }

    async fn watch_insertion(&self, selector: &str) -> Result<Option<ElementHandle>, DomError> {
        let next = {
            let mut state = self.lock();
            state.watches += 1;
            if let Some(existing) = state.find(selector, false) {
                return Ok(Some(existing));
            }
            let now = Instant::now();
            let start = state.start;
            state
                .elements
                .iter()
                .enumerate()
                .filter(|(_, (_, el))| {
                    !el.in_shadow
                        && el.selectors.iter().any(|s| s == selector)
                        && start + el.appears_after > now
                })
                .min_by_key(|(_, (_, el))| el.appears_after)
                .map(|(index, (_, el))| (index, start + el.appears_after))
        };

        match next {
            Some((index, at)) => {
                tokio::time::sleep_until(at).await;
                Ok(Some(self.lock().handle_for(index)))
            }
            None => std::future::pending().await,
        }
    }

    async fn stop_watching(&self) -> Result<(), DomError> {
        self.lock().stopped_watches += 1;
        Ok(())
    }

    async fn attribute(&self, el: ElementHandle, name: &str) -> Result<Option<String>, DomError> {
        let mut state = self.lock();
        let (_, element) = state.element(el)?;
        Ok(element.attributes.get(name).cloned())
    }

    async fn focus(&self, el: ElementHandle) -> Result<(), DomError> {
        let mut state = self.lock();
        state.live(el)?;
        state.record(el, Op::Focus)
    }

    async fn click(&self, el: ElementHandle) -> Result<(), DomError> {
        let mut state = self.lock();
        state.record(el, Op::Click)?;
        let (_, element) = state.element(el)?;
        if element.detaches_on_click {
            element.detached = true;
        }
        Ok(())
    }

    async fn dispatch(&self, el: ElementHandle, event: &SyntheticEvent) -> Result<(), DomError> {
        self.lock().record(el, Op::Dispatch(event.clone()))
    }

    async fn offset_height(&self, el: ElementHandle) -> Result<f64, DomError> {
        let mut state = self.lock();
        let (_, element) = state.element(el)?;
        Ok(element.height)
    }

    async fn kind(&self, el: ElementHandle) -> Result<ElementKind, DomError> {
        let mut state = self.lock();
        let (_, element) = state.element(el)?;
        Ok(ElementKind::classify(&element.tag, &element.content_editable))
    }

    async fn set_value(&self, el: ElementHandle, text: &str) -> Result<(), DomError> {
        let mut state = self.lock();
        state.live(el)?.1.value = text.to_string();
        state.record(el, Op::SetValue(text.to_string()))
    }

    async fn set_inner_text(&self, el: ElementHandle, text: &str) -> Result<(), DomError> {
        let mut state = self.lock();
        {
            let (_, element) = state.live(el)?;
            element.inner_text = text.to_string();
            element.text_content = text.to_string();
            element.caret_at_end = false;
        }
        state.record(el, Op::SetInnerText(text.to_string()))
    }

    async fn set_text_content(&self, el: ElementHandle, text: &str) -> Result<(), DomError> {
        let mut state = self.lock();
        state.live(el)?.1.text_content = text.to_string();
        state.record(el, Op::SetTextContent(text.to_string()))
    }

    async fn collapse_selection_to_end(&self, el: ElementHandle) -> Result<(), DomError> {
        let mut state = self.lock();
        state.live(el)?.1.caret_at_end = true;
        state.record(el, Op::CollapseToEnd)
    }

    async fn outer_html(&self, el: ElementHandle) -> Result<String, DomError> {
        let mut state = self.lock();
        let (_, element) = state.element(el)?;
        Ok(element.outer_html())
    }

    async fn release(&self) -> Result<(), DomError> {
        let mut state = self.lock();
        state.handles.clear();
        state.releases += 1;
        Ok(())
    }
}
