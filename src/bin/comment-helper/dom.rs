use async_trait::async_trait;
use headless_chrome::Tab;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use comment_helper::{DomError, ElementHandle, ElementKind, Page, SyntheticEvent};

/// Shared by every script we evaluate. Nodes found by a search are kept in a
/// map on `window` keyed by handle id, so nodes living in shadow roots stay
/// reachable between calls. `node` hands back a tracked node even after the
/// page removed it; `live` throws with `detached` set in that case. Both
/// throw `detached` for a handle that was released.
const PRELUDE: &str = r#"
const R = (window.__commentHelper = window.__commentHelper || { next: 1, els: new Map(), cancel: null });
const track = (el) => {
  if (!el) return null;
  for (const [id, known] of R.els) { if (known === el) return id; }
  const id = R.next++;
  R.els.set(id, el);
  return id;
};
const detached = (id, why) => {
  const e = new Error('handle #' + id + ' ' + why);
  e.detached = true;
  return e;
};
const node = (id) => {
  const el = R.els.get(id);
  if (!el) throw detached(id, 'was released');
  return el;
};
const live = (id) => {
  const el = node(id);
  if (!el.isConnected) throw detached(id, 'is not in the document');
  return el;
};
const deepQuery = (root, sel) => {
  const hit = root.querySelector(sel);
  if (hit) return hit;
  for (const node of root.querySelectorAll('*')) {
    if (node.shadowRoot) {
      const found = deepQuery(node.shadowRoot, sel);
      if (found) return found;
    }
  }
  return null;
};
"#;

/// Wraps `expr` so the page always answers with a JSON string: either
/// `{"ok": value}` or `{"err": message, "detached": bool}`.
fn wrap(expr: &str) -> String {
    format!(
        "(async () => {{ {PRELUDE} try {{ const v = await ({expr}); \
         return JSON.stringify({{ ok: v === undefined ? null : v }}); }} \
         catch (e) {{ return JSON.stringify({{ err: String((e && e.message) || e), \
         detached: !!(e && e.detached) }}); }} }})()"
    )
}

/// JavaScript string literal for `s`.
fn js(s: &str) -> String {
    Value::from(s).to_string()
}

fn deep_query_expr(selector: &str) -> String {
    format!("track(deepQuery(document, {}))", js(selector))
}

fn query_expr(selector: &str) -> String {
    format!("track(document.querySelector({}))", js(selector))
}

fn watch_expr(selector: &str) -> String {
    let sel = js(selector);
    format!(
        r#"new Promise((resolve) => {{
  if (R.cancel) R.cancel();
  const existing = document.querySelector({sel});
  if (existing) {{ resolve(existing); return; }}
  const observer = new MutationObserver((mutations) => {{
    for (const m of mutations) {{
      for (const node of m.addedNodes) {{
        if (node.nodeType !== Node.ELEMENT_NODE) continue;
        const hit = node.matches({sel}) ? node : node.querySelector({sel});
        if (hit) {{ observer.disconnect(); R.cancel = null; resolve(hit); return; }}
      }}
    }}
  }});
  R.cancel = () => {{ observer.disconnect(); R.cancel = null; resolve(null); }};
  observer.observe(document.body, {{ childList: true, subtree: true }});
}}).then(track)"#
    )
}

/// `tail` applied to the tracked node, attached or not.
fn node_expr(el: ElementHandle, tail: &str) -> String {
    format!("node({}){tail}", el.0)
}

/// `tail` applied to the node, which must still be in the document.
fn live_expr(el: ElementHandle, tail: &str) -> String {
    format!("live({}){tail}", el.0)
}

fn event_expr(event: &SyntheticEvent) -> String {
    match event {
        SyntheticEvent::MouseDown | SyntheticEvent::MouseUp | SyntheticEvent::Click => {
            format!("new MouseEvent('{}', {{ bubbles: true }})", event.name())
        }
        SyntheticEvent::Focus => "new FocusEvent('focus', { bubbles: true })".to_string(),
        SyntheticEvent::Input {
            data: Some(data),
            input_type,
        } => {
            let mut init = format!("bubbles: true, data: {}", js(data));
            if let Some(input_type) = input_type {
                init.push_str(&format!(", inputType: {}", js(input_type)));
            }
            format!("new InputEvent('input', {{ {init} }})")
        }
        SyntheticEvent::Input { data: None, .. } => {
            "new Event('input', { bubbles: true })".to_string()
        }
        SyntheticEvent::Change => "new Event('change', { bubbles: true })".to_string(),
    }
}

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    ok: Value,
    #[serde(default)]
    err: Option<String>,
    #[serde(default)]
    detached: bool,
}

fn parse_reply(raw: &str) -> Result<Value, DomError> {
    let reply: Reply = serde_json::from_str(raw)
        .map_err(|e| DomError::Protocol(format!("unreadable script reply: {e}")))?;
    match reply.err {
        Some(message) if reply.detached => Err(DomError::Detached(message)),
        Some(message) => Err(DomError::Script(message)),
        None => Ok(reply.ok),
    }
}

#[derive(Deserialize)]
struct KindReply {
    tag: String,
    editable: String,
}

/// A live Chrome tab driven through `Runtime.evaluate`.
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    async fn eval(&self, expr: String) -> Result<Value, DomError> {
        let tab = self.tab.clone();
        let script = wrap(&expr);
        // headless_chrome blocks the calling thread until the page answers
        let object = tokio::task::spawn_blocking(move || tab.evaluate(&script, true))
            .await
            .map_err(|e| DomError::Protocol(format!("evaluation task failed: {e}")))?
            .map_err(|e| DomError::Protocol(format!("{e:#}")))?;
        let raw = object
            .value
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| DomError::Protocol("script returned no value".to_string()))?;
        parse_reply(&raw)
    }

    async fn eval_unit(&self, expr: String) -> Result<(), DomError> {
        self.eval(expr).await.map(|_| ())
    }

    async fn eval_handle(&self, expr: String) -> Result<Option<ElementHandle>, DomError> {
        Ok(self.eval(expr).await?.as_u64().map(ElementHandle))
    }
}

#[async_trait]
impl Page for ChromePage {
    async fn deep_query(&self, selector: &str) -> Result<Option<ElementHandle>, DomError> {
        self.eval_handle(deep_query_expr(selector)).await
    }

    async fn query(&self, selector: &str) -> Result<Option<ElementHandle>, DomError> {
        self.eval_handle(query_expr(selector)).await
    }

    async fn watch_insertion(&self, selector: &str) -> Result<Option<ElementHandle>, DomError> {
        self.eval_handle(watch_expr(selector)).await
    }

    async fn stop_watching(&self) -> Result<(), DomError> {
        self.eval_unit("(R.cancel && R.cancel(), null)".to_string()).await
    }

    async fn attribute(&self, el: ElementHandle, name: &str) -> Result<Option<String>, DomError> {
        let value = self
            .eval(node_expr(el, &format!(".getAttribute({})", js(name))))
            .await?;
        Ok(value.as_str().map(String::from))
    }

    async fn focus(&self, el: ElementHandle) -> Result<(), DomError> {
        self.eval_unit(format!("({}, null)", live_expr(el, ".focus()"))).await
    }

    async fn click(&self, el: ElementHandle) -> Result<(), DomError> {
        self.eval_unit(format!("({}, null)", node_expr(el, ".click()"))).await
    }

    async fn dispatch(&self, el: ElementHandle, event: &SyntheticEvent) -> Result<(), DomError> {
        let tail = format!(".dispatchEvent({})", event_expr(event));
        self.eval_unit(format!("({}, null)", node_expr(el, &tail))).await
    }

    async fn offset_height(&self, el: ElementHandle) -> Result<f64, DomError> {
        let value = self.eval(node_expr(el, ".offsetHeight")).await?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    async fn kind(&self, el: ElementHandle) -> Result<ElementKind, DomError> {
        let value = self
            .eval(format!(
                "(() => {{ const el = {}; \
                 return {{ tag: el.tagName, editable: String(el.contentEditable) }}; }})()",
                node_expr(el, "")
            ))
            .await?;
        let reply: KindReply = serde_json::from_value(value)
            .map_err(|e| DomError::Protocol(format!("unreadable element kind: {e}")))?;
        Ok(ElementKind::classify(&reply.tag, &reply.editable))
    }

    async fn set_value(&self, el: ElementHandle, text: &str) -> Result<(), DomError> {
        let tail = format!(".value = {}", js(text));
        self.eval_unit(format!("({}, null)", live_expr(el, &tail))).await
    }

    async fn set_inner_text(&self, el: ElementHandle, text: &str) -> Result<(), DomError> {
        let tail = format!(".innerText = {}", js(text));
        self.eval_unit(format!("({}, null)", live_expr(el, &tail))).await
    }

    async fn set_text_content(&self, el: ElementHandle, text: &str) -> Result<(), DomError> {
        let tail = format!(".textContent = {}", js(text));
        self.eval_unit(format!("({}, null)", live_expr(el, &tail))).await
    }

    async fn collapse_selection_to_end(&self, el: ElementHandle) -> Result<(), DomError> {
        self.eval_unit(format!(
            "(() => {{ const el = {}; const range = document.createRange(); \
             range.selectNodeContents(el); range.collapse(false); \
             const sel = window.getSelection(); sel.removeAllRanges(); sel.addRange(range); \
             return null; }})()",
            live_expr(el, "")
        ))
        .await
    }

    async fn outer_html(&self, el: ElementHandle) -> Result<String, DomError> {
        let value = self.eval(node_expr(el, ".outerHTML")).await?;
        Ok(value.as_str().map(String::from).unwrap_or_default())
    }

    async fn release(&self) -> Result<(), DomError> {
        self.eval_unit("(R.cancel && R.cancel(), R.els.clear(), null)".to_string())
            .await
    }
}
