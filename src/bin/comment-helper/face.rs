use anyhow::{Result, anyhow};
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info};

use comment_helper::{CycleEvent, TabId, TriggerController, TriggerOutcome};

use crate::hands::{BrowserSession, Injector, pick_tab, tab_info};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<TriggerController>,
    pub session: Arc<BrowserSession>,
    pub injector: Arc<Injector>,
}

#[derive(Deserialize)]
struct TriggerPayload {
    #[serde(default)]
    tab_id: Option<String>,
}

#[derive(Serialize)]
struct TabView {
    id: TabId,
    url: String,
    injected: bool,
}

/// Serve the local UI on the first free port in `first_port..first_port + 10`.
/// Returns the port actually bound.
pub async fn start_server(state: AppState, first_port: u16) -> Result<u16> {
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/tabs", get(tabs_handler))
        .route("/trigger", post(trigger_handler))
        .route("/events", get(sse_handler))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(state);

    let last_port = first_port.saturating_add(9);
    let mut bound = None;
    for port in first_port..=last_port {
        match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                bound = Some((listener, port));
                break;
            }
            Err(err) => debug!(port, error = %err, "port unavailable"),
        }
    }
    let (listener, port) = bound.ok_or_else(|| {
        anyhow!("could not bind to any port {first_port}-{last_port}; is another instance running?")
    })?;

    info!("Web UI running at http://localhost:{}", port);

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(error = %err, "web server stopped");
        }
    });

    Ok(port)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn tabs_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<TabView>>, (StatusCode, String)> {
    let tabs = state.session.tabs().map_err(internal)?;
    state.injector.prune(&tabs);
    let views = tabs
        .iter()
        .map(|tab| {
            let info = tab_info(tab);
            let injected = state.injector.is_injected(&info.id);
            TabView {
                id: info.id,
                url: info.url,
                injected,
            }
        })
        .collect();
    Ok(Json(views))
}

async fn trigger_handler(
    State(state): State<AppState>,
    Json(payload): Json<TriggerPayload>,
) -> Result<Json<TriggerOutcome>, (StatusCode, String)> {
    debug!(tab = ?payload.tab_id, "POST /trigger");
    let tabs = state.session.tabs().map_err(internal)?;
    state.injector.prune(&tabs);
    let tab = pick_tab(tabs, payload.tab_id.as_deref())
        .ok_or_else(|| (StatusCode::NOT_FOUND, "no such tab".to_string()))?;

    // pages navigated to after startup get their interactor here
    let info = tab_info(&tab);
    if !state.injector.ensure_injected(&tab) {
        debug!(tab = %info.id, url = %info.url, "tab has no interactor");
    }

    Ok(Json(state.controller.trigger(&info).await))
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.controller.subscribe();
    let stream =
        BroadcastStream::new(rx).filter_map(|result: Result<CycleEvent, _>| match result {
            Ok(event) => Event::default()
                .event(event.name())
                .json_data(&event)
                .ok()
                .map(Ok::<_, Infallible>),
            Err(_) => None,
        });
    Sse::new(stream)
}

fn internal(err: anyhow::Error) -> (StatusCode, String) {
    error!(error = %err, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Comment Helper</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body {
    background: #0a0a0f;
    color: #e0e0e0;
    font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
    height: 100vh;
    display: flex;
    flex-direction: column;
  }
  header {
    padding: 24px 32px;
    border-bottom: 1px solid #1a1a2e;
  }
  header h1 { font-size: 20px; font-weight: 600; color: #fff; }
  .main {
    flex: 1;
    display: flex;
    flex-direction: column;
    max-width: 800px;
    width: 100%;
    margin: 0 auto;
    padding: 24px 32px;
    gap: 16px;
    overflow: hidden;
  }
  .controls { display: flex; gap: 8px; }
  select {
    flex: 1;
    background: #111118;
    border: 1px solid #222;
    border-radius: 8px;
    padding: 12px 16px;
    color: #fff;
    font-size: 14px;
  }
  button {
    background: #ff4500;
    color: #fff;
    border: none;
    border-radius: 8px;
    padding: 12px 24px;
    font-size: 15px;
    font-weight: 600;
    cursor: pointer;
  }
  button:disabled { background: #333; cursor: not-allowed; }
  #log { flex: 1; overflow-y: auto; display: flex; flex-direction: column; gap: 8px; }
  .entry {
    padding: 10px 14px;
    border-radius: 8px;
    font-size: 13px;
    font-family: 'Cascadia Code', 'Fira Code', monospace;
    background: #111118;
    border-left: 3px solid #3b82f6;
    white-space: pre-wrap;
  }
  .entry.error { background: #1a0a0a; border-left-color: #ef4444; color: #fca5a5; }
  .entry.done { background: #0a1a0a; border-left-color: #22c55e; color: #86efac; }
  .entry.muted { color: #888; border-left-color: #444; }
</style>
</head>
<body>
  <header><h1>Comment Helper</h1></header>
  <div class="main">
    <div class="controls">
      <select id="tab"></select>
      <button id="go" onclick="trigger()">Add sample comment</button>
    </div>
    <div id="log"></div>
  </div>
<script>
  const log = document.getElementById('log');
  const tabSel = document.getElementById('tab');
  const go = document.getElementById('go');

  function esc(s) { return String(s).replace(/</g, '&lt;'); }

  function addEntry(cls, text) {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.innerHTML = esc(text);
    log.appendChild(div);
    log.scrollTop = log.scrollHeight;
  }

  async function loadTabs() {
    const tabs = await (await fetch('/tabs')).json();
    tabSel.innerHTML = '';
    for (const t of tabs) {
      const opt = document.createElement('option');
      opt.value = t.id;
      opt.textContent = (t.injected ? '* ' : '  ') + t.url;
      tabSel.appendChild(opt);
    }
  }

  async function trigger() {
    go.disabled = true;
    try {
      await fetch('/trigger', {
        method: 'POST',
        headers: {'Content-Type': 'application/json'},
        body: JSON.stringify({tab_id: tabSel.value || null}),
      });
    } finally {
      go.disabled = false;
      loadTabs();
    }
  }

  const es = new EventSource('/events');
  es.addEventListener('ignored', e => {
    const d = JSON.parse(e.data);
    addEntry('muted', 'Not a target page, ignored: ' + d.url);
  });
  es.addEventListener('dispatched', () => addEntry('', 'Request sent to page...'));
  es.addEventListener('completed', e => {
    const d = JSON.parse(e.data);
    if (d.response.success) {
      addEntry('done', 'Typed "' + d.response.result.sampleText + '"\n' +
        d.response.result.commentButton + '\n' + d.response.result.textInput);
    } else {
      addEntry('error', 'Page reported: ' + d.response.error);
    }
  });
  es.addEventListener('transport_failed', e => {
    const d = JSON.parse(e.data);
    addEntry('error', 'Could not reach page: ' + d.error);
  });

  loadTabs();
</script>
</body>
</html>
"##;
