use anyhow::{Context, Result, anyhow};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use comment_helper::{Config, InteractorConfig, MessageBus, TabId, TabInfo, spawn_interactor};

use crate::dom::ChromePage;

#[derive(Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Browser-level WebSocket URL for a remote debugging endpoint. A `ws://`
/// URL is taken as is; an HTTP endpoint is asked through `/json/version`.
pub async fn resolve_debugger_url(chrome_url: &str) -> Result<String> {
    if chrome_url.starts_with("ws://") || chrome_url.starts_with("wss://") {
        return Ok(chrome_url.to_string());
    }

    let endpoint = format!("{}/json/version", chrome_url.trim_end_matches('/'));
    let version: VersionInfo = reqwest::Client::new()
        .get(&endpoint)
        .timeout(Duration::from_secs(2))
        .send()
        .await
        .with_context(|| format!("no remote debugging endpoint at {chrome_url}"))?
        .error_for_status()?
        .json()
        .await
        .with_context(|| format!("unexpected reply from {endpoint}"))?;
    Ok(version.web_socket_debugger_url)
}

/// Browser the daemon drives. Attached to once, reused for every trigger.
pub struct BrowserSession {
    browser: Browser,
}

impl BrowserSession {
    /// Attaches to `debugger_url` when given, otherwise launches Chrome with
    /// a dedicated profile.
    pub fn launch(config: &Config, debugger_url: Option<String>) -> Result<Self> {
        // 1. Attach to a Chrome started with --remote-debugging-port
        if let Some(url) = debugger_url {
            info!(%url, "attempting to attach to running Chrome");
            match Browser::connect(url) {
                Ok(browser) => {
                    info!("attached to existing Chrome");
                    return Ok(Self { browser });
                }
                Err(err) => warn!(error = %err, "could not attach, launching dedicated profile"),
            }
        }

        // 2. Otherwise start our own, with a profile that persists logins
        let profile = match &config.profile_dir {
            Some(dir) => dir.clone(),
            None => default_profile_dir()?,
        };
        std::fs::create_dir_all(&profile)
            .with_context(|| format!("failed to create profile dir {}", profile.display()))?;
        debug!(profile = %profile.display(), "using profile");

        let options = LaunchOptions {
            headless: false,
            path: Some(find_chrome()?),
            user_data_dir: Some(profile),
            args: vec![
                std::ffi::OsStr::new("--no-first-run"),
                std::ffi::OsStr::new("--no-default-browser-check"),
                std::ffi::OsStr::new("--disable-blink-features=AutomationControlled"),
                std::ffi::OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: Duration::from_secs(60 * 60),
            ..Default::default()
        };

        info!("starting Chrome");
        let browser = Browser::new(options).context("Chrome launch failed")?;
        let tab = browser.new_tab()?;
        tab.navigate_to(&config.start_url)?;
        info!(url = %config.start_url, "Chrome ready");

        Ok(Self { browser })
    }

    pub fn tabs(&self) -> Result<Vec<Arc<Tab>>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|_| anyhow!("tab list lock poisoned"))?;
        Ok(tabs.clone())
    }

}

/// The tab with target id `id`, or the first tab when `id` is `None`.
pub fn pick_tab(tabs: Vec<Arc<Tab>>, id: Option<&str>) -> Option<Arc<Tab>> {
    match id {
        Some(id) => tabs.into_iter().find(|t| t.get_target_id() == id),
        None => tabs.into_iter().next(),
    }
}

pub fn tab_info(tab: &Tab) -> TabInfo {
    TabInfo::new(tab.get_target_id().clone(), tab.get_url())
}

/// Registers a page interactor for tabs on matching pages, the way an
/// extension's content script gets injected.
pub struct Injector {
    bus: MessageBus,
    inject_match: String,
    config: Arc<InteractorConfig>,
}

impl Injector {
    pub fn new(bus: MessageBus, inject_match: String, config: Arc<InteractorConfig>) -> Self {
        Self {
            bus,
            inject_match,
            config,
        }
    }

    pub fn is_injected(&self, tab: &TabId) -> bool {
        self.bus.is_registered(tab)
    }

    /// Returns whether the tab has an interactor afterwards. Tabs off the
    /// injection match get none.
    pub fn ensure_injected(&self, tab: &Arc<Tab>) -> bool {
        let info = tab_info(tab);
        if !info.url.contains(&self.inject_match) {
            return self.bus.is_registered(&info.id);
        }
        if self.bus.is_registered(&info.id) {
            return true;
        }
        info!(tab = %info.id, url = %info.url, "injecting interactor");
        spawn_interactor(
            info.id,
            ChromePage::new(tab.clone()),
            self.config.clone(),
            &self.bus,
        );
        true
    }

    /// Drops the interactors of tabs that are no longer open. Their serve
    /// loops end once the route is gone.
    pub fn prune(&self, open: &[Arc<Tab>]) {
        let open: HashSet<TabId> = open
            .iter()
            .map(|tab| TabId::from(tab.get_target_id().as_str()))
            .collect();
        for tab in self.bus.retain(|tab| open.contains(tab)) {
            info!(%tab, "tab closed, dropping interactor");
        }
    }
}

fn default_profile_dir() -> Result<PathBuf> {
    let local_data =
        dirs::data_local_dir().ok_or_else(|| anyhow!("no local data directory on this system"))?;
    Ok(local_data.join("comment-helper").join("profile"))
}

fn find_chrome() -> Result<PathBuf> {
    if let Ok(path) = headless_chrome::browser::default_executable() {
        return Ok(path);
    }

    let candidates = [
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    ];
    for path in &candidates {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    anyhow::bail!("Chrome executable not found. Please ensure Google Chrome is installed.")
}
