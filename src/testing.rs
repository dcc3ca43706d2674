//! Scripted stand-ins for the browser, the action service, the web tools and
//! the language model. Test-only.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::browser_automation::{BrowserSession, ElementState, SessionLauncher, SessionOptions};
use crate::llm_gateway::LanguageModel;
use crate::mcp_client::{ActionService, ServiceResponse};
use crate::web_tools::{SearchHit, WebTools};

// =====================================================
// Browser
// =====================================================

#[derive(Debug, Default)]
pub struct FakeBrowserState {
    pub visible: HashSet<String>,
    pub hidden: HashSet<String>,
    pub url: String,
    pub video_ready: bool,
    /// selector -> url of the tab a click on it opens
    pub opens_tab: HashMap<String, String>,
    pub pending_tab: Option<String>,
    pub failing_clicks: HashSet<String>,
    pub log: Vec<String>,
    pub launches: usize,
    pub closes: usize,
    pub fail_launch: bool,
}

#[derive(Clone, Default)]
pub struct FakeBrowser {
    pub state: Arc<Mutex<FakeBrowserState>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visible(self, selectors: &[&str]) -> Self {
        {
            let mut st = self.state.lock().unwrap();
            st.visible.extend(selectors.iter().map(|s| s.to_string()));
        }
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn launches(&self) -> usize {
        self.state.lock().unwrap().launches
    }

    fn push(&self, entry: String) {
        self.state.lock().unwrap().log.push(entry);
    }
}

#[async_trait]
impl SessionLauncher for FakeBrowser {
    async fn launch(&self, _options: &SessionOptions) -> Result<Box<dyn BrowserSession>> {
        let mut st = self.state.lock().unwrap();
        if st.fail_launch {
            return Err(anyhow!("Failed to launch Chromium: no executable"));
        }
        st.launches += 1;
        st.log.push("launch".to_string());
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.state.lock().unwrap().url = url.to_string();
        self.push(format!("goto {}", url));
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn element_state(&mut self, selector: &str) -> Result<ElementState> {
        let st = self.state.lock().unwrap();
        Ok(if st.visible.contains(selector) {
            ElementState::Visible
        } else if st.hidden.contains(selector) {
            ElementState::Hidden
        } else {
            ElementState::Detached
        })
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if st.failing_clicks.contains(selector) {
            return Err(anyhow!("click on '{}' intercepted", selector));
        }
        if let Some(url) = st.opens_tab.get(selector).cloned() {
            st.pending_tab = Some(url);
        }
        st.log.push(format!("click {}", selector));
        Ok(())
    }

    async fn type_text(&mut self, selector: Option<&str>, text: &str, clear: bool) -> Result<()> {
        self.push(format!(
            "type {} {}{}",
            selector.unwrap_or("<focused>"),
            text,
            if clear { " (clear)" } else { "" }
        ));
        Ok(())
    }

    async fn press_key(&mut self, selector: Option<&str>, key: &str) -> Result<()> {
        self.push(format!("press {} {}", selector.unwrap_or("<page>"), key));
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value> {
        let ready = self.state.lock().unwrap().video_ready;
        self.push("evaluate".to_string());
        if script.contains("readyState") {
            return Ok(json!(ready));
        }
        if script.contains("querySelector('video')") {
            return Ok(json!(if ready { "ok" } else { "missing" }));
        }
        Ok(json!("evaluated"))
    }

    async fn screenshot(&mut self) -> Result<PathBuf> {
        self.push("screenshot".to_string());
        Ok(PathBuf::from("/tmp/fake-shot.png"))
    }

    async fn adopt_new_page(&mut self, _wait: Duration) -> Result<bool> {
        let mut st = self.state.lock().unwrap();
        match st.pending_tab.take() {
            Some(url) => {
                st.log.push(format!("switch {}", url));
                st.url = url;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.closes += 1;
        st.log.push("close".to_string());
        Ok(())
    }
}

// =====================================================
// Action service
// =====================================================

pub enum ServiceScript {
    Respond(ServiceResponse),
    Fail(String),
}

#[derive(Clone)]
pub struct FakeService {
    pub calls: Arc<Mutex<Vec<(String, Value)>>>,
    pub starts: Arc<Mutex<usize>>,
    script: Arc<Mutex<VecDeque<ServiceScript>>>,
    start_error: Option<String>,
}

impl FakeService {
    pub fn new(script: Vec<ServiceScript>) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            starts: Arc::new(Mutex::new(0)),
            script: Arc::new(Mutex::new(script.into())),
            start_error: None,
        }
    }

    pub fn unreachable() -> Self {
        let mut svc = Self::new(Vec::new());
        svc.start_error = Some("connection refused".to_string());
        svc
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }
}

#[async_trait]
impl ActionService for FakeService {
    async fn start(&self) -> Result<()> {
        *self.starts.lock().unwrap() += 1;
        match &self.start_error {
            Some(e) => Err(anyhow!("{}", e)),
            None => Ok(()),
        }
    }

    async fn execute_action(&self, name: &str, params: Value) -> Result<ServiceResponse> {
        self.calls.lock().unwrap().push((name.to_string(), params));
        match self.script.lock().unwrap().pop_front() {
            Some(ServiceScript::Respond(resp)) => Ok(resp),
            Some(ServiceScript::Fail(e)) => Err(anyhow!("{}", e)),
            None => Ok(ServiceResponse::ok(json!({}))),
        }
    }
}

// =====================================================
// Web tools
// =====================================================

#[derive(Clone, Default)]
pub struct FakeWebTools {
    pub opened: Arc<Mutex<Vec<String>>>,
    pub searches: Arc<Mutex<Vec<(String, usize)>>>,
    pub fetched: Arc<Mutex<Vec<String>>>,
    pub open_ok: bool,
    pub search_fails: bool,
    pub hits: usize,
}

impl FakeWebTools {
    pub fn working(hits: usize) -> Self {
        Self {
            open_ok: true,
            hits,
            ..Self::default()
        }
    }
}

#[async_trait]
impl WebTools for FakeWebTools {
    async fn open_in_browser(&self, target: &str) -> bool {
        self.opened.lock().unwrap().push(target.to_string());
        self.open_ok
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        self.searches.lock().unwrap().push((query.to_string(), max_results));
        if self.search_fails {
            return Err(anyhow!("search backend unavailable"));
        }
        Ok((0..self.hits.min(max_results))
            .map(|i| SearchHit {
                title: format!("Result {} for {}", i + 1, query),
                href: format!("https://example.com/{}", i + 1),
                body: format!("snippet {}", i + 1),
            })
            .collect())
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        self.fetched.lock().unwrap().push(url.to_string());
        Ok(format!("contents of {}", url))
    }
}

// =====================================================
// Language model
// =====================================================

#[derive(Clone)]
pub struct ScriptedModel {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    pub prompts: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            )),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(anyhow!("{}", e)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}
