//! Step interpreter: runs one ordered list of atomic browser actions against a
//! single browser session.
//!
//! - Steps run strictly in listed order against the current page.
//! - `optional` steps that fail are logged and skipped; any other failure aborts
//!   the rest of the sequence.
//! - Multi-selector steps commit to the first candidate that resolves, in order.
//! - The session is closed on every exit path, after the configured dwell.

use anyhow::{anyhow, bail, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::action_schema::{parse_step, Step, StepKind, VideoAction, WaitState};
use crate::browser_automation::{BrowserSession, ElementState, SessionLauncher, SessionOptions};
use crate::config::BrowserConfig;
use crate::schema::Action;

type Session = dyn BrowserSession + 'static;

const VIDEO_PLAY_JS: &str = r#"
(() => {
    const v = document.querySelector('video');
    if (!v) return 'missing';
    const p = v.play();
    if (p && p.catch) p.catch(() => {});
    return 'ok';
})()
"#;

const VIDEO_FORCE_PLAY_JS: &str = r#"
(() => {
    const v = document.querySelector('video');
    if (!v) return 'missing';
    v.muted = true;
    const p = v.play();
    if (p && p.catch) p.catch(() => {});
    return 'ok';
})()
"#;

const VIDEO_READY_JS: &str = r#"
(() => {
    const v = document.querySelector('video');
    return !!v && v.readyState >= 2;
})()
"#;

/// Play controls of the common embedded players, most specific first.
const PLAY_BUTTON_SELECTORS: &[&str] = &[
    ".bpx-player-ctrl-play",
    ".ytp-play-button",
    ".xgplayer-play",
    "button[aria-label*='Play']",
    "video",
];

#[derive(Debug, Clone)]
pub struct InterpreterOptions {
    pub step_timeout: Duration,
    pub session_timeout: Duration,
    pub dwell: Duration,
    pub new_page_wait: Duration,
    pub poll_interval: Duration,
    /// Floor for each candidate's share of a multi-selector step's timeout.
    pub min_candidate_timeout: Duration,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self::from(&BrowserConfig::default())
    }
}

impl From<&BrowserConfig> for InterpreterOptions {
    fn from(cfg: &BrowserConfig) -> Self {
        Self {
            step_timeout: cfg.step_timeout,
            session_timeout: cfg.session_timeout,
            dwell: cfg.dwell,
            new_page_wait: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            min_candidate_timeout: Duration::from_millis(1_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Done(String),
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub index: usize,
    pub description: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub success: bool,
    pub steps_executed: usize,
    pub total_steps: usize,
    pub error: Option<String>,
    pub final_url: Option<String>,
    pub records: Vec<StepRecord>,
    pub screenshots: Vec<PathBuf>,
}

impl RunReport {
    fn new(total_steps: usize) -> Self {
        Self {
            total_steps,
            ..Self::default()
        }
    }

    fn record(&mut self, index: usize, step: &Step, outcome: StepOutcome) {
        self.records.push(StepRecord {
            index,
            description: step.describe(),
            outcome,
        });
    }

    /// One line per step, in execution order.
    pub fn transcript(&self) -> String {
        self.records
            .iter()
            .map(|r| match &r.outcome {
                StepOutcome::Done(note) => format!("{}. {} -> {}", r.index + 1, r.description, note),
                StepOutcome::Skipped(why) => {
                    format!("{}. {} -> skipped ({})", r.index + 1, r.description, why)
                }
                StepOutcome::Failed(why) => {
                    format!("{}. {} -> FAILED ({})", r.index + 1, r.description, why)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =====================================================
// Probing
// =====================================================

/// Tries `probe` on each candidate in listed order and returns the index and
/// value of the first success. Later candidates are never tried once one wins.
pub async fn first_success<T, P>(
    session: &mut Session,
    candidates: &[String],
    mut probe: P,
) -> Result<(usize, T)>
where
    P: for<'s> FnMut(&'s mut Session, &'s str) -> BoxFuture<'s, Result<T>>,
{
    let mut failures = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        match probe(&mut *session, candidate.as_str()).await {
            Ok(value) => return Ok((index, value)),
            Err(e) => {
                debug!("[Interpreter] candidate '{}' rejected: {}", candidate, e);
                failures.push(format!("{}: {}", candidate, e));
            }
        }
    }
    Err(anyhow!("no candidate resolved [{}]", failures.join("; ")))
}

fn state_satisfies(actual: ElementState, wanted: WaitState) -> bool {
    match wanted {
        WaitState::Attached => actual != ElementState::Detached,
        WaitState::Visible => actual == ElementState::Visible,
        WaitState::Hidden => actual != ElementState::Visible,
        WaitState::Detached => actual == ElementState::Detached,
    }
}

async fn wait_for_state(
    session: &mut Session,
    selector: &str,
    wanted: WaitState,
    timeout: Duration,
    poll: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut last_error = None;
    loop {
        match session.element_state(selector).await {
            Ok(state) if state_satisfies(state, wanted) => return Ok(()),
            Ok(_) => {}
            // Probes can fail mid-navigation; keep polling until the deadline.
            Err(e) => last_error = Some(e),
        }
        if Instant::now() >= deadline {
            let detail = last_error.map(|e| format!(": {}", e)).unwrap_or_default();
            bail!("'{}' not {:?} within {:?}{}", selector, wanted, timeout, detail);
        }
        tokio::time::sleep(poll).await;
    }
}

async fn wait_for_url(session: &mut Session, includes: &str, timeout: Duration, poll: Duration) -> Result<String> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(url) = session.current_url().await {
            if url.contains(includes) {
                return Ok(url);
            }
        }
        if Instant::now() >= deadline {
            bail!("url never contained '{}' within {:?}", includes, timeout);
        }
        tokio::time::sleep(poll).await;
    }
}

// =====================================================
// Interpreter
// =====================================================

pub struct StepInterpreter {
    launcher: Arc<dyn SessionLauncher>,
    session_options: SessionOptions,
    options: InterpreterOptions,
}

impl StepInterpreter {
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        session_options: SessionOptions,
        options: InterpreterOptions,
    ) -> Self {
        Self {
            launcher,
            session_options,
            options,
        }
    }

    pub fn from_config(launcher: Arc<dyn SessionLauncher>, cfg: &BrowserConfig) -> Self {
        Self::new(launcher, SessionOptions::from(cfg), InterpreterOptions::from(cfg))
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    /// Opens a session, loads `target_url` if given, then runs `actions`.
    /// Never returns an error: every failure lands in the report.
    pub async fn run(&self, target_url: Option<&str>, actions: &[Action]) -> RunReport {
        let steps: Vec<Step> = actions.iter().map(parse_step).collect();
        let mut report = RunReport::new(steps.len());
        let mut slot: Option<Box<Session>> = None;

        let outcome = tokio::time::timeout(
            self.options.session_timeout,
            self.drive(&mut slot, target_url, &steps, &mut report),
        )
        .await;

        match outcome {
            Ok(Ok(())) => report.success = true,
            Ok(Err(e)) => report.error = Some(format!("{:#}", e)),
            Err(_) => {
                warn!("[Interpreter] session timeout after {:?}", self.options.session_timeout);
                report.error = Some(format!(
                    "automation timed out after {:?} ({} of {} steps done)",
                    self.options.session_timeout, report.steps_executed, report.total_steps
                ));
            }
        }

        if let Some(mut session) = slot.take() {
            report.final_url = session.current_url().await.ok().filter(|u| !u.is_empty());
            if !self.options.dwell.is_zero() {
                info!("[Interpreter] keeping session open for {:?}", self.options.dwell);
                tokio::time::sleep(self.options.dwell).await;
            }
            if let Err(e) = session.close().await {
                warn!("[Interpreter] session close failed: {}", e);
            }
        }

        info!(
            "[Interpreter] finished: success={} steps={}/{}",
            report.success, report.steps_executed, report.total_steps
        );
        report
    }

    async fn drive(
        &self,
        slot: &mut Option<Box<Session>>,
        target_url: Option<&str>,
        steps: &[Step],
        report: &mut RunReport,
    ) -> Result<()> {
        let session = slot
            .insert(self.launcher.launch(&self.session_options).await?)
            .as_mut();

        let mut preloaded = None;
        if let Some(url) = target_url {
            session.goto(url).await?;
            preloaded = Some(url.to_string());
        }

        for (index, step) in steps.iter().enumerate() {
            // The opening navigate usually repeats the target that is already loaded.
            let already_loaded = matches!(
                &step.kind,
                StepKind::Navigate { url } if preloaded.as_deref() == Some(url.as_str())
            );
            preloaded = None;

            let result = if already_loaded {
                Ok("already loaded".to_string())
            } else {
                self.execute_step(session, step, report).await
            };

            match result {
                Ok(note) => {
                    debug!("[Interpreter] step {} ok: {}", index + 1, note);
                    report.record(index, step, StepOutcome::Done(note));
                }
                Err(e) if step.optional => {
                    warn!("[Interpreter] optional step {} ({}) skipped: {:#}", index + 1, step.describe(), e);
                    report.record(index, step, StepOutcome::Skipped(format!("{:#}", e)));
                }
                Err(e) => {
                    report.record(index, step, StepOutcome::Failed(format!("{:#}", e)));
                    report.steps_executed = index;
                    return Err(e.context(format!("step {} ({}) failed", index + 1, step.describe())));
                }
            }
            report.steps_executed = index + 1;
        }
        Ok(())
    }

    fn candidate_timeout(&self, step: &Step, candidates: usize) -> Duration {
        let total = step.timeout.unwrap_or(self.options.step_timeout);
        if candidates <= 1 {
            return total;
        }
        (total / candidates as u32).max(self.options.min_candidate_timeout.min(total))
    }

    async fn resolve_first(
        &self,
        session: &mut Session,
        step: &Step,
        selectors: &[String],
        wanted: WaitState,
    ) -> Result<String> {
        let per = self.candidate_timeout(step, selectors.len());
        let poll = self.options.poll_interval;
        let (index, ()) = first_success(session, selectors, |s, sel| {
            Box::pin(wait_for_state(s, sel, wanted, per, poll))
        })
        .await?;
        Ok(selectors[index].clone())
    }

    async fn execute_step(&self, session: &mut Session, step: &Step, report: &mut RunReport) -> Result<String> {
        let timeout = step.timeout.unwrap_or(self.options.step_timeout);
        let poll = self.options.poll_interval;

        let note = match &step.kind {
            StepKind::Navigate { url } => {
                session.goto(url).await?;
                format!("loaded {}", url)
            }
            StepKind::Click { selectors } => {
                let chosen = self.resolve_first(session, step, selectors, WaitState::Visible).await?;
                session.click(&chosen).await?;
                format!("clicked {}", chosen)
            }
            StepKind::Type { selector, text, clear } => {
                if let Some(sel) = selector {
                    wait_for_state(session, sel, WaitState::Visible, timeout, poll).await?;
                }
                session.type_text(selector.as_deref(), text, *clear).await?;
                format!("typed {} chars", text.chars().count())
            }
            StepKind::Press { selector, key } => {
                if let Some(sel) = selector {
                    wait_for_state(session, sel, WaitState::Attached, timeout, poll).await?;
                }
                session.press_key(selector.as_deref(), key).await?;
                format!("pressed {}", key)
            }
            StepKind::Wait { selectors, state } => {
                let chosen = self.resolve_first(session, step, selectors, *state).await?;
                format!("{} is {:?}", chosen, state)
            }
            StepKind::WaitUrl { includes } => {
                let url = wait_for_url(session, includes, timeout, poll).await?;
                format!("url is {}", url)
            }
            StepKind::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                format!("slept {}ms", ms)
            }
            StepKind::Evaluate { script } => {
                let value = session.evaluate(script).await?;
                format!("script returned {}", preview(&value))
            }
            StepKind::Screenshot => {
                let path = session.screenshot().await?;
                let note = format!("saved {}", path.display());
                report.screenshots.push(path);
                note
            }
            StepKind::Video(action) => self.video(session, step, *action).await?,
            StepKind::Invalid { reason, .. } => bail!("{}", reason),
            StepKind::Unknown { tag } => format!("ignored unknown action '{}'", tag),
        };

        if step.new_page {
            if session.adopt_new_page(self.options.new_page_wait).await? {
                let url = session.current_url().await.unwrap_or_default();
                return Ok(format!("{}; switched to new tab {}", note, url));
            }
            debug!("[Interpreter] no new tab opened after step");
        }
        Ok(note)
    }

    async fn video(&self, session: &mut Session, step: &Step, action: VideoAction) -> Result<String> {
        let timeout = step.timeout.unwrap_or(self.options.step_timeout);
        match action {
            VideoAction::Play | VideoAction::ForcePlay => {
                let script = if action == VideoAction::Play {
                    VIDEO_PLAY_JS
                } else {
                    VIDEO_FORCE_PLAY_JS
                };
                match session.evaluate(script).await?.as_str() {
                    Some("ok") => Ok("playback requested".to_string()),
                    _ => bail!("no video element on page"),
                }
            }
            VideoAction::ClickPlay => {
                let candidates: Vec<String> = PLAY_BUTTON_SELECTORS.iter().map(|s| s.to_string()).collect();
                let chosen = self.resolve_first(session, step, &candidates, WaitState::Visible).await?;
                session.click(&chosen).await?;
                Ok(format!("clicked play control {}", chosen))
            }
            VideoAction::KeyboardPlay => {
                session.press_key(None, " ").await?;
                Ok("sent play key".to_string())
            }
            VideoAction::WaitReady => {
                let deadline = Instant::now() + timeout;
                loop {
                    if session.evaluate(VIDEO_READY_JS).await?.as_bool() == Some(true) {
                        return Ok("video ready".to_string());
                    }
                    if Instant::now() >= deadline {
                        bail!("video not ready within {:?}", timeout);
                    }
                    tokio::time::sleep(self.options.poll_interval).await;
                }
            }
        }
    }
}

fn preview(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let short: String = text.chars().take(80).collect();
    if short.len() < text.len() {
        format!("{}…", short)
    } else {
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBrowser;
    use serde_json::json;

    fn fast_options() -> InterpreterOptions {
        InterpreterOptions {
            step_timeout: Duration::from_millis(120),
            session_timeout: Duration::from_secs(5),
            dwell: Duration::ZERO,
            new_page_wait: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
            min_candidate_timeout: Duration::from_millis(30),
        }
    }

    fn interpreter(browser: &FakeBrowser, options: InterpreterOptions) -> StepInterpreter {
        StepInterpreter::new(
            Arc::new(browser.clone()),
            SessionOptions::from(&BrowserConfig::default()),
            options,
        )
    }

    fn actions(values: Vec<Value>) -> Vec<Action> {
        values.into_iter().filter_map(Action::from_value).collect()
    }

    #[tokio::test]
    async fn runs_steps_in_order_and_closes() {
        let browser = FakeBrowser::new().with_visible(&["#q", "#go"]);
        let steps = actions(vec![
            json!({"action": "navigate", "url": "https://shop.test"}),
            json!({"action": "type", "selector": "#q", "text": "socks", "clear": true}),
            json!({"action": "click", "selector": "#go"}),
            json!({"action": "screenshot"}),
        ]);
        let report = interpreter(&browser, fast_options()).run(Some("https://shop.test"), &steps).await;

        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.steps_executed, 4);
        assert_eq!(report.screenshots.len(), 1);
        assert_eq!(browser.launches(), 1);
        assert_eq!(
            browser.log(),
            vec![
                "launch",
                "goto https://shop.test",
                "type #q socks (clear)",
                "click #go",
                "screenshot",
                "close"
            ]
        );
    }

    #[tokio::test]
    async fn required_failure_aborts_remaining_steps() {
        let browser = FakeBrowser::new().with_visible(&["#ok"]);
        let steps = actions(vec![
            json!({"action": "click", "selector": "#ok"}),
            json!({"action": "click", "selector": "#missing"}),
            json!({"action": "click", "selector": "#ok"}),
        ]);
        let report = interpreter(&browser, fast_options()).run(None, &steps).await;

        assert!(!report.success);
        assert_eq!(report.steps_executed, 1);
        assert!(report.steps_executed < report.total_steps);
        assert!(report.error.as_deref().unwrap().contains("#missing"));
        assert_eq!(browser.log().iter().filter(|l| *l == "click #ok").count(), 1);
        assert_eq!(browser.closes(), 1);
    }

    #[tokio::test]
    async fn optional_failure_is_skipped() {
        let browser = FakeBrowser::new().with_visible(&["#after"]);
        let steps = actions(vec![
            json!({"action": "wait", "selector": "#never", "optional": true, "timeout": 40}),
            json!({"action": "navigate", "optional": true}),
            json!({"action": "click", "selector": "#after"}),
        ]);
        let report = interpreter(&browser, fast_options()).run(None, &steps).await;

        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.steps_executed, 3);
        assert!(matches!(report.records[0].outcome, StepOutcome::Skipped(_)));
        assert!(matches!(report.records[1].outcome, StepOutcome::Skipped(_)));
        assert!(browser.log().contains(&"click #after".to_string()));
    }

    #[tokio::test]
    async fn click_any_commits_to_first_resolvable_in_order() {
        let browser = FakeBrowser::new().with_visible(&[".second", ".third"]);
        let steps = actions(vec![json!({
            "action": "click_any",
            "selectors": [".first", ".second", ".third"]
        })]);
        let report = interpreter(&browser, fast_options()).run(None, &steps).await;

        assert!(report.success);
        let log = browser.log();
        assert!(log.contains(&"click .second".to_string()));
        assert!(!log.contains(&"click .third".to_string()));
    }

    #[tokio::test]
    async fn click_any_without_match_fails_required_step() {
        let browser = FakeBrowser::new();
        let steps = actions(vec![json!({"action": "click_any", "selectors": [".a", ".b"]})]);
        let report = interpreter(&browser, fast_options()).run(None, &steps).await;
        assert!(!report.success);
        assert_eq!(report.steps_executed, 0);
        let err = report.error.unwrap();
        assert!(err.contains(".a") && err.contains(".b"), "{}", err);
    }

    #[tokio::test]
    async fn wait_any_commits_to_first_resolvable_in_order() {
        let browser = FakeBrowser::new().with_visible(&[".second", ".third"]);
        let steps = actions(vec![json!({
            "action": "wait_any",
            "selectors": [".first", ".second", ".third"]
        })]);
        let report = interpreter(&browser, fast_options()).run(None, &steps).await;

        assert!(report.success, "{:?}", report.error);
        match &report.records[0].outcome {
            StepOutcome::Done(note) => {
                assert!(note.contains(".second"), "{}", note);
                assert!(!note.contains(".third"), "{}", note);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn wait_any_without_match_fails_required_step() {
        let browser = FakeBrowser::new();
        let steps = actions(vec![
            json!({"action": "wait_any", "selectors": [".a", ".b"]}),
            json!({"action": "screenshot"}),
        ]);
        let report = interpreter(&browser, fast_options()).run(None, &steps).await;

        assert!(!report.success);
        assert_eq!(report.steps_executed, 0);
        let err = report.error.unwrap();
        assert!(err.contains(".a") && err.contains(".b"), "{}", err);
        assert!(!browser.log().contains(&"screenshot".to_string()));
        assert_eq!(browser.closes(), 1);
    }

    #[tokio::test]
    async fn committed_candidate_failure_does_not_fall_through() {
        let browser = FakeBrowser::new().with_visible(&[".a", ".b"]);
        browser.state.lock().unwrap().failing_clicks.insert(".a".to_string());
        let steps = actions(vec![json!({"action": "click_any", "selectors": [".a", ".b"]})]);
        let report = interpreter(&browser, fast_options()).run(None, &steps).await;
        assert!(!report.success);
        assert!(!browser.log().contains(&"click .b".to_string()));
    }

    #[tokio::test]
    async fn new_page_rebinds_current_page() {
        let browser = FakeBrowser::new().with_visible(&["a.first"]);
        browser
            .state
            .lock()
            .unwrap()
            .opens_tab
            .insert("a.first".to_string(), "https://video.test/watch/1".to_string());
        let steps = actions(vec![
            json!({"action": "click", "selector": "a.first", "new_page": true}),
            json!({"action": "wait_url", "includes": "/watch/", "timeout": 50}),
        ]);
        let report = interpreter(&browser, fast_options()).run(None, &steps).await;

        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.final_url.as_deref(), Some("https://video.test/watch/1"));
        assert!(browser.log().contains(&"switch https://video.test/watch/1".to_string()));
    }

    #[tokio::test]
    async fn new_page_without_new_tab_keeps_current_page() {
        let browser = FakeBrowser::new().with_visible(&["a.first"]);
        let steps = actions(vec![
            json!({"action": "click", "selector": "a.first", "new_page": true}),
            json!({"action": "wait_url", "includes": "list.test", "timeout": 50}),
        ]);
        let report = interpreter(&browser, fast_options()).run(Some("https://list.test"), &steps).await;

        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.final_url.as_deref(), Some("https://list.test"));
        assert!(!browser.log().iter().any(|l| l.starts_with("switch")));
        match &report.records[0].outcome {
            StepOutcome::Done(note) => assert!(!note.contains("switched"), "{}", note),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn preloaded_target_is_not_loaded_twice() {
        let browser = FakeBrowser::new();
        let steps = actions(vec![
            json!({"action": "navigate", "url": "https://a.test"}),
            json!({"action": "navigate", "url": "https://a.test"}),
        ]);
        let report = interpreter(&browser, fast_options()).run(Some("https://a.test"), &steps).await;
        assert!(report.success);
        let gotos = browser.log().iter().filter(|l| l.starts_with("goto")).count();
        assert_eq!(gotos, 2);
    }

    #[tokio::test]
    async fn unknown_actions_are_no_ops() {
        let browser = FakeBrowser::new();
        let steps = actions(vec![json!({"action": "dance"}), json!({"action": "sleep", "ms": 1})]);
        let report = interpreter(&browser, fast_options()).run(None, &steps).await;
        assert!(report.success);
        assert_eq!(report.steps_executed, 2);
    }

    #[tokio::test]
    async fn session_timeout_stops_long_sleep_and_still_closes() {
        let browser = FakeBrowser::new();
        let mut options = fast_options();
        options.session_timeout = Duration::from_millis(80);
        let steps = actions(vec![
            json!({"action": "sleep", "ms": 1}),
            json!({"action": "sleep", "ms": 10_000}),
        ]);
        let report = interpreter(&browser, options).run(None, &steps).await;
        assert!(!report.success);
        assert_eq!(report.steps_executed, 1);
        assert!(report.error.unwrap().contains("timed out"));
        assert_eq!(browser.closes(), 1);
    }

    #[tokio::test]
    async fn dwell_defers_close() {
        let browser = FakeBrowser::new();
        let mut options = fast_options();
        options.dwell = Duration::from_millis(60);
        let started = std::time::Instant::now();
        let report = interpreter(&browser, options).run(None, &[]).await;
        assert!(report.success);
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(browser.closes(), 1);
    }

    #[tokio::test]
    async fn launch_failure_is_reported() {
        let browser = FakeBrowser::new();
        browser.state.lock().unwrap().fail_launch = true;
        let steps = actions(vec![json!({"action": "navigate", "url": "https://a.test"})]);
        let report = interpreter(&browser, fast_options()).run(None, &steps).await;
        assert!(!report.success);
        assert_eq!(report.steps_executed, 0);
        assert!(report.error.unwrap().contains("launch"));
        assert_eq!(browser.closes(), 0);
    }

    #[tokio::test]
    async fn video_probes() {
        let browser = FakeBrowser::new().with_visible(&[".ytp-play-button"]);
        browser.state.lock().unwrap().video_ready = true;
        let steps = actions(vec![
            json!({"action": "wait_video_ready"}),
            json!({"action": "video_play"}),
            json!({"action": "video_click_play"}),
            json!({"action": "video_keyboard_play"}),
        ]);
        let report = interpreter(&browser, fast_options()).run(None, &steps).await;
        assert!(report.success, "{:?}", report.error);
        let log = browser.log();
        assert!(log.contains(&"click .ytp-play-button".to_string()));
        assert!(log.contains(&"press <page>  ".to_string()));
    }

    #[tokio::test]
    async fn missing_video_fails_required_play() {
        let browser = FakeBrowser::new();
        let steps = actions(vec![json!({"action": "video_play"})]);
        let report = interpreter(&browser, fast_options()).run(None, &steps).await;
        assert!(!report.success);
        assert!(report.error.unwrap().contains("no video"));
    }

    #[test]
    fn candidate_timeout_splits_but_respects_floor() {
        let browser = FakeBrowser::new();
        let interp = interpreter(&browser, fast_options());
        let step = parse_step(&Action::new("click_any").with("timeout", 300));
        assert_eq!(interp.candidate_timeout(&step, 3), Duration::from_millis(100));
        assert_eq!(interp.candidate_timeout(&step, 1), Duration::from_millis(300));
        let step = parse_step(&Action::new("click_any").with("timeout", 60));
        assert_eq!(interp.candidate_timeout(&step, 6), Duration::from_millis(30));
    }
}
