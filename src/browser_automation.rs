// Browser Automation Module
// One browser session per automate call, driven over CDP. The interpreter only
// sees the `BrowserSession` trait so tests can script a fake page.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, InsertTextParams,
};
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;

// =====================================================
// Session contract
// =====================================================

/// What a selector currently resolves to on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Detached,
    Hidden,
    Visible,
}

impl ElementState {
    fn parse(raw: &str) -> Self {
        match raw {
            "visible" => Self::Visible,
            "hidden" => Self::Hidden,
            _ => Self::Detached,
        }
    }
}

/// A live browser with a single "current page". All element operations target it.
#[async_trait]
pub trait BrowserSession: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;
    async fn current_url(&mut self) -> Result<String>;
    /// One-shot probe; waiting is the caller's job.
    async fn element_state(&mut self, selector: &str) -> Result<ElementState>;
    async fn click(&mut self, selector: &str) -> Result<()>;
    /// `None` types into whatever has focus.
    async fn type_text(&mut self, selector: Option<&str>, text: &str, clear: bool) -> Result<()>;
    /// `None` dispatches the key to the page globally.
    async fn press_key(&mut self, selector: Option<&str>, key: &str) -> Result<()>;
    async fn evaluate(&mut self, script: &str) -> Result<Value>;
    async fn screenshot(&mut self) -> Result<PathBuf>;
    /// Rebinds the current page to a tab that opened since the last call, waiting up to `wait`.
    async fn adopt_new_page(&mut self, wait: Duration) -> Result<bool>;
    async fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub headless: bool,
    pub request_timeout: Duration,
    pub executable: Option<PathBuf>,
}

impl From<&BrowserConfig> for SessionOptions {
    fn from(cfg: &BrowserConfig) -> Self {
        Self {
            headless: cfg.headless,
            request_timeout: cfg.step_timeout.max(Duration::from_secs(5)),
            executable: cfg.executable.clone(),
        }
    }
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>>;
}

// =====================================================
// Chromium backend
// =====================================================

const ELEMENT_STATE_JS: &str = r#"
(() => {
    const el = document.querySelector(__SELECTOR__);
    if (!el) return 'detached';
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    const shown = rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none';
    return shown ? 'visible' : 'hidden';
})()
"#;

const CLEAR_FIELD_JS: &str = r#"
(() => {
    const el = document.querySelector(__SELECTOR__);
    if (!el) return false;
    if ('value' in el) { el.value = ''; } else { el.textContent = ''; }
    el.dispatchEvent(new Event('input', { bubbles: true }));
    return true;
})()
"#;

fn with_selector(template: &str, selector: &str) -> Result<String> {
    let literal = serde_json::to_string(selector)?;
    Ok(template.replace("__SELECTOR__", &literal))
}

pub struct ChromiumLauncher;

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>> {
        let mut builder = CdpConfig::builder()
            .request_timeout(options.request_timeout)
            .launch_timeout(Duration::from_secs(20));
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("browser config error: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch Chromium")?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("[Browser] CDP handler stopped: {}", e);
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open initial page")?;
        let mut known = HashSet::new();
        known.insert(page.target_id().clone());
        info!("[Browser] Session launched (headless={})", options.headless);

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            known,
            handler_task: Some(handler_task),
        }))
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    known: HashSet<TargetId>,
    handler_task: Option<JoinHandle<()>>,
}

impl ChromiumSession {
    async fn key_event(&self, kind: DispatchKeyEventType, key: &str) -> Result<()> {
        let (code, vk, text) = key_definition(key);
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind.clone())
            .key(key)
            .code(code)
            .windows_virtual_key_code(vk);
        if kind == DispatchKeyEventType::KeyDown {
            if let Some(text) = text {
                builder = builder.text(text);
            }
        }
        let params = builder.build().map_err(|e| anyhow!(e))?;
        self.page.execute(params).await?;
        Ok(())
    }
}

/// (code, windows virtual key code, text) for the keys automation scripts use.
fn key_definition(key: &str) -> (String, i64, Option<String>) {
    match key {
        "Enter" => ("Enter".into(), 13, Some("\r".into())),
        "Tab" => ("Tab".into(), 9, None),
        "Escape" => ("Escape".into(), 27, None),
        "Backspace" => ("Backspace".into(), 8, None),
        " " | "Space" => ("Space".into(), 32, Some(" ".into())),
        "ArrowLeft" => ("ArrowLeft".into(), 37, None),
        "ArrowUp" => ("ArrowUp".into(), 38, None),
        "ArrowRight" => ("ArrowRight".into(), 39, None),
        "ArrowDown" => ("ArrowDown".into(), 40, None),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphanumeric() => {
                    let upper = c.to_ascii_uppercase();
                    let code = if c.is_ascii_digit() {
                        format!("Digit{}", c)
                    } else {
                        format!("Key{}", upper)
                    };
                    (code, upper as i64, Some(c.to_string()))
                }
                _ => (other.to_string(), 0, None),
            }
        }
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        info!("🌐 [Browser] Navigate to: {}", url);
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn element_state(&mut self, selector: &str) -> Result<ElementState> {
        let script = with_selector(ELEMENT_STATE_JS, selector)?;
        let raw: String = self.page.evaluate(script).await?.into_value()?;
        Ok(ElementState::parse(&raw))
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("Element '{}' not found", selector))?
            .click()
            .await?;
        info!("🖱️ [Browser] Clicked '{}'", selector);
        Ok(())
    }

    async fn type_text(&mut self, selector: Option<&str>, text: &str, clear: bool) -> Result<()> {
        match selector {
            Some(sel) => {
                if clear {
                    self.page.evaluate(with_selector(CLEAR_FIELD_JS, sel)?).await?;
                }
                let element = self
                    .page
                    .find_element(sel)
                    .await
                    .with_context(|| format!("Element '{}' not found", sel))?;
                element.click().await?;
                element.type_str(text).await?;
            }
            None => {
                self.page.execute(InsertTextParams::new(text)).await?;
            }
        }
        let preview: String = text.chars().take(20).collect();
        info!("⌨️ [Browser] Typed: '{}'", preview);
        Ok(())
    }

    async fn press_key(&mut self, selector: Option<&str>, key: &str) -> Result<()> {
        match selector {
            Some(sel) => {
                self.page
                    .find_element(sel)
                    .await
                    .with_context(|| format!("Element '{}' not found", sel))?
                    .press_key(key)
                    .await?;
            }
            None => {
                self.key_event(DispatchKeyEventType::KeyDown, key).await?;
                self.key_event(DispatchKeyEventType::KeyUp, key).await?;
            }
        }
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn screenshot(&mut self) -> Result<PathBuf> {
        let bytes = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .context("Failed to capture screenshot")?;
        let path = std::env::temp_dir().join(format!("agent-shot-{}.png", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, bytes).await?;
        info!("📸 [Browser] Screenshot saved: {}", path.display());
        Ok(path)
    }

    async fn adopt_new_page(&mut self, wait: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let pages = self.browser.pages().await?;
            if let Some(page) = pages.into_iter().find(|p| !self.known.contains(p.target_id())) {
                self.known.insert(page.target_id().clone());
                self.page = page;
                info!("🗂️ [Browser] Switched to new tab");
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            warn!("[Browser] close failed: {}", e);
        }
        let _ = self.browser.wait().await;
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        info!("[Browser] Session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_is_embedded_as_js_string_literal() {
        let script = with_selector(ELEMENT_STATE_JS, "a[href*='/video/']").unwrap();
        assert!(script.contains(r#"document.querySelector("a[href*='/video/']")"#));
        let tricky = with_selector(ELEMENT_STATE_JS, r#"input[name="q"]"#).unwrap();
        assert!(tricky.contains(r#"document.querySelector("input[name=\"q\"]")"#));
    }

    #[test]
    fn key_definitions() {
        assert_eq!(key_definition("Enter"), ("Enter".to_string(), 13, Some("\r".to_string())));
        assert_eq!(key_definition("k"), ("KeyK".to_string(), 75, Some("k".to_string())));
        assert_eq!(key_definition("5").0, "Digit5");
        assert_eq!(key_definition("F5"), ("F5".to_string(), 0, None));
    }

    #[test]
    fn element_state_parsing_defaults_to_detached() {
        assert_eq!(ElementState::parse("visible"), ElementState::Visible);
        assert_eq!(ElementState::parse("hidden"), ElementState::Hidden);
        assert_eq!(ElementState::parse("garbage"), ElementState::Detached);
    }
}
