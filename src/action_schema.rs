use crate::schema::Action;
use serde_json::Value;
use std::time::Duration;

/// Element state a wait step is polling for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Attached,
    Visible,
    Hidden,
    Detached,
}

impl WaitState {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("attached") => Self::Attached,
            Some("hidden") => Self::Hidden,
            Some("detached") => Self::Detached,
            _ => Self::Visible,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoAction {
    Play,
    ForcePlay,
    ClickPlay,
    KeyboardPlay,
    WaitReady,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Navigate { url: String },
    /// `click` has one candidate, `click_any` several; both go through the same probe chain.
    Click { selectors: Vec<String> },
    Type { selector: Option<String>, text: String, clear: bool },
    Press { selector: Option<String>, key: String },
    Wait { selectors: Vec<String>, state: WaitState },
    WaitUrl { includes: String },
    Sleep { ms: u64 },
    Evaluate { script: String },
    Screenshot,
    Video(VideoAction),
    /// Recognised tag with a missing or empty required parameter.
    Invalid { tag: String, reason: String },
    /// Unrecognised tag; executes as a no-op.
    Unknown { tag: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub kind: StepKind,
    pub optional: bool,
    pub new_page: bool,
    pub timeout: Option<Duration>,
}

impl Step {
    pub fn describe(&self) -> String {
        match &self.kind {
            StepKind::Navigate { url } => format!("navigate {}", url),
            StepKind::Click { selectors } => format!("click {}", selectors.join(" | ")),
            StepKind::Type { selector, .. } => {
                format!("type into {}", selector.as_deref().unwrap_or("focused element"))
            }
            StepKind::Press { selector, key } => {
                format!("press {} on {}", key, selector.as_deref().unwrap_or("page"))
            }
            StepKind::Wait { selectors, .. } => format!("wait for {}", selectors.join(" | ")),
            StepKind::WaitUrl { includes } => format!("wait for url containing {}", includes),
            StepKind::Sleep { ms } => format!("sleep {}ms", ms),
            StepKind::Evaluate { .. } => "evaluate script".to_string(),
            StepKind::Screenshot => "screenshot".to_string(),
            StepKind::Video(v) => format!("video {:?}", v),
            StepKind::Invalid { tag, .. } => format!("invalid {}", tag),
            StepKind::Unknown { tag } => format!("unknown {}", tag),
        }
    }
}

fn get_string_any(action: &Action, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(val) = action.get(key).and_then(|v| v.as_str()) {
            let trimmed = val.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Raw text, untrimmed: typed text may legitimately carry spaces.
fn get_text(action: &Action, key: &str) -> Option<String> {
    action
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn get_bool(action: &Action, key: &str) -> bool {
    match action.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
        Some(Value::Number(n)) => n.as_u64().map(|n| n != 0).unwrap_or(false),
        _ => false,
    }
}

fn get_u64(action: &Action, keys: &[&str]) -> Option<u64> {
    for key in keys {
        match action.get(key) {
            Some(Value::Number(n)) => {
                if let Some(v) = n.as_u64() {
                    return Some(v);
                }
                if let Some(v) = n.as_f64() {
                    return Some(v.max(0.0) as u64);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(v) = s.trim().parse() {
                    return Some(v);
                }
            }
            _ => {}
        }
    }
    None
}

/// Selector list from `selectors` (array) with `selector` (string) folded in first.
fn get_selectors(action: &Action) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(sel) = get_string_any(action, &["selector"]) {
        out.push(sel);
    }
    if let Some(arr) = action.get("selectors").and_then(|v| v.as_array()) {
        for val in arr {
            if let Some(s) = val.as_str().map(str::trim).filter(|s| !s.is_empty()) {
                if !out.iter().any(|existing| existing == s) {
                    out.push(s.to_string());
                }
            }
        }
    }
    out
}

fn normalize_tag(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    match lower.as_str() {
        "goto" | "open" | "open_url" => "navigate".to_string(),
        "fill" => "type".to_string(),
        "key" => "press".to_string(),
        "wait_for_selector" => "wait".to_string(),
        "delay" => "sleep".to_string(),
        "eval" | "script" => "evaluate".to_string(),
        other => other.to_string(),
    }
}

fn invalid(tag: &str, reason: &str) -> StepKind {
    StepKind::Invalid {
        tag: tag.to_string(),
        reason: reason.to_string(),
    }
}

pub fn parse_step(action: &Action) -> Step {
    let tag = normalize_tag(action.tag());

    let kind = match tag.as_str() {
        "navigate" => match get_string_any(action, &["url", "link"]) {
            Some(url) => StepKind::Navigate { url },
            None => invalid(&tag, "navigate requires 'url'"),
        },
        "click" | "click_any" => {
            let selectors = get_selectors(action);
            if selectors.is_empty() {
                invalid(&tag, "click requires 'selector' or 'selectors'")
            } else {
                StepKind::Click { selectors }
            }
        }
        "type" | "keyboard_type" => match get_text(action, "text") {
            Some(text) => StepKind::Type {
                selector: if tag == "keyboard_type" {
                    None
                } else {
                    get_string_any(action, &["selector"])
                },
                text,
                clear: get_bool(action, "clear"),
            },
            None => invalid(&tag, "type requires 'text'"),
        },
        "press" | "press_global" => match get_string_any(action, &["key"]) {
            Some(key) => StepKind::Press {
                selector: if tag == "press_global" {
                    None
                } else {
                    get_string_any(action, &["selector"])
                },
                key,
            },
            None => invalid(&tag, "press requires 'key'"),
        },
        "wait" | "wait_any" => {
            let selectors = get_selectors(action);
            if selectors.is_empty() {
                // A bare wait with a duration behaves like sleep.
                match get_u64(action, &["ms", "timeout"]) {
                    Some(ms) => StepKind::Sleep { ms },
                    None => invalid(&tag, "wait requires 'selector' or 'selectors'"),
                }
            } else {
                StepKind::Wait {
                    selectors,
                    state: WaitState::parse(action.get("state").and_then(|v| v.as_str())),
                }
            }
        }
        "wait_url" => match get_string_any(action, &["includes", "url"]) {
            Some(includes) => StepKind::WaitUrl { includes },
            None => invalid(&tag, "wait_url requires 'includes'"),
        },
        "sleep" => StepKind::Sleep {
            ms: get_u64(action, &["ms", "duration"]).unwrap_or(1_000),
        },
        "evaluate" => match get_string_any(action, &["script", "expression"]) {
            Some(script) => StepKind::Evaluate { script },
            None => invalid(&tag, "evaluate requires 'script'"),
        },
        "screenshot" => StepKind::Screenshot,
        "video_play" => StepKind::Video(VideoAction::Play),
        "video_force_play" => StepKind::Video(VideoAction::ForcePlay),
        "video_click_play" => StepKind::Video(VideoAction::ClickPlay),
        "video_keyboard_play" => StepKind::Video(VideoAction::KeyboardPlay),
        "wait_video_ready" => StepKind::Video(VideoAction::WaitReady),
        other => StepKind::Unknown {
            tag: other.to_string(),
        },
    };

    // `timeout` on a bare wait was consumed as its duration above.
    let timeout = match kind {
        StepKind::Sleep { .. } => None,
        _ => get_u64(action, &["timeout"]).map(Duration::from_millis),
    };

    Step {
        kind,
        optional: get_bool(action, "optional"),
        new_page: get_bool(action, "new_page"),
        timeout,
    }
}
