//! Plan parsing and the offline keyword planner.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::llm_gateway::{extract_json_object, LanguageModel};
use crate::orchestrator::templated_summary;
use crate::platforms::PlatformResolver;
use crate::prompts::PLAN_SYSTEM_PROMPT;
use crate::schema::{Action, ExecutionResult, Operation, Plan, PlanWire, BROWSER_PLATFORM};

pub fn try_parse_plan(text: &str) -> Result<Plan, AppError> {
    let value = extract_json_object(text)
        .ok_or_else(|| AppError::Planning("planner output contains no JSON object".to_string()))?;
    let wire: PlanWire = serde_json::from_value(value)
        .map_err(|e| AppError::Planning(format!("plan JSON has the wrong shape: {}", e)))?;
    Ok(Plan::from_wire(wire))
}

/// Never fails: unusable planner output becomes `{search, browser, [], query}`.
pub fn parse_plan(text: &str, query: &str) -> Plan {
    match try_parse_plan(text) {
        Ok(mut plan) => {
            if plan.context.trim().is_empty() {
                plan.context = query.to_string();
            }
            debug!(
                "[Planner] {} on {}",
                plan.operation_type().as_str(),
                plan.target_platform
            );
            plan
        }
        Err(e) => {
            warn!("[Planner] {}; using default search plan", e);
            Plan::fallback(query)
        }
    }
}

// =====================================================
// Offline planner
// =====================================================

const SEARCH_MARKERS: &[&str] = &["search", "find", "look up", "lookup", "搜索", "搜", "查找", "查一下"];
const PLAY_MARKERS: &[&str] = &["play", "watch", "播放", "观看", "看视频"];
const OPEN_PREFIXES: &[&str] = &["open ", "go to ", "visit ", "browse ", "打开", "访问"];

/// Deterministic rule-based stand-in for the language model.
pub struct KeywordPlanner {
    resolver: PlatformResolver,
}

impl KeywordPlanner {
    pub fn new(resolver: PlatformResolver) -> Self {
        Self { resolver }
    }

    pub fn plan(&self, query: &str) -> Plan {
        let lower = query.trim().to_lowercase();
        let has_marker = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

        if let Some(target) = open_target(query) {
            if let Some(url) = self.browse_url(target) {
                return Plan {
                    operation: Operation::Browse { url: Some(url) },
                    target_platform: BROWSER_PLATFORM.to_string(),
                    context: query.to_string(),
                };
            }
        }

        if let Some(entry) = self.resolver.detect(query) {
            if has_marker(SEARCH_MARKERS) || has_marker(PLAY_MARKERS) {
                let steps: Vec<Action> = self.resolver.canned_steps(&entry.domain, query);
                return Plan {
                    operation: Operation::Automate { steps },
                    target_platform: entry.domain.clone(),
                    context: query.to_string(),
                };
            }
        }

        if has_marker(SEARCH_MARKERS) || lower.ends_with('?') {
            return Plan::fallback(query);
        }

        Plan {
            operation: Operation::Answer,
            target_platform: BROWSER_PLATFORM.to_string(),
            context: query.to_string(),
        }
    }

    fn browse_url(&self, target: &str) -> Option<String> {
        let target = target.trim();
        if target.starts_with("http://") || target.starts_with("https://") {
            return Some(target.to_string());
        }
        if !target.contains(char::is_whitespace) && target.contains('.') {
            return Some(format!("https://{}", target));
        }
        self.resolver
            .find(target)
            .map(|entry| format!("https://www.{}", entry.domain))
    }
}

fn open_target(query: &str) -> Option<&str> {
    let trimmed = query.trim();
    let lower = trimmed.to_lowercase();
    OPEN_PREFIXES.iter().find_map(|prefix| {
        if lower.starts_with(prefix) {
            trimmed.get(prefix.len()..).map(str::trim).filter(|t| !t.is_empty())
        } else {
            None
        }
    })
}

fn field_after<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    text.find(label).map(|pos| &text[pos + label.len()..])
}

#[async_trait]
impl LanguageModel for KeywordPlanner {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        if system == PLAN_SYSTEM_PROMPT {
            let query = field_after(user, "REQUEST:")
                .and_then(|rest| rest.split("\n\n").next())
                .unwrap_or(user)
                .trim();
            let plan = self.plan(query);
            return Ok(serde_json::to_string(&plan.to_wire())?);
        }

        let query = field_after(user, "REQUEST:")
            .and_then(|rest| rest.split("\n\nEXECUTION RECORD:").next())
            .unwrap_or("")
            .trim();
        let record = field_after(user, "EXECUTION RECORD:").unwrap_or("").trim();
        let result: ExecutionResult = serde_json::from_str(record)?;
        Ok(templated_summary(query, &result))
    }
}
