//! Two-tier execution: the managed action service first, the local dispatcher
//! when the service is unavailable, errors, or reports failure.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dispatcher::{automation_target, with_scheme, ActionDispatcher};
use crate::mcp_client::{ActionService, ServiceResponse};
use crate::platforms::PlatformResolver;
use crate::schema::{EvidenceItem, ExecutionResult, ExecutionSource, Operation, Plan};

/// One way of carrying out a plan.
#[async_trait]
pub trait PlanExecutor: Send + Sync {
    async fn execute(&self, plan: &Plan, query: &str) -> Result<ExecutionResult>;

    /// Plans this executor has no capability for go straight to the next tier.
    fn supports(&self, _plan: &Plan) -> bool {
        true
    }
}

// =====================================================
// Preferred tier
// =====================================================

const PLAY_MARKERS: &[&str] = &["play", "watch", "播放"];

pub struct PreferredExecutor {
    service: Arc<dyn ActionService>,
    resolver: Arc<PlatformResolver>,
    search_results: usize,
}

/// A single capability call derived from a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub name: &'static str,
    pub params: Value,
}

impl PreferredExecutor {
    pub fn new(service: Arc<dyn ActionService>, resolver: Arc<PlatformResolver>, search_results: usize) -> Self {
        Self {
            service,
            resolver,
            search_results,
        }
    }

    fn wants_playback(&self, plan: &Plan, query: &str) -> bool {
        let lower = query.to_lowercase();
        matches!(plan.operation, Operation::Search | Operation::Automate { .. })
            && !plan.is_browser_platform()
            && self.resolver.is_video_platform(&plan.target_platform, query)
            && PLAY_MARKERS.iter().any(|m| lower.contains(m))
    }

    /// Translates the plan into the service's capability vocabulary.
    pub fn translate(&self, plan: &Plan, query: &str) -> Result<ServiceCall> {
        if self.wants_playback(plan, query) {
            let platform = self
                .resolver
                .find(&plan.target_platform)
                .map(|e| e.name.clone())
                .unwrap_or_else(|| plan.target_platform.clone());
            return Ok(ServiceCall {
                name: "play_first_result",
                params: json!({
                    "platform": platform,
                    "keyword": self.resolver.search_keyword(query),
                }),
            });
        }

        let call = match &plan.operation {
            Operation::Search if plan.is_browser_platform() => ServiceCall {
                name: "search_web",
                params: json!({ "query": query, "max_results": self.search_results }),
            },
            Operation::Search => ServiceCall {
                name: "automate_page",
                params: json!({
                    "url": self.resolver.search_url_or_generic(&plan.target_platform, query),
                    "steps": [],
                }),
            },
            Operation::Browse { url: Some(url) } => ServiceCall {
                name: "fetch_page",
                params: json!({ "url": with_scheme(url) }),
            },
            Operation::Browse { url: None } => bail!("browse plan has no url"),
            Operation::Automate { steps } => {
                let steps = if steps.is_empty() {
                    self.resolver.canned_steps(&plan.target_platform, query)
                } else {
                    steps.clone()
                };
                ServiceCall {
                    name: "automate_page",
                    params: json!({
                        "url": automation_target(plan, &steps),
                        "steps": steps.iter().map(|s| s.to_value()).collect::<Vec<_>>(),
                    }),
                }
            }
            Operation::Answer => bail!("answer plans need no service call"),
        };
        Ok(call)
    }
}

#[async_trait]
impl PlanExecutor for PreferredExecutor {
    async fn execute(&self, plan: &Plan, query: &str) -> Result<ExecutionResult> {
        let call = self.translate(plan, query)?;
        self.service.start().await?;
        info!("[Tier] preferred service: {}", call.name);
        let response = self.service.execute_action(call.name, call.params.clone()).await?;
        Ok(response_to_result(plan, &call, response))
    }

    fn supports(&self, plan: &Plan) -> bool {
        !matches!(plan.operation, Operation::Answer)
    }
}

fn text_field<'a>(item: &'a Value, keys: &[&str]) -> &'a str {
    keys.iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .unwrap_or("")
}

fn response_to_result(plan: &Plan, call: &ServiceCall, response: ServiceResponse) -> ExecutionResult {
    let mut result = ExecutionResult::for_plan(plan);
    if !response.success {
        result.error = Some(
            response
                .error
                .unwrap_or_else(|| format!("{} reported failure", call.name)),
        );
        return result;
    }

    let payload = response.result.unwrap_or(Value::Null);
    let href = call.params["url"].as_str().unwrap_or("").to_string();

    if let Some(items) = payload.get("results").and_then(Value::as_array) {
        for item in items {
            result.evidence.push(EvidenceItem::new(
                text_field(item, &["title", "name"]),
                text_field(item, &["href", "url", "link"]),
                text_field(item, &["body", "snippet", "description"]),
            ));
        }
    }
    if result.evidence.is_empty() {
        let body = match &payload {
            Value::String(s) => s.clone(),
            Value::Null => "done".to_string(),
            other => other
                .get("summary")
                .or_else(|| other.get("text"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        };
        let href = payload
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(href);
        result
            .evidence
            .push(EvidenceItem::new(format!("Action service: {}", call.name), href, body));
    }

    result.steps_executed = payload
        .get("steps_executed")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .or_else(|| call.params["steps"].as_array().map(Vec::len))
        .unwrap_or(1);
    result.success = true;
    result
}

// =====================================================
// Local tier
// =====================================================

pub struct LocalExecutor {
    dispatcher: ActionDispatcher,
}

impl LocalExecutor {
    pub fn new(dispatcher: ActionDispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl PlanExecutor for LocalExecutor {
    async fn execute(&self, plan: &Plan, query: &str) -> Result<ExecutionResult> {
        Ok(self.dispatcher.dispatch(plan, query).await)
    }
}

// =====================================================
// Tiering decorator
// =====================================================

/// Tries `preferred`, and on `success=false` or any error hands the same plan to
/// `fallback`. The result is tagged with the tier that produced it.
pub struct TieredExecutor {
    preferred: Option<Arc<dyn PlanExecutor>>,
    fallback: Arc<dyn PlanExecutor>,
}

impl TieredExecutor {
    pub fn new(preferred: Option<Arc<dyn PlanExecutor>>, fallback: Arc<dyn PlanExecutor>) -> Self {
        Self { preferred, fallback }
    }

    pub fn local_only(fallback: Arc<dyn PlanExecutor>) -> Self {
        Self::new(None, fallback)
    }

    /// Never fails.
    pub async fn run(&self, plan: &Plan, query: &str) -> ExecutionResult {
        if let Some(preferred) = self.preferred.as_ref().filter(|p| p.supports(plan)) {
            match preferred.execute(plan, query).await {
                Ok(result) if result.success => {
                    info!("[Tier] preferred service succeeded");
                    return result.tagged(ExecutionSource::Preferred);
                }
                Ok(result) => warn!(
                    "[Tier] preferred service reported failure, falling back: {}",
                    result.error.as_deref().unwrap_or("no detail")
                ),
                Err(e) => warn!("[Tier] preferred service unavailable, falling back: {:#}", e),
            }
        } else {
            debug!("[Tier] skipping preferred tier for {}", plan.operation_type().as_str());
        }

        match self.fallback.execute(plan, query).await {
            Ok(result) => result,
            Err(e) => {
                warn!("[Tier] local execution failed: {:#}", e);
                ExecutionResult::failed(plan, format!("{:#}", e))
            }
        }
        .tagged(ExecutionSource::Local)
    }
}

#[async_trait]
impl PlanExecutor for TieredExecutor {
    async fn execute(&self, plan: &Plan, query: &str) -> Result<ExecutionResult> {
        Ok(self.run(plan, query).await)
    }
}
