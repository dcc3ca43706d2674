//! Agent pipeline: validate → gate → plan → execute (tiered) → answer.
//!
//! Every path produces an `AgentResponse`. Only an invalid query is reported
//! as an error; planning, execution and answering failures are downgraded.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::browser_automation::ChromiumLauncher;
use crate::config::AgentConfig;
use crate::dispatcher::ActionDispatcher;
use crate::error::AppError;
use crate::llm_gateway::{LLMClient, LanguageModel};
use crate::mcp_client::McpActionService;
use crate::planner::{parse_plan, KeywordPlanner};
use crate::platforms::PlatformResolver;
use crate::prompts::{answer_user_prompt, plan_user_prompt, ANSWER_SYSTEM_PROMPT, PLAN_SYSTEM_PROMPT};
use crate::request_gate::{GateDecision, RequestGate, SkipReason};
use crate::schema::{ExecutionResult, Plan};
use crate::security::sanitize_query;
use crate::step_interpreter::StepInterpreter;
use crate::tiered_executor::{LocalExecutor, PlanExecutor, PreferredExecutor, TieredExecutor};
use crate::web_tools::SystemWebTools;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Completed,
    Skipped,
    Busy,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub request_id: String,
    pub status: ResponseStatus,
    /// Operation type that ran, or "skipped" / "busy" / "rejected".
    pub plan: String,
    pub answer: String,
    pub evidence_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AgentResponse {
    fn short_circuit(status: ResponseStatus, plan: &str, answer: String, error: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            status,
            plan: plan.to_string(),
            answer,
            evidence_count: 0,
            execution: None,
            error,
            created_at: Utc::now(),
        }
    }

    fn skipped(reason: SkipReason) -> Self {
        match reason {
            SkipReason::Duplicate => Self::short_circuit(
                ResponseStatus::Skipped,
                "skipped",
                "Same request was just handled; skipped.".to_string(),
                None,
            ),
            SkipReason::Busy => Self::short_circuit(
                ResponseStatus::Busy,
                "busy",
                "Another request is still running; try again shortly.".to_string(),
                None,
            ),
        }
    }

    fn completed(plan: &Plan, execution: ExecutionResult, answer: String) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            status: ResponseStatus::Completed,
            plan: plan.operation_type().as_str().to_string(),
            answer,
            evidence_count: execution.evidence.len(),
            execution: Some(execution),
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// Deterministic prose used when the answer collaborator is unavailable.
pub fn templated_summary(query: &str, result: &ExecutionResult) -> String {
    let mut lines = Vec::new();
    let outcome = if result.success { "Completed" } else { "Could not complete" };
    lines.push(format!(
        "{} {} on {} for \"{}\".",
        outcome,
        result.operation_type.as_str(),
        result.target_platform,
        query
    ));
    for item in result.evidence.iter().take(5) {
        if item.href.is_empty() {
            lines.push(format!("- {}", item.title));
        } else {
            lines.push(format!("- {} ({})", item.title, item.href));
        }
    }
    if result.evidence.len() > 5 {
        lines.push(format!("…and {} more.", result.evidence.len() - 5));
    }
    if let Some(err) = &result.error {
        lines.push(format!("Problem: {}", err));
    }
    lines.join("\n")
}

pub struct AgentPipeline {
    gate: RequestGate,
    model: Arc<dyn LanguageModel>,
    executor: Arc<dyn PlanExecutor>,
    max_query_chars: usize,
}

impl AgentPipeline {
    pub fn new(
        gate: RequestGate,
        model: Arc<dyn LanguageModel>,
        executor: Arc<dyn PlanExecutor>,
        max_query_chars: usize,
    ) -> Self {
        Self {
            gate,
            model,
            executor,
            max_query_chars,
        }
    }

    /// Wires the production collaborators. Missing model credentials are fatal
    /// unless the offline planner is enabled.
    pub fn from_config(config: &AgentConfig) -> Result<Self, AppError> {
        let api_key = match (&config.openai_api_key, config.offline_planner) {
            (_, true) => None,
            (Some(key), false) => Some(key.as_str()),
            (None, false) => {
                return Err(AppError::Config(
                    "OPENAI_API_KEY is not set (set AGENT_OFFLINE_PLANNER=1 to run without a model)"
                        .to_string(),
                ))
            }
        };

        let resolver = Arc::new(PlatformResolver::load_or_default(&config.platforms_path));

        let model: Arc<dyn LanguageModel> = match api_key {
            Some(key) => Arc::new(
                LLMClient::new(key, &config.openai_model)
                    .map_err(|e| AppError::Config(format!("{:#}", e)))?,
            ),
            None => {
                info!("[Pipeline] using offline keyword planner");
                Arc::new(KeywordPlanner::new((*resolver).clone()))
            }
        };

        let web = SystemWebTools::new().map_err(|e| AppError::Config(format!("{:#}", e)))?;
        let interpreter = StepInterpreter::from_config(Arc::new(ChromiumLauncher), &config.browser);
        let dispatcher = ActionDispatcher::new(
            Arc::new(web),
            Arc::clone(&resolver),
            Arc::new(interpreter),
            config.search_results,
        );
        let local: Arc<dyn PlanExecutor> = Arc::new(LocalExecutor::new(dispatcher));

        let preferred: Option<Arc<dyn PlanExecutor>> = if config.service_enabled {
            match McpActionService::from_config_file(&config.service_config_path) {
                Ok(service) => Some(Arc::new(PreferredExecutor::new(
                    Arc::new(service),
                    Arc::clone(&resolver),
                    config.search_results,
                ))),
                Err(e) => {
                    warn!("[Pipeline] action service config unusable, local only: {:#}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(
            RequestGate::new(config.dedup_window),
            model,
            Arc::new(TieredExecutor::new(preferred, local)),
            config.max_query_chars,
        ))
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub async fn handle(&self, raw_query: &str) -> AgentResponse {
        let query = match sanitize_query(raw_query, self.max_query_chars) {
            Ok(q) => q,
            Err(e) => {
                info!("[Pipeline] rejected query: {}", e);
                return AgentResponse::short_circuit(
                    ResponseStatus::Rejected,
                    "rejected",
                    e.to_string(),
                    Some(e.to_string()),
                );
            }
        };

        let permit = match self.gate.acquire(query.as_str()) {
            GateDecision::Proceed(permit) => permit,
            GateDecision::Skip(reason) => {
                info!("[Gate] skipped '{}': {}", query, reason.as_str());
                return AgentResponse::skipped(reason);
            }
        };

        let outcome = AssertUnwindSafe(self.run(query.as_str())).catch_unwind().await;
        drop(permit);

        match outcome {
            Ok(response) => response,
            Err(_) => {
                error!("[Pipeline] execution panicked for '{}'", query);
                let plan = Plan::fallback(query.as_str());
                let execution = ExecutionResult::failed(&plan, "internal error during execution");
                let answer = templated_summary(query.as_str(), &execution);
                AgentResponse::completed(&plan, execution, answer)
            }
        }
    }

    async fn run(&self, query: &str) -> AgentResponse {
        let plan = match self.model.complete(PLAN_SYSTEM_PROMPT, &plan_user_prompt(query)).await {
            Ok(text) => parse_plan(&text, query),
            Err(e) => {
                warn!("[Pipeline] planner unavailable, using default plan: {:#}", e);
                Plan::fallback(query)
            }
        };
        info!(
            "[Pipeline] plan: {} on {}",
            plan.operation_type().as_str(),
            plan.target_platform
        );

        let execution = match self.executor.execute(&plan, query).await {
            Ok(result) => result,
            Err(e) => {
                warn!("[Pipeline] execution failed: {:#}", e);
                ExecutionResult::failed(&plan, format!("{:#}", e))
            }
        };

        let answer = self.answer(query, &execution).await;
        AgentResponse::completed(&plan, execution, answer)
    }

    async fn answer(&self, query: &str, execution: &ExecutionResult) -> String {
        let record = match serde_json::to_string_pretty(execution) {
            Ok(json) => json,
            Err(e) => {
                warn!("[Pipeline] could not serialize execution record: {}", e);
                return templated_summary(query, execution);
            }
        };
        match self
            .model
            .complete(ANSWER_SYSTEM_PROMPT, &answer_user_prompt(query, &record))
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("[Pipeline] answer collaborator returned nothing, using summary");
                templated_summary(query, execution)
            }
            Err(e) => {
                warn!("[Pipeline] answer collaborator failed, using summary: {:#}", e);
                templated_summary(query, execution)
            }
        }
    }
}
