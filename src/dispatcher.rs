use std::sync::Arc;
use tracing::{info, warn};

use crate::action_schema::{parse_step, StepKind};
use crate::platforms::PlatformResolver;
use crate::schema::{Action, EvidenceItem, ExecutionResult, Operation, Plan};
use crate::step_interpreter::{RunReport, StepInterpreter};
use crate::web_tools::{browser_target, WebTools};

/// Routes a plan to its operation branch and runs it locally.
pub struct ActionDispatcher {
    web: Arc<dyn WebTools>,
    resolver: Arc<PlatformResolver>,
    interpreter: Arc<StepInterpreter>,
    search_results: usize,
}

impl ActionDispatcher {
    pub fn new(
        web: Arc<dyn WebTools>,
        resolver: Arc<PlatformResolver>,
        interpreter: Arc<StepInterpreter>,
        search_results: usize,
    ) -> Self {
        Self {
            web,
            resolver,
            interpreter,
            search_results: search_results.max(1),
        }
    }

    /// Every failure is folded into the returned result.
    pub async fn dispatch(&self, plan: &Plan, query: &str) -> ExecutionResult {
        info!(
            "[Dispatch] {} on '{}'",
            plan.operation_type().as_str(),
            plan.target_platform
        );
        match &plan.operation {
            Operation::Search if plan.is_browser_platform() => self.browser_search(plan, query).await,
            Operation::Search => self.platform_search(plan, query).await,
            Operation::Browse { url } => self.browse(plan, url.as_deref()).await,
            Operation::Automate { steps } => self.automate(plan, query, steps).await,
            Operation::Answer => {
                let mut result = ExecutionResult::for_plan(plan);
                result.success = true;
                result.evidence.push(EvidenceItem::new(
                    "Answer",
                    "",
                    "No browsing needed; answered directly.",
                ));
                result
            }
        }
    }

    async fn browser_search(&self, plan: &Plan, query: &str) -> ExecutionResult {
        let mut result = ExecutionResult::for_plan(plan);

        let open_url = browser_target(query);
        let opened = self.web.open_in_browser(query).await;
        result.evidence.push(EvidenceItem::new(
            "Opened browser search",
            open_url.clone(),
            if opened {
                format!("Opened a browser window for '{}'", query)
            } else {
                format!("Could not open a browser window for '{}'", query)
            },
        ));

        let searched = match self.web.search(query, self.search_results).await {
            Ok(hits) => {
                if hits.is_empty() {
                    result.evidence.push(EvidenceItem::new(
                        "Web search",
                        open_url,
                        "Search returned no results",
                    ));
                }
                for hit in hits.into_iter().take(self.search_results) {
                    result.evidence.push(EvidenceItem::new(hit.title, hit.href, hit.body));
                }
                true
            }
            Err(e) => {
                warn!("[Dispatch] web search failed: {:#}", e);
                result
                    .evidence
                    .push(EvidenceItem::new("Web search failed", open_url, format!("{:#}", e)));
                false
            }
        };

        result.steps_executed = 2;
        result.success = opened || searched;
        if !result.success {
            result.error = Some("browser open and web search both failed".to_string());
        }
        result
    }

    async fn platform_search(&self, plan: &Plan, query: &str) -> ExecutionResult {
        let mut result = ExecutionResult::for_plan(plan);
        let url = self
            .resolver
            .search_url_or_generic(&plan.target_platform, query);
        let opened = self.web.open_in_browser(&url).await;
        result.evidence.push(EvidenceItem::new(
            format!("Search on {}", plan.target_platform),
            url.clone(),
            if opened { "Opened search results" } else { "Could not open search results" },
        ));
        result.steps_executed = 1;
        result.success = opened;
        if !opened {
            result.error = Some(format!("failed to open {}", url));
        }
        result
    }

    async fn browse(&self, plan: &Plan, url: Option<&str>) -> ExecutionResult {
        let Some(url) = url.map(with_scheme) else {
            return ExecutionResult::failed(plan, "browse plan has no url");
        };
        let mut result = ExecutionResult::for_plan(plan);
        let opened = self.web.open_in_browser(&url).await;
        let fetched = self.web.fetch(&url).await;

        let (title, body) = match &fetched {
            Ok(text) => (format!("Opened {}", url), text.clone()),
            Err(e) => {
                warn!("[Dispatch] fetch {} failed: {:#}", url, e);
                (
                    format!("Opened {}", url),
                    if opened {
                        format!("Page opened in browser; content unavailable ({:#})", e)
                    } else {
                        format!("{:#}", e)
                    },
                )
            }
        };
        result.evidence.push(EvidenceItem::new(title, url.clone(), body));
        result.steps_executed = 1;
        result.success = opened || fetched.is_ok();
        if !result.success {
            result.error = Some(format!("could not open or fetch {}", url));
        }
        result
    }

    async fn automate(&self, plan: &Plan, query: &str, steps: &[Action]) -> ExecutionResult {
        let canned;
        let steps = if steps.is_empty() {
            info!("[Dispatch] no steps supplied, using canned sequence");
            canned = self.resolver.canned_steps(&plan.target_platform, query);
            canned.as_slice()
        } else {
            steps
        };

        let target = automation_target(plan, steps);
        let report = self.interpreter.run(target.as_deref(), steps).await;
        report_to_result(plan, target.as_deref(), &report)
    }
}

/// The first navigate URL in step order, else the platform itself.
pub fn automation_target(plan: &Plan, steps: &[Action]) -> Option<String> {
    let first_navigate = steps.iter().find_map(|action| match parse_step(action).kind {
        StepKind::Navigate { url } => Some(url),
        _ => None,
    });
    match first_navigate {
        Some(url) => Some(with_scheme(&url)),
        None if plan.is_browser_platform() => None,
        None => Some(with_scheme(plan.target_platform.trim())),
    }
}

pub fn with_scheme(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") || url.starts_with("about:") || url.starts_with("data:") {
        url.to_string()
    } else {
        format!("https://{}", url.trim_start_matches("//"))
    }
}

fn report_to_result(plan: &Plan, target: Option<&str>, report: &RunReport) -> ExecutionResult {
    let mut result = ExecutionResult::for_plan(plan);
    result.success = report.success;
    result.steps_executed = report.steps_executed;
    result.error = report.error.clone();

    let href = report
        .final_url
        .clone()
        .or_else(|| target.map(str::to_string))
        .unwrap_or_default();
    let title = format!(
        "Automation on {}: {}/{} steps",
        plan.target_platform, report.steps_executed, report.total_steps
    );
    result
        .evidence
        .push(EvidenceItem::new(title, href, report.transcript()));
    for shot in &report.screenshots {
        result.evidence.push(EvidenceItem::new(
            "Screenshot",
            format!("file://{}", shot.display()),
            "Captured page",
        ));
    }
    result
}
