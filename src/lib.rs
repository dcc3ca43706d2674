pub mod action_schema;
pub mod browser_automation;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod llm_gateway;
pub mod mcp_client;
pub mod orchestrator;
pub mod planner;
pub mod platforms;
pub mod prompts;
pub mod request_gate;
pub mod schema;
pub mod security;
pub mod step_interpreter;
pub mod tiered_executor;
pub mod web_tools;

#[cfg(test)]
mod testing;

pub use config::AgentConfig;
pub use error::AppError;
pub use orchestrator::{AgentPipeline, AgentResponse, ResponseStatus};
