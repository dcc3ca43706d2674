use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime knobs for the whole pipeline. Every field has a default so a bare
/// environment still produces a working agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub dedup_window: Duration,
    pub max_query_chars: usize,
    pub search_results: usize,
    pub browser: BrowserConfig,
    pub service_enabled: bool,
    pub service_config_path: PathBuf,
    pub platforms_path: PathBuf,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub offline_planner: bool,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub session_timeout: Duration,
    pub step_timeout: Duration,
    pub dwell: Duration,
    pub executable: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            session_timeout: Duration::from_millis(120_000),
            step_timeout: Duration::from_millis(10_000),
            dwell: Duration::ZERO,
            executable: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_millis(4_000),
            max_query_chars: 2_000,
            search_results: 5,
            browser: BrowserConfig::default(),
            service_enabled: true,
            service_config_path: steer_dir().join("action_service.json"),
            platforms_path: steer_dir().join("platforms.json"),
            openai_api_key: None,
            openai_model: "gpt-4o".to_string(),
            offline_planner: false,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();
        Self {
            dedup_window: Duration::from_millis(env_u64("AGENT_DEDUP_WINDOW_MS", 4_000)),
            max_query_chars: env_u64("AGENT_MAX_QUERY_CHARS", 2_000) as usize,
            search_results: env_u64("AGENT_SEARCH_RESULTS", 5).max(1) as usize,
            browser: BrowserConfig {
                headless: env_flag("BROWSER_HEADLESS", true),
                session_timeout: Duration::from_millis(env_u64("BROWSER_SESSION_TIMEOUT_MS", 120_000)),
                step_timeout: Duration::from_millis(env_u64("BROWSER_STEP_TIMEOUT_MS", 10_000)),
                dwell: Duration::from_millis(env_u64("BROWSER_DWELL_MS", 0)),
                executable: env_nonempty("BROWSER_EXECUTABLE").map(PathBuf::from),
            },
            service_enabled: env_flag("ACTION_SERVICE_ENABLED", true),
            service_config_path: env_nonempty("ACTION_SERVICE_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.service_config_path),
            platforms_path: env_nonempty("AGENT_PLATFORMS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.platforms_path),
            openai_api_key: env_nonempty("OPENAI_API_KEY"),
            openai_model: env_nonempty("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            offline_planner: env_flag("AGENT_OFFLINE_PLANNER", false),
        }
    }
}

fn steer_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".steer")
}

pub(crate) fn env_flag(key: &str, default_val: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default_val,
    }
}

pub(crate) fn env_u64(key: &str, default_val: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default_val)
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_behaviour() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.dedup_window, Duration::from_secs(4));
        assert_eq!(cfg.search_results, 5);
        assert!(cfg.browser.headless);
        assert_eq!(cfg.browser.dwell, Duration::ZERO);
        assert!(cfg.platforms_path.ends_with("platforms.json"));
    }

    #[test]
    fn env_helpers_fall_back_on_garbage() {
        env::set_var("LWA_TEST_FLAG", "YES");
        env::set_var("LWA_TEST_NUM", "not-a-number");
        assert!(env_flag("LWA_TEST_FLAG", false));
        assert!(!env_flag("LWA_TEST_MISSING_FLAG", false));
        assert_eq!(env_u64("LWA_TEST_NUM", 7), 7);
        env::remove_var("LWA_TEST_FLAG");
        env::remove_var("LWA_TEST_NUM");
    }
}
