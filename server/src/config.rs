use std::time::Duration;

use serde::Deserialize;

use crate::background::OrchestratorConfig;

/// Environment configuration. `GITHUB_TOKEN` may be absent: the stats
/// source then reports missing credentials per fetch and the orchestrator
/// counts those as errors instead of crashing the process.
#[derive(Debug, Deserialize)]
pub struct Env {
    pub database_url: String,
    pub github_token: Option<String>,
    pub background_update_interval_ms: Option<u64>,
    pub background_update_batch_size: Option<usize>,
    pub background_update_batch_delay_ms: Option<u64>,
}

impl Env {
    pub fn load() -> anyhow::Result<Self> {
        Ok(envy::from_env::<Env>()?)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            interval: Duration::from_millis(self.background_update_interval_ms.unwrap_or(300_000)),
            batch_size: self.background_update_batch_size.unwrap_or(5),
            batch_delay: Duration::from_millis(
                self.background_update_batch_delay_ms.unwrap_or(2_000),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orchestrator_defaults_apply_when_env_is_silent() {
        let env = Env {
            database_url: "postgres://localhost/gitquest".to_string(),
            github_token: None,
            background_update_interval_ms: None,
            background_update_batch_size: None,
            background_update_batch_delay_ms: None,
        };
        let config = env.orchestrator_config();
        assert_eq!(config.interval, Duration::from_millis(300_000));
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.batch_delay, Duration::from_millis(2_000));
    }

    #[test]
    fn orchestrator_knobs_come_from_the_environment() {
        let env = Env {
            database_url: "postgres://localhost/gitquest".to_string(),
            github_token: Some("token".to_string()),
            background_update_interval_ms: Some(60_000),
            background_update_batch_size: Some(10),
            background_update_batch_delay_ms: Some(500),
        };
        let config = env.orchestrator_config();
        assert_eq!(config.interval, Duration::from_millis(60_000));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.batch_delay, Duration::from_millis(500));
    }
}
