//! Doctor command for system diagnostics
//!
//! Checks configuration, the Groq API, and the chunk store.

use colored::Colorize;
use std::time::Instant;

use crate::bootstrap::build_store;
use crate::config::Config;
use crate::streaming::GroqClient;

/// Health check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Pass,
    Warn(String),
    Fail(String),
}

/// Individual health check
#[derive(Debug)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
}

impl HealthCheck {
    fn new(name: &str, status: HealthStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
        }
    }
}

/// Doctor diagnostics system
pub struct Doctor {
    config: Config,
}

impl Doctor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run all health checks
    pub async fn run_diagnostics(&self) -> Vec<HealthCheck> {
        let mut checks = Vec::new();

        checks.push(self.check_configuration());
        checks.push(self.check_api_key());
        checks.push(self.check_groq_api().await);
        checks.push(self.check_models().await);
        checks.push(self.check_store().await);
        checks.push(self.check_embedder_cache());

        checks
    }

    /// Check 1: configuration values
    fn check_configuration(&self) -> HealthCheck {
        let problems: Vec<String> = self
            .config
            .validate()
            .into_iter()
            .filter(|p| !p.contains(crate::config::ENV_GROQ_API_KEY))
            .collect();

        if problems.is_empty() {
            HealthCheck::new("Configuration", HealthStatus::Pass)
        } else {
            HealthCheck::new("Configuration", HealthStatus::Fail(problems.join("; ")))
        }
    }

    /// Check 2: API key present
    fn check_api_key(&self) -> HealthCheck {
        match self.config.generator.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {
                if key.starts_with("gsk_") {
                    HealthCheck::new("API Key", HealthStatus::Pass)
                } else {
                    HealthCheck::new(
                        "API Key",
                        HealthStatus::Warn("Key does not look like a Groq key (gsk_...)".to_string()),
                    )
                }
            }
            _ => HealthCheck::new(
                "API Key",
                HealthStatus::Fail(format!("{} not set", crate::config::ENV_GROQ_API_KEY)),
            ),
        }
    }

    /// Check 3: Groq API reachable with our key
    async fn check_groq_api(&self) -> HealthCheck {
        let client = match GroqClient::new(&self.config.generator) {
            Ok(client) => client,
            Err(e) => return HealthCheck::new("Groq API", HealthStatus::Fail(e.to_string())),
        };

        let started = Instant::now();
        match client.health_check().await {
            Ok(true) => {
                let latency = started.elapsed().as_millis();
                if latency > 3000 {
                    HealthCheck::new("Groq API", HealthStatus::Warn(format!("Slow response ({} ms)", latency)))
                } else {
                    HealthCheck::new("Groq API", HealthStatus::Pass)
                }
            }
            Ok(false) => HealthCheck::new(
                "Groq API",
                HealthStatus::Fail(format!("{} rejected the request", client.base_url())),
            ),
            Err(e) => HealthCheck::new("Groq API", HealthStatus::Fail(e.to_string())),
        }
    }

    /// Check 4: configured models are served
    async fn check_models(&self) -> HealthCheck {
        let client = match GroqClient::new(&self.config.generator) {
            Ok(client) => client,
            Err(e) => return HealthCheck::new("Models", HealthStatus::Fail(e.to_string())),
        };

        match client.list_models().await {
            Ok(available) => {
                let missing: Vec<&String> = client
                    .models()
                    .iter()
                    .filter(|m| !available.contains(*m))
                    .collect();
                if missing.is_empty() {
                    HealthCheck::new("Models", HealthStatus::Pass)
                } else if missing.len() == client.models().len() {
                    HealthCheck::new("Models", HealthStatus::Fail("No configured model is available".to_string()))
                } else {
                    let names: Vec<&str> = missing.iter().map(|m| m.as_str()).collect();
                    HealthCheck::new("Models", HealthStatus::Warn(format!("Unavailable: {}", names.join(", "))))
                }
            }
            Err(e) => HealthCheck::new("Models", HealthStatus::Fail(format!("Cannot list models: {}", e))),
        }
    }

    /// Check 5: chunk store reachable and populated
    async fn check_store(&self) -> HealthCheck {
        let store = match build_store(&self.config.store) {
            Ok(store) => store,
            Err(e) => return HealthCheck::new("Chunk Store", HealthStatus::Fail(format!("{:#}", e))),
        };

        match store.count().await {
            Ok(0) => HealthCheck::new(
                "Chunk Store",
                HealthStatus::Warn(format!("{} is empty", store.describe())),
            ),
            Ok(_) => HealthCheck::new("Chunk Store", HealthStatus::Pass),
            Err(e) => HealthCheck::new("Chunk Store", HealthStatus::Fail(e.to_string())),
        }
    }

    /// Check 6: embedding model already downloaded
    fn check_embedder_cache(&self) -> HealthCheck {
        let cache = dirs::home_dir().map(|h| {
            h.join(".cache")
                .join("huggingface")
                .join("hub")
                .join(format!("models--{}", self.config.embedder.model_id.replace('/', "--")))
        });

        match cache {
            Some(path) if path.exists() => HealthCheck::new("Embedding Model", HealthStatus::Pass),
            _ => HealthCheck::new(
                "Embedding Model",
                HealthStatus::Warn(format!(
                    "{} not cached yet; it downloads on first question",
                    self.config.embedder.model_id
                )),
            ),
        }
    }

    /// Display diagnostics results
    pub fn display_results(checks: &[HealthCheck]) {
        println!("\n{}\n", "🔍 PotterBuddy System Diagnostics".bold());
        println!("{:<20} Status", "Check");
        println!("{}", "=".repeat(50));

        for check in checks {
            let line = match &check.status {
                HealthStatus::Pass => format!("✅ {}", "PASS".green()),
                HealthStatus::Warn(msg) => format!("⚠️  {}", format!("WARN: {}", msg).yellow()),
                HealthStatus::Fail(msg) => format!("❌ {}", format!("FAIL: {}", msg).red()),
            };
            println!("{:<20} {}", check.name, line);
        }

        println!();
    }

    /// True when no check failed
    pub fn overall_status(checks: &[HealthCheck]) -> bool {
        !checks.iter().any(|c| matches!(c.status, HealthStatus::Fail(_)))
    }
}
