use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::risk::{GradePolicy, RiskPolicy};

/// Runtime configuration. Threshold constants drifted across the dashboard
/// pages this service replaces, so every cutoff is policy-driven here and
/// overridable from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    /// Marks threshold separating pass from fail rows.
    pub pass_mark: f64,
    pub risk: RiskPolicy,
    pub grading: GradePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            jwt_secret: "academic-insights-dev-secret".to_string(),
            token_ttl_minutes: 8 * 60,
            pass_mark: 40.0,
            risk: RiskPolicy::default(),
            grading: GradePolicy::default(),
        }
    }
}

/// Loads config from ACADEMIC_INSIGHTS_CONFIG, falling back to
/// ./academic-insights.toml, falling back to defaults. JWT_SECRET in the
/// environment always wins over the file value.
pub fn load() -> anyhow::Result<AppConfig> {
    let path = std::env::var("ACADEMIC_INSIGHTS_CONFIG")
        .unwrap_or_else(|_| "academic-insights.toml".to_string());

    let mut config = if Path::new(&path).exists() {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {path}"))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse config file {path}"))?
    } else {
        AppConfig::default()
    };

    if let Ok(secret) = std::env::var("JWT_SECRET") {
        config.jwt_secret = secret;
    }
    if let Ok(addr) = std::env::var("BIND_ADDR") {
        config.bind_addr = addr;
    }

    Ok(config)
}
