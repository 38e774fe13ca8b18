use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::guardrails::{EnforcementMode, ServiceOptions};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub max_upload_bytes: usize,
    pub guardrails: ServiceOptions,
    /// Attach the LLM claim verifier to the truthfulness guardrail.
    pub llm_truthfulness: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("Required environment variable '{key}' is not set"))
        };
        let optional = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let guardrails = ServiceOptions {
            mode: optional("GUARDRAIL_MODE", "enforce")
                .parse::<EnforcementMode>()
                .map_err(|e| anyhow!(e))
                .context("GUARDRAIL_MODE is invalid")?,
            fail_fast: parse_bool(&optional("GUARDRAIL_FAIL_FAST", "false"))
                .context("GUARDRAIL_FAIL_FAST must be true or false")?,
            timeout: Duration::from_secs(
                optional("GUARDRAIL_TIMEOUT_SECS", "30")
                    .parse::<u64>()
                    .ok()
                    .filter(|s| *s > 0)
                    .context("GUARDRAIL_TIMEOUT_SECS must be a positive number of seconds")?,
            ),
        };

        Ok(Config {
            database_url: require("DATABASE_URL")?,
            s3_bucket: require("S3_BUCKET")?,
            s3_endpoint: require("S3_ENDPOINT")?,
            aws_access_key_id: require("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require("ANTHROPIC_API_KEY")?,
            port: optional("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional("RUST_LOG", "info"),
            max_upload_bytes: match lookup("MAX_UPLOAD_BYTES") {
                Some(v) => v
                    .parse::<usize>()
                    .context("MAX_UPLOAD_BYTES must be a number of bytes")?,
                None => DEFAULT_MAX_UPLOAD_BYTES,
            },
            guardrails,
            llm_truthfulness: parse_bool(&optional("ENABLE_LLM_TRUTHFULNESS", "false"))
                .context("ENABLE_LLM_TRUTHFULNESS must be true or false")?,
        })
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(anyhow!("'{other}' is not a boolean")),
    }
}
