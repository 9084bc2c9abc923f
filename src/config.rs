use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").context("GEMINI_API_KEY not set")?;
        let model = std::env::var("PAM_MODEL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_base = std::env::var("PAM_API_BASE")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        Ok(Self {
            api_key,
            model,
            api_base,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.model.starts_with("gemini-") {
            eprintln!("⚠️  WARNING: unexpected model name: {}", self.model);
            eprintln!("    Valid examples:");
            eprintln!("    - gemini-2.5-flash");
            eprintln!("    - gemini-2.5-pro");
        }

        Ok(())
    }
}
