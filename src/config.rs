use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::tools::ToolSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub planning: PlanningConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Upper bound on completion length for every planning call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Base URL for API (optional, for Ollama or custom endpoints)
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    OpenAI,
    #[serde(rename = "openai-generic")]
    OpenAIGeneric,
}

fn default_model() -> String {
    "llama3.1".to_string()
}

fn default_max_tokens() -> usize {
    1024
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            base_url: None,
        }
    }
}

/// Sizing and retry policy for hierarchical planning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningConfig {
    /// Ask the LLM to rate complexity; when false the heuristic is used directly
    #[serde(default = "default_true")]
    pub use_llm_assessment: bool,

    /// Goal text longer than this is truncated before being embedded in a prompt
    #[serde(default = "default_max_goal_chars")]
    pub max_goal_chars: usize,

    /// LLM replies longer than this are treated as malformed
    #[serde(default = "default_max_response_chars")]
    pub max_response_chars: usize,

    /// Failed operational attempts tolerated under one tactical parent
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_parent: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_goal_chars() -> usize {
    2000
}

fn default_max_response_chars() -> usize {
    16_000
}

fn default_max_attempts() -> usize {
    3
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            use_llm_assessment: true,
            max_goal_chars: default_max_goal_chars(),
            max_response_chars: default_max_response_chars(),
            max_attempts_per_parent: default_max_attempts(),
        }
    }
}

/// Which email access methods are usable on this machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub gmail_api: bool,
    #[serde(default = "default_true")]
    pub browser_automation: bool,
    #[serde(default)]
    pub apple_mail: bool,
    /// Preferred method name (`gmail_api`, `browser_automation`, `apple_mail`)
    #[serde(default)]
    pub preferred: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            gmail_api: false,
            browser_automation: true,
            apple_mail: false,
            preferred: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Additional tools merged into the built-in registry
    #[serde(default)]
    pub extra: Vec<ToolSpec>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &std::path::Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("atlas").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        // Prefer a hosted provider when a key is present in the environment
        let llm = if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            LlmConfig {
                provider: LlmProvider::OpenAI,
                api_key: Some(key),
                model: "gpt-4o-mini".to_string(),
                ..LlmConfig::default()
            }
        } else {
            LlmConfig::default()
        };

        Self {
            llm,
            planning: PlanningConfig::default(),
            email: EmailConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}
