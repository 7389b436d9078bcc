//! Tool registry and execution seam
//!
//! `ToolRegistry` holds the capabilities an operational step can be bound to;
//! `ToolExecutor` is how the adaptive executor invokes them by name.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::planning::TaskNode;

pub mod email_strategy;
pub mod resolver;

pub use email_strategy::{AccessMethod, AccessStrategy, EmailStrategyManager};
pub use resolver::ToolResolver;

/// Tool used when nothing in the registry matches a step
pub const GENERIC_EXECUTOR: &str = "generic_executor";

/// Registry entry describing one executable capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    /// Lower is more specific; used as a tie-break when scoring
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Plugin backing this tool, if any
    #[serde(default)]
    pub plugin: Option<String>,
    #[serde(default)]
    pub description: String,
}

fn default_priority() -> u8 {
    5
}

impl ToolSpec {
    pub fn new(name: &str, category: &str, keywords: &[&str], priority: u8) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            priority,
            plugin: None,
            description: String::new(),
        }
    }

    pub fn with_plugin(mut self, plugin: &str) -> Self {
        self.plugin = Some(plugin.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// Static mapping of tool name to category, keywords and priority
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    /// Registry with no tools at all
    pub fn empty() -> Self {
        Self { tools: vec![] }
    }

    /// The built-in Atlas tool set
    pub fn new() -> Self {
        let mut registry = Self::empty();
        // Desktop
        registry.register(
            ToolSpec::new(
                "screenshot_tool",
                "screenshot",
                &["screenshot", "screen", "capture", "snapshot", "display"],
                2,
            )
            .with_plugin("system")
            .with_description("Capture the screen or a window"),
        );
        registry.register(
            ToolSpec::new(
                "file_manager",
                "files",
                &["file", "folder", "directory", "save", "download", "document", "move", "rename"],
                4,
            )
            .with_plugin("system")
            .with_description("Create, move and organize local files"),
        );
        // Web
        registry.register(
            ToolSpec::new(
                "browser_automation",
                "browser",
                &["browser", "website", "web", "page", "navigate", "click", "url", "login", "form"],
                3,
            )
            .with_plugin("browser")
            .with_description("Drive a web browser"),
        );
        registry.register(
            ToolSpec::new(
                "web_search",
                "search",
                &["search", "lookup", "research", "google", "query", "find"],
                4,
            )
            .with_plugin("browser")
            .with_description("Search the web"),
        );
        // Email
        registry.register(
            ToolSpec::new(
                "gmail_api",
                "email",
                &["gmail", "email", "inbox", "mail", "message"],
                2,
            )
            .with_plugin("email")
            .with_description("Read and send mail through the Gmail API"),
        );
        registry.register(
            ToolSpec::new("apple_mail", "email", &["mail", "email", "inbox"], 3)
                .with_plugin("email")
                .with_description("Control the local Mail application"),
        );
        // Text and scheduling
        registry.register(
            ToolSpec::new(
                "text_summarizer",
                "analysis",
                &["summarize", "summary", "analyze", "review", "report", "extract", "verify"],
                3,
            )
            .with_description("Summarize or analyze text with the LLM"),
        );
        registry.register(
            ToolSpec::new(
                "calendar_tool",
                "calendar",
                &["calendar", "schedule", "meeting", "event", "appointment"],
                3,
            )
            .with_plugin("calendar")
            .with_description("Read and create calendar events"),
        );
        registry.register(
            ToolSpec::new(GENERIC_EXECUTOR, "generic", &[], 10)
                .with_description("Ask the assistant to carry out the step directly"),
        );
        registry
    }

    /// Add a tool, replacing any existing entry with the same name in place
    pub fn register(&mut self, spec: ToolSpec) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name == spec.name) {
            *existing = spec;
        } else {
            self.tools.push(spec);
        }
    }

    pub fn with_extra(mut self, extra: &[ToolSpec]) -> Self {
        for spec in extra {
            self.register(spec.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Tools in registration order
    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Backend that actually runs an operational step with a named tool
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, task: &TaskNode) -> Result<String>;
}

/// Executor that only reports what would run
pub struct DryRunExecutor;

#[async_trait]
impl ToolExecutor for DryRunExecutor {
    async fn execute(&self, tool_name: &str, task: &TaskNode) -> Result<String> {
        tracing::info!("[dry run] {} -> {}", tool_name, task.title);
        Ok(format!("{} would run: {}", tool_name, task.title))
    }
}
