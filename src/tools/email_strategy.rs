//! Email access strategy selection
//!
//! Email steps can be carried out through several backends. Which one is
//! usable depends on the machine (API credentials, a local Mail app, a
//! browser session), so the resolver asks a chooser instead of scoring
//! keywords.

use serde::{Deserialize, Serialize};

use crate::config::EmailConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
    GmailApi,
    AppleMail,
    BrowserAutomation,
}

impl AccessMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMethod::GmailApi => "gmail_api",
            AccessMethod::AppleMail => "apple_mail",
            AccessMethod::BrowserAutomation => "browser_automation",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "gmail_api" | "gmail" | "api" => Some(AccessMethod::GmailApi),
            "apple_mail" | "mail_app" => Some(AccessMethod::AppleMail),
            "browser_automation" | "browser" => Some(AccessMethod::BrowserAutomation),
            _ => None,
        }
    }
}

/// Picks an access method for an email/browser task
pub trait AccessStrategy: Send + Sync {
    /// `None` when no method is currently available
    fn select_access_method(&self, task_description: &str) -> Option<AccessMethod>;

    fn get_tool_for_method(&self, method: &AccessMethod) -> String;
}

/// Default chooser driven by the `[email]` configuration section
#[derive(Debug, Clone)]
pub struct EmailStrategyManager {
    /// Available methods in preference order
    available: Vec<AccessMethod>,
}

impl EmailStrategyManager {
    pub fn new(available: Vec<AccessMethod>) -> Self {
        Self { available }
    }

    pub fn from_config(config: &EmailConfig) -> Self {
        let mut available = Vec::new();
        let mut push = |method: AccessMethod, enabled: bool| {
            if enabled && !available.contains(&method) {
                available.push(method);
            }
        };

        let enabled = |method: AccessMethod| match method {
            AccessMethod::GmailApi => config.gmail_api,
            AccessMethod::AppleMail => config.apple_mail,
            AccessMethod::BrowserAutomation => config.browser_automation,
        };

        if let Some(preferred) = config.preferred.as_deref().and_then(AccessMethod::parse) {
            push(preferred, enabled(preferred));
        }
        // APIs are more reliable than UI automation
        for method in [
            AccessMethod::GmailApi,
            AccessMethod::AppleMail,
            AccessMethod::BrowserAutomation,
        ] {
            push(method, enabled(method));
        }

        Self { available }
    }

    pub fn available_methods(&self) -> &[AccessMethod] {
        &self.available
    }

    fn is_available(&self, method: AccessMethod) -> bool {
        self.available.contains(&method)
    }
}

impl AccessStrategy for EmailStrategyManager {
    fn select_access_method(&self, task_description: &str) -> Option<AccessMethod> {
        let desc = task_description.to_lowercase();

        if (desc.contains("browser") || desc.contains("website") || desc.contains("web "))
            && self.is_available(AccessMethod::BrowserAutomation)
        {
            return Some(AccessMethod::BrowserAutomation);
        }
        if (desc.contains("apple mail") || desc.contains("mail app"))
            && self.is_available(AccessMethod::AppleMail)
        {
            return Some(AccessMethod::AppleMail);
        }

        self.available.first().copied()
    }

    fn get_tool_for_method(&self, method: &AccessMethod) -> String {
        method.as_str().to_string()
    }
}
