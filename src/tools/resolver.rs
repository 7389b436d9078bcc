//! Tool assignment for operational steps
//!
//! Maps a step description to a registered tool name. Email steps go through
//! the access strategy chooser; everything else is keyword scored. Resolution
//! never fails: it degrades to the generic executor.

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

use super::email_strategy::AccessStrategy;
use super::{ToolRegistry, GENERIC_EXECUTOR};

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[a-z0-9_]+").unwrap();
}

const EMAIL_TRIGGERS: &[&str] = &["email", "gmail", "mail"];

/// Bonus applied when the tool's own name appears in the description
const NAME_MATCH_BONUS: f64 = 2.0;

pub struct ToolResolver {
    registry: Arc<ToolRegistry>,
    email_strategy: Option<Arc<dyn AccessStrategy>>,
}

impl ToolResolver {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            email_strategy: None,
        }
    }

    pub fn with_email_strategy(mut self, strategy: Arc<dyn AccessStrategy>) -> Self {
        self.email_strategy = Some(strategy);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Pick the tool for a step description
    pub fn resolve(&self, task_description: &str) -> String {
        let desc = task_description.to_lowercase();

        if EMAIL_TRIGGERS.iter().any(|t| desc.contains(t)) {
            if let Some(strategy) = &self.email_strategy {
                if let Some(method) = strategy.select_access_method(task_description) {
                    let tool = strategy.get_tool_for_method(&method);
                    tracing::debug!("Email strategy chose {} for '{}'", tool, task_description);
                    return tool;
                }
                tracing::debug!("No email access method available, scoring keywords");
            }
        }

        match self.best_match(&desc) {
            Some((name, score)) => {
                tracing::debug!("Resolved '{}' to {} (score {:.1})", task_description, name, score);
                name
            }
            None => GENERIC_EXECUTOR.to_string(),
        }
    }

    /// Score of `tool_name` for a lowercased description, `0.0` when nothing matches
    pub fn score(&self, tool_name: &str, description: &str) -> f64 {
        let Some(spec) = self.registry.get(tool_name) else {
            return 0.0;
        };
        let desc = description.to_lowercase();
        let words: Vec<&str> = WORD.find_iter(&desc).map(|m| m.as_str()).collect();

        let keyword_hits = spec
            .keywords
            .iter()
            .filter(|k| words.iter().any(|w| word_matches(w, k)))
            .count() as f64;
        let name_hit = if desc.contains(&spec.name) || desc.contains(&spec.name.replace('_', " ")) {
            NAME_MATCH_BONUS
        } else {
            0.0
        };

        let matched = keyword_hits + name_hit;
        if matched == 0.0 {
            return 0.0;
        }
        matched + (10.0 - f64::from(spec.priority.min(10))) * 0.1
    }

    fn best_match(&self, desc: &str) -> Option<(String, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for spec in self.registry.tools() {
            let score = self.score(&spec.name, desc);
            // Strict comparison keeps the earliest registered tool on ties
            if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((spec.name.as_str(), score));
            }
        }
        best.map(|(name, score)| (name.to_string(), score))
    }
}

/// Exact word match, tolerating a plural suffix
fn word_matches(word: &str, keyword: &str) -> bool {
    word == keyword
        || word
            .strip_prefix(keyword)
            .is_some_and(|rest| rest == "s" || rest == "es")
}
