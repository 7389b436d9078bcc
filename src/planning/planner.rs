//! LLM-backed planners for the three tree levels
//!
//! One `LevelPlanner` per level. Each asks the LLM for exactly `count` items
//! as strict JSON and always returns usable drafts: short replies are padded,
//! long ones truncated, and any failure degrades to a single placeholder.

use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::PlanningConfig;
use crate::llm::LlmClient;

use super::types::{PlanContext, TaskDraft, TaskLevel, TaskNode};

const STRATEGIC_PROMPT: &str = r#"You are the STRATEGIC planner of a desktop assistant.
Split the user's goal into high-level phases that together achieve it, in execution order.

## Output Format:
Respond with ONLY a JSON object (no markdown, no explanation):
{
  "tasks": [
    {"title": "Short phase title", "description": "What this phase accomplishes"}
  ]
}

Return exactly the number of phases requested."#;

const TACTICAL_PROMPT: &str = r#"You are the TACTICAL planner of a desktop assistant.
Break one phase of a larger goal into concrete sub-goals, in execution order.

## Output Format:
Respond with ONLY a JSON object (no markdown, no explanation):
{
  "tasks": [
    {"title": "Short sub-goal title", "description": "What must be true when it is done"}
  ]
}

Return exactly the number of sub-goals requested."#;

const OPERATIONAL_PROMPT: &str = r#"You are the OPERATIONAL planner of a desktop assistant.
Turn a sub-goal into single actions, each performed by one tool.

## Guidelines:
1. One action per step, imperative form ("Open the inbox", "Capture the screen")
2. Mention the object being acted on so the right tool can be chosen
3. Prefer tools from the available list

## Output Format:
Respond with ONLY a JSON object (no markdown, no explanation):
{
  "tasks": [
    {"title": "Short action", "description": "Precise action description", "tools": ["tool_name"]}
  ]
}

Return exactly the number of steps requested."#;

/// Response structure from LLM planning
#[derive(Debug, Deserialize)]
struct DraftListResponse {
    tasks: Vec<DraftResponse>,
}

#[derive(Debug, Deserialize)]
struct DraftResponse {
    title: String,
    description: String,
    #[serde(default)]
    tools: Vec<String>,
}

/// Generates drafts for one level of the plan tree
pub struct LevelPlanner {
    level: TaskLevel,
    llm: Arc<dyn LlmClient>,
    /// Tool names offered to the operational planner
    tool_names: Vec<String>,
    max_goal_chars: usize,
    max_response_chars: usize,
}

impl LevelPlanner {
    pub fn new(level: TaskLevel, llm: Arc<dyn LlmClient>, config: &PlanningConfig) -> Self {
        Self {
            level,
            llm,
            tool_names: Vec::new(),
            max_goal_chars: config.max_goal_chars,
            max_response_chars: config.max_response_chars,
        }
    }

    pub fn strategic(llm: Arc<dyn LlmClient>, config: &PlanningConfig) -> Self {
        Self::new(TaskLevel::Strategic, llm, config)
    }

    pub fn tactical(llm: Arc<dyn LlmClient>, config: &PlanningConfig) -> Self {
        Self::new(TaskLevel::Tactical, llm, config)
    }

    pub fn operational(
        llm: Arc<dyn LlmClient>,
        config: &PlanningConfig,
        tool_names: Vec<String>,
    ) -> Self {
        Self {
            tool_names,
            ..Self::new(TaskLevel::Operational, llm, config)
        }
    }

    /// Produce exactly `count` drafts for `subject`, or one placeholder on failure
    pub async fn plan(&self, subject: &str, count: usize, context: &PlanContext) -> Vec<TaskDraft> {
        let count = count.max(1);
        let prompt = self.build_prompt(subject, count, context);

        match self.request_drafts(&prompt).await {
            Ok(drafts) => {
                if drafts.len() != count {
                    tracing::warn!(
                        "{} planner returned {} items for {} requested",
                        self.level,
                        drafts.len(),
                        count
                    );
                }
                fit_to_count(drafts, count, self.level, subject)
            }
            Err(e) => {
                tracing::warn!("{} planner fell back to a placeholder: {}", self.level, e);
                vec![manual_placeholder(self.level, subject)]
            }
        }
    }

    /// Ask for one alternative to a failed operational step
    pub async fn plan_replacement(
        &self,
        failed: &TaskNode,
        error: &str,
        context: &PlanContext,
    ) -> TaskDraft {
        let subject = format!(
            "{}\n\nThe previous step \"{}\" ({}) failed with: {}\nPropose a different way to achieve the same result.",
            failed.objective.as_deref().unwrap_or(&failed.title),
            failed.title,
            failed.description,
            error
        );
        let prompt = self.build_prompt(&subject, 1, context);

        match self.request_drafts(&prompt).await {
            Ok(drafts) => drafts
                .into_iter()
                .next()
                .unwrap_or_else(|| retry_draft(failed, error)),
            Err(e) => {
                tracing::warn!("Replacement planning failed, retrying as-is: {}", e);
                retry_draft(failed, error)
            }
        }
    }

    fn build_prompt(&self, subject: &str, count: usize, context: &PlanContext) -> String {
        let subject = truncate_chars(subject, self.max_goal_chars);
        let noun = match self.level {
            TaskLevel::Strategic => "phases",
            TaskLevel::Tactical => "sub-goals",
            TaskLevel::Operational => "steps",
        };

        let mut prompt = format!("Create exactly {} {} for:\n\n{}", count, noun, subject);
        if !context.is_empty() {
            prompt.push_str("\n\nContext:\n");
            for (key, value) in context {
                prompt.push_str(&format!("- {}: {}\n", key, truncate_chars(value, 200)));
            }
        }
        if self.level == TaskLevel::Operational && !self.tool_names.is_empty() {
            prompt.push_str(&format!("\n\nAvailable tools: {}", self.tool_names.join(", ")));
        }
        prompt
    }

    async fn request_drafts(&self, prompt: &str) -> Result<Vec<TaskDraft>> {
        let system_prompt = match self.level {
            TaskLevel::Strategic => STRATEGIC_PROMPT,
            TaskLevel::Tactical => TACTICAL_PROMPT,
            TaskLevel::Operational => OPERATIONAL_PROMPT,
        };
        let response = self.llm.complete(prompt, Some(system_prompt)).await?;
        let chars = response.chars().count();
        if chars > self.max_response_chars {
            anyhow::bail!(
                "response of {} chars exceeds the {} char budget",
                chars,
                self.max_response_chars
            );
        }
        let drafts = parse_drafts(&response)?;
        Ok(drafts
            .into_iter()
            .map(|d| TaskDraft {
                suggested_tools: if self.level == TaskLevel::Operational {
                    d.suggested_tools
                } else {
                    Vec::new()
                },
                ..d
            })
            .collect())
    }
}

/// Parse and validate a `{"tasks": [...]}` reply
fn parse_drafts(text: &str) -> Result<Vec<TaskDraft>> {
    let json_str = extract_json_object(text)
        .ok_or_else(|| anyhow::anyhow!("no JSON object in response"))?;
    let parsed: DraftListResponse = serde_json::from_str(json_str).map_err(|e| {
        anyhow::anyhow!(
            "Failed to parse task JSON: {}. Response was: {}",
            e,
            truncate_chars(text, 200)
        )
    })?;

    parsed
        .tasks
        .into_iter()
        .map(|t| {
            if t.title.trim().is_empty() {
                anyhow::bail!("task with empty title");
            }
            Ok(TaskDraft {
                title: t.title.trim().to_string(),
                description: t.description.trim().to_string(),
                suggested_tools: t.tools,
                placeholder: false,
                manual: false,
            })
        })
        .collect()
}

/// Locate the outermost JSON object, tolerating markdown fences and prose around it
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let text = text.trim();
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Pad with review steps or truncate so exactly `count` drafts remain
pub fn fit_to_count(
    mut drafts: Vec<TaskDraft>,
    count: usize,
    level: TaskLevel,
    subject: &str,
) -> Vec<TaskDraft> {
    drafts.truncate(count);
    while drafts.len() < count {
        drafts.push(review_placeholder(level, subject));
    }
    drafts
}

fn review_placeholder(level: TaskLevel, subject: &str) -> TaskDraft {
    let (title, description) = match level {
        TaskLevel::Strategic => (
            "Review and verify results".to_string(),
            format!("Check that the goal has been met: {}", short(subject)),
        ),
        TaskLevel::Tactical => (
            "Verify phase outcome".to_string(),
            format!("Confirm the phase is complete: {}", short(subject)),
        ),
        TaskLevel::Operational => (
            "Review and verify".to_string(),
            format!("Review and verify the result of: {}", short(subject)),
        ),
    };
    TaskDraft {
        placeholder: true,
        ..TaskDraft::new(title, description)
    }
}

fn manual_placeholder(level: TaskLevel, subject: &str) -> TaskDraft {
    TaskDraft {
        placeholder: true,
        manual: true,
        ..TaskDraft::new(
            short(subject),
            format!(
                "Automatic {} planning was unavailable; manual intervention may be needed to complete: {}",
                level,
                short(subject)
            ),
        )
    }
}

fn retry_draft(failed: &TaskNode, error: &str) -> TaskDraft {
    TaskDraft {
        placeholder: true,
        suggested_tools: failed.tools.clone(),
        ..TaskDraft::new(
            format!("Retry: {}", failed.title),
            format!("Retry after failure ({}): {}", error, failed.description),
        )
    }
}

fn short(subject: &str) -> String {
    let first_line = subject.lines().next().unwrap_or_default();
    truncate_chars(first_line, 80)
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
