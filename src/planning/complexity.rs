//! Complexity assessment for goals
//!
//! Decides how large a plan tree may grow. The LLM is asked for a rating and
//! counts; any failure falls back to a deterministic keyword heuristic. Either
//! way the counts are clamped so `total_processes` stays inside the band of
//! the resolved level.

use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::PlanningConfig;
use crate::llm::LlmClient;

use super::planner::{extract_json_object, truncate_chars};
use super::types::{AssessmentMethod, ComplexityAssessment, ComplexityLevel};

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[a-z0-9']+").unwrap();
}

/// Per-dimension cap for phases, tasks per phase and actions per task
const MAX_PER_DIMENSION: usize = 5;

const ASSESSMENT_PROMPT: &str = r#"You are a COMPLEXITY assessor for a desktop assistant that plans work as phases -> tasks -> actions.

Classify the goal and size the plan:
- simple: 1-5 actions in total (one phase, one task)
- medium: 6-15 actions in total
- complex: 16-30 actions in total

phases * tasks_per_phase * actions_per_task must fall inside the range for the level.

## Output Format:
Respond with ONLY a JSON object (no markdown, no explanation):
{"level": "simple|medium|complex", "phases": 1, "tasks_per_phase": 1, "actions_per_task": 3, "reasoning": "one sentence"}"#;

const ACTION_VERBS: &[&str] = &[
    "find", "search", "open", "send", "reply", "forward", "summarize", "download", "upload",
    "create", "write", "draft", "analyze", "compare", "schedule", "book", "capture",
    "screenshot", "read", "extract", "organize", "sort", "delete", "archive", "review",
    "update", "fill", "submit", "login", "navigate", "translate", "save", "report",
    "research", "monitor", "collect", "list", "check", "categorize", "notify",
];

const SEQUENCE_MARKERS: &[&str] = &["then", "after", "afterwards", "finally", "next", "followed"];

const QUANTIFIERS: &[&str] = &["all", "every", "each"];

#[derive(Debug, Deserialize)]
struct AssessmentResponse {
    level: String,
    phases: usize,
    tasks_per_phase: usize,
    actions_per_task: usize,
    #[serde(default)]
    reasoning: String,
}

pub struct ComplexityAssessor {
    llm: Arc<dyn LlmClient>,
    use_llm: bool,
    max_goal_chars: usize,
    max_response_chars: usize,
}

impl ComplexityAssessor {
    pub fn new(llm: Arc<dyn LlmClient>, config: &PlanningConfig) -> Self {
        Self {
            llm,
            use_llm: config.use_llm_assessment,
            max_goal_chars: config.max_goal_chars,
            max_response_chars: config.max_response_chars,
        }
    }

    /// Rate a goal; never fails
    pub async fn assess(&self, goal: &str) -> ComplexityAssessment {
        if !self.use_llm {
            return fallback_assessment(goal);
        }

        match self.assess_with_llm(goal).await {
            Ok(assessment) => {
                tracing::info!(
                    "Assessed goal as {} ({} processes) via LLM",
                    assessment.level,
                    assessment.total_processes
                );
                assessment
            }
            Err(e) => {
                tracing::warn!("LLM complexity assessment failed, using heuristic: {}", e);
                let assessment = fallback_assessment(goal);
                tracing::info!(
                    "Assessed goal as {} ({} processes) via heuristic",
                    assessment.level,
                    assessment.total_processes
                );
                assessment
            }
        }
    }

    async fn assess_with_llm(&self, goal: &str) -> Result<ComplexityAssessment> {
        let prompt = format!("Goal:\n{}", truncate_chars(goal, self.max_goal_chars));
        let response = self.llm.complete(&prompt, Some(ASSESSMENT_PROMPT)).await?;
        if response.chars().count() > self.max_response_chars {
            anyhow::bail!("assessment response exceeds the {} char budget", self.max_response_chars);
        }
        parse_assessment(&response)
    }
}

/// Strictly parse an LLM assessment; any missing or invalid field is an error
pub fn parse_assessment(text: &str) -> Result<ComplexityAssessment> {
    let json_str =
        extract_json_object(text).ok_or_else(|| anyhow::anyhow!("no JSON object in response"))?;
    let parsed: AssessmentResponse = serde_json::from_str(json_str)
        .map_err(|e| anyhow::anyhow!("Failed to parse assessment JSON: {}", e))?;
    let level = ComplexityLevel::parse(&parsed.level)
        .ok_or_else(|| anyhow::anyhow!("unknown complexity level '{}'", parsed.level))?;

    Ok(ComplexityAssessment::clamped(
        level,
        parsed.phases,
        parsed.tasks_per_phase,
        parsed.actions_per_task,
        parsed.reasoning,
        AssessmentMethod::LlmBased,
    ))
}

impl ComplexityAssessment {
    /// Build an assessment whose counts are forced into the level's band
    pub fn clamped(
        level: ComplexityLevel,
        phases: usize,
        tasks_per_phase: usize,
        actions_per_task: usize,
        reasoning: String,
        method: AssessmentMethod,
    ) -> Self {
        let [phases, tasks_per_phase, actions_per_task] =
            fit_to_band(level, [phases, tasks_per_phase, actions_per_task]);
        Self {
            level,
            phases,
            tasks_per_phase,
            actions_per_task,
            total_processes: phases * tasks_per_phase * actions_per_task,
            reasoning,
            method,
        }
    }
}

/// Adjust `[phases, tasks, actions]` until their product lies in the band
fn fit_to_band(level: ComplexityLevel, dims: [usize; 3]) -> [usize; 3] {
    let mut dims = dims.map(|d| d.clamp(1, MAX_PER_DIMENSION));

    if level == ComplexityLevel::Simple {
        let (_, max) = level.band();
        return [1, 1, dims[2].min(max)];
    }

    let (min, max) = level.band();
    for _ in 0..64 {
        let product: usize = dims.iter().product();
        if product > max {
            // Shrink the widest dimension, leaves first
            let widest = *dims.iter().max().unwrap_or(&1);
            if let Some(i) = [2, 1, 0].into_iter().find(|&i| dims[i] == widest) {
                dims[i] -= 1;
            }
        } else if product < min {
            // Grow the narrowest dimension, phases first
            let narrowest = *dims.iter().min().unwrap_or(&1);
            if let Some(i) = [0, 1, 2].into_iter().find(|&i| dims[i] == narrowest) {
                dims[i] += 1;
            }
        } else {
            break;
        }
    }
    dims
}

/// Signals counted by the heuristic
#[derive(Debug, Default, PartialEq)]
struct GoalSignals {
    actions: usize,
    sequencing: usize,
    conjunctions: usize,
    quantifiers: usize,
    words: usize,
}

impl GoalSignals {
    fn from_goal(goal: &str) -> Self {
        let lower = goal.to_lowercase();
        let words: Vec<&str> = WORD.find_iter(&lower).map(|m| m.as_str()).collect();

        let actions: HashSet<&str> = words
            .iter()
            .filter_map(|w| {
                ACTION_VERBS
                    .iter()
                    .find(|v| *w == **v || w.strip_suffix('s') == Some(**v))
                    .copied()
            })
            .collect();

        Self {
            actions: actions.len(),
            sequencing: words.iter().filter(|w| SEQUENCE_MARKERS.contains(*w)).count(),
            conjunctions: words.iter().filter(|w| **w == "and").count(),
            quantifiers: words.iter().filter(|w| QUANTIFIERS.contains(*w)).count(),
            words: words.len(),
        }
    }

    fn score(&self) -> usize {
        self.actions + self.sequencing + self.conjunctions + self.quantifiers + self.words / 15
    }
}

/// Deterministic rule-based assessment used whenever the LLM path fails
pub fn fallback_assessment(goal: &str) -> ComplexityAssessment {
    let signals = GoalSignals::from_goal(goal);
    let score = signals.score();

    let (level, dims) = match score {
        0..=2 => (ComplexityLevel::Simple, [1, 1, signals.actions.max(1)]),
        3..=5 => (ComplexityLevel::Medium, [2 + usize::from(score >= 5), 2, 2]),
        _ => (ComplexityLevel::Complex, [3 + ((score - 6) / 3).min(2), 3, 2]),
    };

    let reasoning = format!(
        "heuristic score {}: {} distinct actions, {} sequencing markers, {} conjunctions, {} quantifiers, {} words",
        score,
        signals.actions,
        signals.sequencing,
        signals.conjunctions,
        signals.quantifiers,
        signals.words
    );

    ComplexityAssessment::clamped(
        level,
        dims[0],
        dims[1],
        dims[2],
        reasoning,
        AssessmentMethod::Fallback,
    )
}
