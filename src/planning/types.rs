//! Core types for hierarchical planning

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

/// Free-form key/value context handed to every planner prompt
pub type PlanContext = BTreeMap<String, String>;

/// Depth of a node in the plan tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskLevel {
    Strategic,
    Tactical,
    Operational,
}

impl TaskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskLevel::Strategic => "strategic",
            TaskLevel::Tactical => "tactical",
            TaskLevel::Operational => "operational",
        }
    }

    /// The level directly beneath this one, if any
    pub fn child(&self) -> Option<TaskLevel> {
        match self {
            TaskLevel::Strategic => Some(TaskLevel::Tactical),
            TaskLevel::Tactical => Some(TaskLevel::Operational),
            TaskLevel::Operational => None,
        }
    }
}

impl fmt::Display for TaskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution status of a task node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "◯",
            TaskStatus::Running => "◐",
            TaskStatus::Paused => "‖",
            TaskStatus::Completed => "✓",
            TaskStatus::Failed => "✗",
            TaskStatus::Cancelled => "−",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether a directly requested transition to `next` is allowed
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Cancelled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single node in the plan tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    /// Unique across the whole plan
    pub id: String,
    pub title: String,
    pub description: String,
    pub level: TaskLevel,
    pub status: TaskStatus,
    /// In `[0.0, 1.0]`; for non-leaves, the mean of the active children
    pub progress: f64,
    pub parent_id: Option<String>,
    /// Ordered child ids (execution/display order)
    pub children: Vec<String>,
    /// Assigned tools, primary choice first (operational only)
    pub tools: Vec<String>,
    /// Plugins backing the assigned tools (operational only)
    pub plugins: Vec<String>,
    /// Sub-goal an operational step was derived from
    pub objective: Option<String>,
    /// Set when a failed node was replaced by a re-plan
    pub superseded_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl TaskNode {
    pub fn new(level: TaskLevel, title: String, description: String) -> Self {
        Self {
            id: format!("{}-{}", level.as_str(), Uuid::new_v4()),
            title,
            description,
            level,
            status: TaskStatus::Pending,
            progress: 0.0,
            parent_id: None,
            children: Vec::new(),
            tools: Vec::new(),
            plugins: Vec::new(),
            objective: None,
            superseded_by: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    pub fn with_parent(mut self, parent_id: String) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_objective(mut self, objective: Option<String>) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>, plugins: Vec<String>) -> Self {
        self.tools = tools;
        self.plugins = plugins;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.level == TaskLevel::Operational
    }

    /// False once a re-plan has replaced this node
    pub fn is_active(&self) -> bool {
        self.superseded_by.is_none()
    }
}

/// Coarse size rating for a goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    Medium,
    Complex,
}

impl ComplexityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityLevel::Simple => "simple",
            ComplexityLevel::Medium => "medium",
            ComplexityLevel::Complex => "complex",
        }
    }

    /// Closed range of `total_processes` allowed at this level
    pub fn band(&self) -> (usize, usize) {
        match self {
            ComplexityLevel::Simple => (1, 5),
            ComplexityLevel::Medium => (6, 15),
            ComplexityLevel::Complex => (16, 30),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "simple" => Some(ComplexityLevel::Simple),
            "medium" | "moderate" => Some(ComplexityLevel::Medium),
            "complex" => Some(ComplexityLevel::Complex),
            _ => None,
        }
    }
}

impl fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentMethod {
    LlmBased,
    Fallback,
}

/// The sizing decision that bounds a plan tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityAssessment {
    pub level: ComplexityLevel,
    pub phases: usize,
    pub tasks_per_phase: usize,
    pub actions_per_task: usize,
    pub total_processes: usize,
    pub reasoning: String,
    pub method: AssessmentMethod,
}

/// Planner output before it becomes a `TaskNode`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    /// Tool names proposed by the LLM (operational level only)
    #[serde(default)]
    pub suggested_tools: Vec<String>,
    /// True when synthesized locally instead of produced by the LLM
    #[serde(default)]
    pub placeholder: bool,
    /// Stand-in for a planning stage that failed outright; bound to the generic executor
    #[serde(default)]
    pub manual: bool,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            suggested_tools: Vec::new(),
            placeholder: false,
            manual: false,
        }
    }
}

/// A goal decomposed into a strategic → tactical → operational tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    pub id: String,
    /// Original natural-language request
    pub goal: String,
    pub root_task_id: String,
    tasks: HashMap<String, TaskNode>,
    pub complexity_assessment: ComplexityAssessment,
    pub created_at: DateTime<Utc>,
}

impl TaskPlan {
    pub(crate) fn new(goal: String, root: TaskNode, assessment: ComplexityAssessment) -> Self {
        let root_task_id = root.id.clone();
        let mut tasks = HashMap::new();
        tasks.insert(root_task_id.clone(), root);
        Self {
            id: format!("plan-{}", &Uuid::new_v4().to_string()[..8]),
            goal,
            root_task_id,
            tasks,
            complexity_assessment: assessment,
            created_at: Utc::now(),
        }
    }

    pub fn task(&self, id: &str) -> Option<&TaskNode> {
        self.tasks.get(id)
    }

    /// Read-only view of the flat id → node map
    pub fn tasks(&self) -> &HashMap<String, TaskNode> {
        &self.tasks
    }

    pub fn root(&self) -> Option<&TaskNode> {
        self.tasks.get(&self.root_task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Every node in pre-order from the root; stable for an unchanged plan
    pub fn get_all_tasks(&self) -> Vec<&TaskNode> {
        let mut ordered = Vec::with_capacity(self.tasks.len());
        let mut stack = vec![self.root_task_id.as_str()];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.tasks.get(id) {
                ordered.push(node);
                stack.extend(node.children.iter().rev().map(String::as_str));
            }
        }
        ordered
    }

    pub fn children_of(&self, id: &str) -> Vec<&TaskNode> {
        self.tasks
            .get(id)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|c| self.tasks.get(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Operational leaves in execution order
    pub fn operational_tasks(&self) -> Vec<&TaskNode> {
        self.get_all_tasks()
            .into_iter()
            .filter(|t| t.is_leaf())
            .collect()
    }

    /// Aggregate progress of the whole plan
    pub fn progress(&self) -> f64 {
        self.root().map(|r| r.progress).unwrap_or(0.0)
    }

    pub fn status(&self) -> TaskStatus {
        self.root().map(|r| r.status).unwrap_or_default()
    }

    pub fn summary(&self) -> String {
        let leaves: Vec<&TaskNode> = self
            .operational_tasks()
            .into_iter()
            .filter(|t| t.is_active())
            .collect();
        let completed = leaves
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let failed = leaves
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();

        if failed > 0 {
            format!(
                "{}: {}/{} steps completed, {} failed",
                self.goal,
                completed,
                leaves.len(),
                failed
            )
        } else {
            format!("{}: {}/{} steps completed", self.goal, completed, leaves.len())
        }
    }

    /// Indented text rendering with status icons
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        self.render_node(&self.root_task_id, 0, &mut out);
        out
    }

    fn render_node(&self, id: &str, depth: usize, out: &mut String) {
        let Some(node) = self.tasks.get(id) else {
            return;
        };
        let indent = "  ".repeat(depth);
        out.push_str(&format!(
            "{}{} {} ({:.0}%)",
            indent,
            node.status.icon(),
            node.title,
            node.progress * 100.0
        ));
        if !node.tools.is_empty() {
            out.push_str(&format!(" [{}]", node.tools.join(", ")));
        }
        if !node.is_active() {
            out.push_str(" (replaced)");
        }
        out.push('\n');
        for child in &node.children {
            self.render_node(child, depth + 1, out);
        }
    }

    pub(crate) fn task_mut(&mut self, id: &str) -> Option<&mut TaskNode> {
        self.tasks.get_mut(id)
    }

    /// Attach `node` under its `parent_id`, after `after` when given, else at the end
    pub(crate) fn attach(&mut self, node: TaskNode, after: Option<&str>) {
        let id = node.id.clone();
        if let Some(parent) = node.parent_id.clone().and_then(|p| self.tasks.get_mut(&p)) {
            let position = after
                .and_then(|a| parent.children.iter().position(|c| c == a))
                .map(|p| p + 1)
                .unwrap_or(parent.children.len());
            parent.children.insert(position, id.clone());
        }
        self.tasks.insert(id, node);
    }

    /// Recompute progress and derived status for every ancestor of `id`
    pub(crate) fn refresh_ancestors(&mut self, id: &str) {
        let mut current = self.tasks.get(id).and_then(|n| n.parent_id.clone());
        while let Some(parent_id) = current {
            self.refresh_aggregate(&parent_id);
            current = self.tasks.get(&parent_id).and_then(|n| n.parent_id.clone());
        }
    }

    fn refresh_aggregate(&mut self, id: &str) {
        let Some(node) = self.tasks.get(id) else {
            return;
        };
        let active: Vec<&TaskNode> = node
            .children
            .iter()
            .filter_map(|c| self.tasks.get(c))
            .filter(|c| c.is_active())
            .collect();
        if active.is_empty() {
            return;
        }

        let progress = active.iter().map(|c| c.progress).sum::<f64>() / active.len() as f64;
        let status = derive_status(&active);
        let error_message = if status == TaskStatus::Failed {
            active
                .iter()
                .find(|c| c.status == TaskStatus::Failed)
                .map(|c| {
                    format!(
                        "{} failed: {}",
                        c.title,
                        c.error_message.as_deref().unwrap_or("unknown error")
                    )
                })
        } else {
            None
        };

        if let Some(node) = self.tasks.get_mut(id) {
            node.progress = progress;
            node.status = status;
            node.error_message = error_message;
            let now = Utc::now();
            if status != TaskStatus::Pending && node.started_at.is_none() {
                node.started_at = Some(now);
            }
            if status == TaskStatus::Completed {
                node.completed_at.get_or_insert(now);
            } else {
                node.completed_at = None;
            }
        }
    }
}

/// Parent status implied by its active children
fn derive_status(children: &[&TaskNode]) -> TaskStatus {
    let all = |s: TaskStatus| children.iter().all(|c| c.status == s);
    let any = |s: TaskStatus| children.iter().any(|c| c.status == s);

    if all(TaskStatus::Completed) {
        TaskStatus::Completed
    } else if any(TaskStatus::Failed) {
        TaskStatus::Failed
    } else if children.iter().all(|c| c.status.is_terminal()) {
        TaskStatus::Cancelled
    } else if any(TaskStatus::Running) {
        TaskStatus::Running
    } else if any(TaskStatus::Paused) {
        TaskStatus::Paused
    } else if children.iter().any(|c| c.status != TaskStatus::Pending) {
        TaskStatus::Running
    } else {
        TaskStatus::Pending
    }
}

/// Events emitted during plan execution for UI updates
#[derive(Debug, Clone)]
pub enum PlanEvent {
    TaskStarted {
        plan_id: String,
        task_id: String,
        title: String,
        tool: String,
    },
    TaskCompleted {
        plan_id: String,
        task_id: String,
        success: bool,
        output: Option<String>,
        error: Option<String>,
    },
    TaskReplanned {
        plan_id: String,
        failed_task_id: String,
        replacement_id: String,
    },
    PlanCompleted {
        plan_id: String,
        success: bool,
        summary: String,
    },
}
