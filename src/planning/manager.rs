//! Hierarchical plan manager
//!
//! Runs the goal → assessment → strategic → tactical → operational → tool
//! pipeline and owns every write to a plan's task map. Status and progress
//! changes are propagated to all ancestors before the call returns.

use std::sync::Arc;

use chrono::Utc;

use crate::config::PlanningConfig;
use crate::llm::LlmClient;
use crate::tools::{ToolResolver, GENERIC_EXECUTOR};

use super::complexity::ComplexityAssessor;
use super::error::{PlanError, PlanResult};
use super::planner::{truncate_chars, LevelPlanner};
use super::types::{PlanContext, TaskDraft, TaskLevel, TaskNode, TaskPlan, TaskStatus};

pub struct HierarchicalPlanManager {
    assessor: ComplexityAssessor,
    strategic: LevelPlanner,
    tactical: LevelPlanner,
    operational: LevelPlanner,
    resolver: Arc<ToolResolver>,
    max_attempts_per_parent: usize,
}

impl HierarchicalPlanManager {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        resolver: Arc<ToolResolver>,
        config: &PlanningConfig,
    ) -> Self {
        let tool_names = resolver
            .registry()
            .names()
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            assessor: ComplexityAssessor::new(llm.clone(), config),
            strategic: LevelPlanner::strategic(llm.clone(), config),
            tactical: LevelPlanner::tactical(llm.clone(), config),
            operational: LevelPlanner::operational(llm, config, tool_names),
            resolver,
            max_attempts_per_parent: config.max_attempts_per_parent.max(1),
        }
    }

    /// Decompose a goal into a fully linked plan with every node pending.
    ///
    /// Planning failures degrade to placeholders, so this always yields at
    /// least a root, one tactical node and one operational leaf.
    pub async fn create_hierarchical_plan(&self, goal: &str, context: &PlanContext) -> TaskPlan {
        let assessment = self.assessor.assess(goal).await;

        let root_title = if goal.trim().is_empty() {
            "Untitled goal".to_string()
        } else {
            truncate_chars(goal.trim(), 80)
        };
        let root = TaskNode::new(TaskLevel::Strategic, root_title, goal.to_string());
        let root_id = root.id.clone();
        let mut plan = TaskPlan::new(goal.to_string(), root, assessment.clone());

        let phases = self.strategic.plan(goal, assessment.phases, context).await;
        for phase in phases {
            let phase_node = TaskNode::new(TaskLevel::Tactical, phase.title, phase.description)
                .with_parent(root_id.clone());
            let phase_id = phase_node.id.clone();
            let phase_subject = subject_for(&phase_node, goal);
            plan.attach(phase_node, None);

            let sub_goals = self
                .tactical
                .plan(&phase_subject, assessment.tasks_per_phase, context)
                .await;
            for sub_goal in sub_goals {
                let sub_subject = format!(
                    "{}: {}\n(part of phase \"{}\")",
                    sub_goal.title, sub_goal.description, phase_subject
                );
                let steps = self
                    .operational
                    .plan(&sub_subject, assessment.actions_per_task, context)
                    .await;
                for step in steps {
                    let node = self.build_operational_node(
                        step,
                        &phase_id,
                        Some(sub_goal.title.clone()),
                    );
                    plan.attach(node, None);
                }
            }
        }

        tracing::info!(
            "Created plan {} with {} tasks ({} operational) for goal '{}'",
            plan.id,
            plan.len(),
            plan.operational_tasks().len(),
            truncate_chars(goal, 60)
        );
        plan
    }

    /// Flat listing of every node, in tree order
    pub fn get_all_tasks<'a>(&self, plan: &'a TaskPlan) -> Vec<&'a TaskNode> {
        plan.get_all_tasks()
    }

    /// Apply a status transition and propagate it up the tree.
    ///
    /// Operational nodes follow the transition table in `TaskStatus`. A
    /// non-leaf only accepts `Cancelled`, which cascades to every unfinished
    /// descendant. A failed leaf makes its ancestors `Failed` right away; they
    /// only recover once `replan_failed_task` supersedes it. Cancelling a
    /// non-leaf is accepted as long as anything beneath it is unfinished, so a
    /// failed phase can still be cancelled.
    pub fn update_task_status(
        &self,
        plan: &mut TaskPlan,
        task_id: &str,
        new_status: TaskStatus,
        error_message: Option<String>,
    ) -> PlanResult<()> {
        let node = plan
            .task(task_id)
            .ok_or_else(|| PlanError::TaskNotFound(task_id.to_string()))?;
        let current = node.status;

        if !node.is_leaf() {
            if new_status != TaskStatus::Cancelled {
                return Err(PlanError::NotALeaf(task_id.to_string()));
            }
            let unfinished = unfinished_leaves(plan, task_id);
            if unfinished.is_empty() {
                return Err(PlanError::InvalidTransition {
                    task_id: task_id.to_string(),
                    from: current,
                    to: new_status,
                });
            }
            for leaf in &unfinished {
                apply_leaf_status(plan, leaf, TaskStatus::Cancelled, None);
                plan.refresh_ancestors(leaf);
            }
            tracing::debug!("Cancelled {} tasks under {}", unfinished.len(), task_id);
            return Ok(());
        }

        if !current.can_transition_to(new_status) {
            return Err(PlanError::InvalidTransition {
                task_id: task_id.to_string(),
                from: current,
                to: new_status,
            });
        }

        apply_leaf_status(plan, task_id, new_status, error_message);
        plan.refresh_ancestors(task_id);
        tracing::debug!("Task {} {} -> {}", task_id, current, new_status);
        Ok(())
    }

    /// Set the progress of an operational node and recompute its ancestors
    pub fn set_task_progress(
        &self,
        plan: &mut TaskPlan,
        task_id: &str,
        progress: f64,
    ) -> PlanResult<()> {
        let node = plan
            .task(task_id)
            .ok_or_else(|| PlanError::TaskNotFound(task_id.to_string()))?;
        if !node.is_leaf() {
            return Err(PlanError::NotALeaf(task_id.to_string()));
        }
        if node.status.is_terminal() {
            return Err(PlanError::TaskFinished {
                task_id: task_id.to_string(),
                status: node.status,
            });
        }
        if progress.is_nan() {
            return Err(PlanError::InvalidProgress {
                task_id: task_id.to_string(),
                value: progress,
            });
        }

        if let Some(node) = plan.task_mut(task_id) {
            node.progress = progress.clamp(0.0, 1.0);
        }
        plan.refresh_ancestors(task_id);
        Ok(())
    }

    /// Replace a failed operational node with a new attempt.
    ///
    /// Returns the replacement id, or `None` once the tactical parent has used
    /// its attempt budget; the parent then stays failed.
    pub async fn replan_failed_task(
        &self,
        plan: &mut TaskPlan,
        task_id: &str,
        context: &PlanContext,
    ) -> PlanResult<Option<String>> {
        let failed = plan
            .task(task_id)
            .ok_or_else(|| PlanError::TaskNotFound(task_id.to_string()))?
            .clone();
        if !failed.is_leaf() || failed.status != TaskStatus::Failed || !failed.is_active() {
            return Err(PlanError::NotReplannable(task_id.to_string()));
        }
        let parent_id = failed
            .parent_id
            .clone()
            .ok_or_else(|| PlanError::NotReplannable(task_id.to_string()))?;

        let failures = plan
            .children_of(&parent_id)
            .iter()
            .filter(|c| c.status == TaskStatus::Failed)
            .count();
        if failures >= self.max_attempts_per_parent {
            tracing::info!(
                "Attempt budget ({}) exhausted under {}, not replanning {}",
                self.max_attempts_per_parent,
                parent_id,
                task_id
            );
            return Ok(None);
        }

        let error = failed
            .error_message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        let draft = self
            .operational
            .plan_replacement(&failed, &error, context)
            .await;
        let replacement = self.build_operational_node(draft, &parent_id, failed.objective.clone());
        let replacement_id = replacement.id.clone();

        plan.attach(replacement, Some(task_id));
        if let Some(node) = plan.task_mut(task_id) {
            node.superseded_by = Some(replacement_id.clone());
        }
        plan.refresh_ancestors(&replacement_id);

        tracing::info!(
            "Replanned failed task {} as {} (attempt {} of {})",
            task_id,
            replacement_id,
            failures + 1,
            self.max_attempts_per_parent
        );
        Ok(Some(replacement_id))
    }

    fn build_operational_node(
        &self,
        draft: TaskDraft,
        parent_id: &str,
        objective: Option<String>,
    ) -> TaskNode {
        let description = if draft.description.is_empty() {
            draft.title.clone()
        } else {
            draft.description.clone()
        };
        let primary = if draft.manual {
            GENERIC_EXECUTOR.to_string()
        } else {
            self.resolver.resolve(&description)
        };

        let registry = self.resolver.registry();
        let mut tools = vec![primary];
        for suggested in &draft.suggested_tools {
            if registry.contains(suggested) && !tools.contains(suggested) {
                tools.push(suggested.clone());
            }
        }
        let mut plugins: Vec<String> = Vec::new();
        for tool in &tools {
            if let Some(plugin) = registry.get(tool).and_then(|t| t.plugin.clone()) {
                if !plugins.contains(&plugin) {
                    plugins.push(plugin);
                }
            }
        }

        TaskNode::new(TaskLevel::Operational, draft.title, description)
            .with_parent(parent_id.to_string())
            .with_objective(objective)
            .with_tools(tools, plugins)
    }
}

fn apply_leaf_status(
    plan: &mut TaskPlan,
    task_id: &str,
    status: TaskStatus,
    error_message: Option<String>,
) {
    let Some(node) = plan.task_mut(task_id) else {
        return;
    };
    let now = Utc::now();
    node.status = status;
    match status {
        TaskStatus::Running => {
            node.started_at.get_or_insert(now);
        }
        TaskStatus::Completed => {
            node.progress = 1.0;
            node.completed_at = Some(now);
        }
        TaskStatus::Failed => {
            node.error_message = Some(error_message.unwrap_or_else(|| "unknown error".to_string()));
        }
        _ => {}
    }
}

/// Active, non-terminal operational nodes beneath `id`
fn unfinished_leaves(plan: &TaskPlan, id: &str) -> Vec<String> {
    let mut leaves = Vec::new();
    let mut stack = vec![id.to_string()];
    while let Some(current) = stack.pop() {
        if let Some(node) = plan.task(&current) {
            if node.is_leaf() {
                if node.is_active() && !node.status.is_terminal() {
                    leaves.push(node.id.clone());
                }
            } else {
                stack.extend(node.children.iter().cloned());
            }
        }
    }
    leaves
}

/// Prompt subject for a node: its title and description plus the goal it serves
fn subject_for(node: &TaskNode, goal: &str) -> String {
    format!(
        "{}: {}\n(part of the goal \"{}\")",
        node.title,
        node.description,
        truncate_chars(goal, 200)
    )
}
