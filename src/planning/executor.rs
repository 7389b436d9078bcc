//! Adaptive plan executor
//!
//! Runs operational leaves one at a time through a `ToolExecutor`. A failed
//! leaf is handed back to the plan manager for a replacement; when the
//! parent's attempt budget is spent its remaining steps are cancelled.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::tools::{ToolExecutor, GENERIC_EXECUTOR};

use super::manager::HierarchicalPlanManager;
use super::types::{PlanContext, PlanEvent, TaskPlan, TaskStatus};

/// Leaf outcome counts after a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub completed: usize,
    /// Failed leaves that were not replaced
    pub failed: usize,
    pub cancelled: usize,
    pub replans: usize,
}

impl ExecutionSummary {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

pub struct AdaptiveExecutor {
    manager: Arc<HierarchicalPlanManager>,
    tools: Arc<dyn ToolExecutor>,
    event_tx: Option<mpsc::UnboundedSender<PlanEvent>>,
    context: PlanContext,
}

impl AdaptiveExecutor {
    pub fn new(manager: Arc<HierarchicalPlanManager>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            manager,
            tools,
            event_tx: None,
            context: PlanContext::new(),
        }
    }

    /// Push progress events to `event_tx` while executing
    pub fn with_events(mut self, event_tx: mpsc::UnboundedSender<PlanEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Context forwarded to the planner when replacing failed steps
    pub fn with_context(mut self, context: PlanContext) -> Self {
        self.context = context;
        self
    }

    /// Execute every pending leaf in tree order until none remain
    pub async fn execute(&self, plan: &mut TaskPlan) -> Result<ExecutionSummary> {
        let mut replans = 0;

        while let Some(task_id) = next_pending_leaf(plan) {
            let Some(task) = plan.task(&task_id).cloned() else {
                break;
            };
            let tool = task
                .tools
                .first()
                .cloned()
                .unwrap_or_else(|| GENERIC_EXECUTOR.to_string());

            self.manager
                .update_task_status(plan, &task_id, TaskStatus::Running, None)?;
            self.emit(PlanEvent::TaskStarted {
                plan_id: plan.id.clone(),
                task_id: task_id.clone(),
                title: task.title.clone(),
                tool: tool.clone(),
            });

            match self.tools.execute(&tool, &task).await {
                Ok(output) => {
                    self.manager
                        .update_task_status(plan, &task_id, TaskStatus::Completed, None)?;
                    self.emit(PlanEvent::TaskCompleted {
                        plan_id: plan.id.clone(),
                        task_id: task_id.clone(),
                        success: true,
                        output: Some(output),
                        error: None,
                    });
                }
                Err(e) => {
                    let error = e.to_string();
                    tracing::warn!("Task '{}' failed with {}: {}", task.title, tool, error);
                    self.manager.update_task_status(
                        plan,
                        &task_id,
                        TaskStatus::Failed,
                        Some(error.clone()),
                    )?;
                    self.emit(PlanEvent::TaskCompleted {
                        plan_id: plan.id.clone(),
                        task_id: task_id.clone(),
                        success: false,
                        output: None,
                        error: Some(error),
                    });

                    match self
                        .manager
                        .replan_failed_task(plan, &task_id, &self.context)
                        .await?
                    {
                        Some(replacement_id) => {
                            replans += 1;
                            self.emit(PlanEvent::TaskReplanned {
                                plan_id: plan.id.clone(),
                                failed_task_id: task_id.clone(),
                                replacement_id,
                            });
                        }
                        None => {
                            if let Some(parent_id) = &task.parent_id {
                                self.cancel_pending_siblings(plan, parent_id)?;
                            }
                        }
                    }
                }
            }
        }

        let summary = summarize(plan, replans);
        let success = summary.success() && plan.status() == TaskStatus::Completed;
        tracing::info!(
            "Plan {} finished: {} completed, {} failed, {} cancelled, {} replans",
            plan.id,
            summary.completed,
            summary.failed,
            summary.cancelled,
            summary.replans
        );
        self.emit(PlanEvent::PlanCompleted {
            plan_id: plan.id.clone(),
            success,
            summary: plan.summary(),
        });

        Ok(summary)
    }

    fn cancel_pending_siblings(&self, plan: &mut TaskPlan, parent_id: &str) -> Result<()> {
        let pending: Vec<String> = plan
            .children_of(parent_id)
            .iter()
            .filter(|t| t.is_active() && t.status == TaskStatus::Pending)
            .map(|t| t.id.clone())
            .collect();
        for id in pending {
            self.manager
                .update_task_status(plan, &id, TaskStatus::Cancelled, None)?;
        }
        Ok(())
    }

    fn emit(&self, event: PlanEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

fn next_pending_leaf(plan: &TaskPlan) -> Option<String> {
    plan.operational_tasks()
        .into_iter()
        .find(|t| t.is_active() && t.status == TaskStatus::Pending)
        .map(|t| t.id.clone())
}

fn summarize(plan: &TaskPlan, replans: usize) -> ExecutionSummary {
    let mut summary = ExecutionSummary {
        replans,
        ..Default::default()
    };
    for leaf in plan.operational_tasks().into_iter().filter(|t| t.is_active()) {
        match leaf.status {
            TaskStatus::Completed => summary.completed += 1,
            TaskStatus::Failed => summary.failed += 1,
            TaskStatus::Cancelled => summary.cancelled += 1,
            _ => {}
        }
    }
    summary
}
