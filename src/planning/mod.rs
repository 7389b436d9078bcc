//! Hierarchical task planning
//!
//! Decomposes a natural-language goal into a strategic → tactical →
//! operational task tree sized by a complexity assessment, binds a tool to
//! every operational step, and keeps status and progress consistent while
//! the plan executes.

pub mod complexity;
pub mod error;
pub mod executor;
pub mod manager;
pub mod planner;
pub mod types;

pub use complexity::{fallback_assessment, ComplexityAssessor};
pub use error::{PlanError, PlanResult};
pub use executor::{AdaptiveExecutor, ExecutionSummary};
pub use manager::HierarchicalPlanManager;
pub use planner::LevelPlanner;
pub use types::{
    AssessmentMethod, ComplexityAssessment, ComplexityLevel, PlanContext, PlanEvent, TaskDraft,
    TaskLevel, TaskNode, TaskPlan, TaskStatus,
};
