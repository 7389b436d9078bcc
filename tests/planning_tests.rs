use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use atlas::config::PlanningConfig;
use atlas::llm::{ContentBlock, LlmClient, LlmResponse, Message, Role};
use atlas::planning::{
    AdaptiveExecutor, AssessmentMethod, ComplexityLevel, HierarchicalPlanManager, PlanContext,
    TaskLevel, TaskPlan, TaskStatus,
};
use atlas::tools::{
    AccessMethod, AccessStrategy, DryRunExecutor, ToolRegistry, ToolResolver, GENERIC_EXECUTOR,
};

/// Replies by prompt kind, keyed on the system prompt
struct RoutedLlm {
    assessment: String,
    outline: String,
    steps: String,
}

impl RoutedLlm {
    fn new(assessment: &str, outline: &str, steps: &str) -> Self {
        Self {
            assessment: assessment.to_string(),
            outline: outline.to_string(),
            steps: steps.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for RoutedLlm {
    async fn send_message_with_system(
        &self,
        _messages: &[Message],
        system_prompt: Option<&str>,
    ) -> Result<LlmResponse> {
        let system = system_prompt.unwrap_or_default();
        let text = if system.contains("COMPLEXITY") {
            &self.assessment
        } else if system.contains("OPERATIONAL") {
            &self.steps
        } else {
            &self.outline
        };
        Ok(LlmResponse {
            message: Message {
                role: Role::Assistant,
                content: vec![ContentBlock::Text { text: text.clone() }],
            },
            usage: None,
        })
    }
}

struct FailingLlm;

#[async_trait]
impl LlmClient for FailingLlm {
    async fn send_message_with_system(
        &self,
        _messages: &[Message],
        _system_prompt: Option<&str>,
    ) -> Result<LlmResponse> {
        anyhow::bail!("connection refused")
    }
}

/// Records how often the resolver delegates to it
struct CountingStrategy {
    calls: AtomicUsize,
}

impl CountingStrategy {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

impl AccessStrategy for CountingStrategy {
    fn select_access_method(&self, _task_description: &str) -> Option<AccessMethod> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some(AccessMethod::GmailApi)
    }

    fn get_tool_for_method(&self, method: &AccessMethod) -> String {
        method.as_str().to_string()
    }
}

fn tasks_json(titles: &[(&str, &str)]) -> String {
    let items: Vec<String> = titles
        .iter()
        .map(|(title, description)| {
            format!(
                r#"{{"title": "{}", "description": "{}"}}"#,
                title, description
            )
        })
        .collect();
    format!(r#"{{"tasks": [{}]}}"#, items.join(", "))
}

fn numbered_steps(n: usize) -> String {
    let steps: Vec<(String, String)> = (0..n)
        .map(|i| (format!("Step {}", i), format!("Open the page number {}", i)))
        .collect();
    let refs: Vec<(&str, &str)> = steps
        .iter()
        .map(|(t, d)| (t.as_str(), d.as_str()))
        .collect();
    tasks_json(&refs)
}

fn manager_with(
    llm: Arc<dyn LlmClient>,
    strategy: Option<Arc<CountingStrategy>>,
) -> HierarchicalPlanManager {
    let mut resolver = ToolResolver::new(Arc::new(ToolRegistry::new()));
    if let Some(strategy) = strategy {
        resolver = resolver.with_email_strategy(strategy);
    }
    HierarchicalPlanManager::new(llm, Arc::new(resolver), &PlanningConfig::default())
}

fn assert_well_formed(plan: &TaskPlan) {
    let all = plan.get_all_tasks();
    assert_eq!(all.len(), plan.len(), "every node reachable from the root");
    assert_eq!(all.iter().filter(|t| t.parent_id.is_none()).count(), 1);

    for node in &all {
        for child_id in &node.children {
            let child = plan.task(child_id).expect("child exists");
            assert_eq!(child.parent_id.as_deref(), Some(node.id.as_str()));
            assert_eq!(Some(child.level), node.level.child());
        }
        match node.level {
            TaskLevel::Operational => {
                assert!(node.children.is_empty());
                assert!(!node.tools.is_empty());
            }
            _ => assert!(!node.children.is_empty()),
        }
        assert!((0.0..=1.0).contains(&node.progress));
    }
}

#[tokio::test]
async fn test_screenshot_goal_is_simple() {
    let strategy = CountingStrategy::new();
    let llm = RoutedLlm::new(
        "I would say this one is easy.",
        &tasks_json(&[("Capture", "Grab the current display")]),
        &tasks_json(&[("Capture", "capture the screen")]),
    );
    let manager = manager_with(Arc::new(llm), Some(strategy.clone()));
    let plan = manager
        .create_hierarchical_plan("Take a screenshot", &PlanContext::new())
        .await;

    let assessment = &plan.complexity_assessment;
    assert_eq!(assessment.level, ComplexityLevel::Simple);
    assert_eq!(assessment.method, AssessmentMethod::Fallback);
    assert!((1..=5).contains(&assessment.total_processes));

    assert_well_formed(&plan);
    assert_eq!(plan.children_of(&plan.root_task_id).len(), 1);
    let leaves = plan.operational_tasks();
    assert!((1..=5).contains(&leaves.len()));

    let capture = leaves
        .iter()
        .find(|t| t.description == "capture the screen")
        .expect("capture step");
    assert_eq!(capture.tools[0], "screenshot_tool");
    assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_gmail_goal_routes_through_email_strategy() {
    let strategy = CountingStrategy::new();
    let llm = RoutedLlm::new(
        r#"{"level": "medium", "phases": 2, "tasks_per_phase": 2, "actions_per_task": 2, "reasoning": "search then summarize"}"#,
        &tasks_json(&[
            ("Collect", "Collect the relevant messages"),
            ("Report", "Produce the digest"),
        ]),
        r#"{"tasks": [
            {"title": "Search", "description": "Search Gmail for security alerts", "tools": ["gmail_api"]},
            {"title": "Summarize", "description": "Summarize the security emails", "tools": ["text_summarizer"]}
        ]}"#,
    );
    let manager = manager_with(Arc::new(llm), Some(strategy.clone()));
    let plan = manager
        .create_hierarchical_plan(
            "Find all Gmail security emails and summarize them",
            &PlanContext::new(),
        )
        .await;

    let assessment = &plan.complexity_assessment;
    assert_eq!(assessment.level, ComplexityLevel::Medium);
    assert_eq!(assessment.method, AssessmentMethod::LlmBased);
    assert!((6..=15).contains(&assessment.total_processes));

    assert_well_formed(&plan);
    let leaves = plan.operational_tasks();
    assert_eq!(leaves.len(), assessment.total_processes);

    let search = leaves
        .iter()
        .find(|t| t.description.contains("Gmail"))
        .expect("gmail step");
    assert_eq!(search.tools[0], "gmail_api");
    assert_eq!(search.plugins, vec!["email"]);

    let summarize = leaves
        .iter()
        .find(|t| t.title == "Summarize")
        .expect("summary step");
    assert_eq!(summarize.tools, vec!["gmail_api", "text_summarizer"]);

    assert_eq!(strategy.calls.load(Ordering::SeqCst), leaves.len());
}

#[tokio::test]
async fn test_failing_llm_yields_minimal_plan() {
    let manager = manager_with(Arc::new(FailingLlm), None);
    let plan = manager
        .create_hierarchical_plan("Take a screenshot", &PlanContext::new())
        .await;

    assert_well_formed(&plan);
    assert_eq!(plan.len(), 3);
    let root = plan.root().unwrap();
    assert_eq!(root.level, TaskLevel::Strategic);
    let phase = plan.children_of(&root.id)[0];
    assert_eq!(phase.level, TaskLevel::Tactical);
    let leaf = plan.children_of(&phase.id)[0];
    assert_eq!(leaf.level, TaskLevel::Operational);
    assert_eq!(leaf.tools, vec![GENERIC_EXECUTOR]);
    assert_eq!(plan.status(), TaskStatus::Pending);
}

#[tokio::test]
async fn test_fallback_never_fails() {
    let manager = manager_with(Arc::new(FailingLlm), None);
    let long_goal = "Download every report and then email it to the team. ".repeat(200);
    let goals = [
        "",
        "   ",
        "Take a screenshot",
        "Search the web for flights, compare prices, then book the cheapest and add it to my calendar",
        long_goal.as_str(),
        "日本語のメールを要約して",
    ];

    for goal in goals {
        let plan = manager.create_hierarchical_plan(goal, &PlanContext::new()).await;
        assert_well_formed(&plan);
        assert!(plan.len() >= 3, "goal {:?} produced {} nodes", goal, plan.len());

        let a = &plan.complexity_assessment;
        let (low, high) = a.level.band();
        assert!((low..=high).contains(&a.total_processes));
        assert_eq!(
            a.total_processes,
            a.phases * a.tasks_per_phase * a.actions_per_task
        );
    }
}

#[tokio::test]
async fn test_short_step_list_is_padded() {
    let llm = RoutedLlm::new(
        r#"{"level": "simple", "phases": 1, "tasks_per_phase": 1, "actions_per_task": 4, "reasoning": "four steps"}"#,
        &tasks_json(&[("Browse", "Visit the site")]),
        &numbered_steps(3),
    );
    let manager = manager_with(Arc::new(llm), None);
    let plan = manager
        .create_hierarchical_plan("Check the status page", &PlanContext::new())
        .await;

    let titles: Vec<&str> = plan
        .operational_tasks()
        .iter()
        .map(|t| t.title.as_str())
        .collect();
    assert_eq!(titles, vec!["Step 0", "Step 1", "Step 2", "Review and verify"]);
}

#[tokio::test]
async fn test_long_step_list_is_truncated() {
    let llm = RoutedLlm::new(
        r#"{"level": "simple", "phases": 1, "tasks_per_phase": 1, "actions_per_task": 4, "reasoning": "four steps"}"#,
        &tasks_json(&[("Browse", "Visit the site")]),
        &numbered_steps(7),
    );
    let manager = manager_with(Arc::new(llm), None);
    let plan = manager
        .create_hierarchical_plan("Check the status page", &PlanContext::new())
        .await;

    let leaves = plan.operational_tasks();
    assert_eq!(leaves.len(), 4);
    assert_eq!(leaves[3].title, "Step 3");
    assert!(leaves
        .iter()
        .all(|t| t.tools[0] == "browser_automation"));
}

#[tokio::test]
async fn test_plan_executes_to_completion() {
    let llm = RoutedLlm::new(
        r#"{"level": "medium", "phases": 2, "tasks_per_phase": 1, "actions_per_task": 3, "reasoning": "two phases"}"#,
        &tasks_json(&[("First", "Do the first part"), ("Second", "Do the rest")]),
        &numbered_steps(3),
    );
    let manager = Arc::new(manager_with(Arc::new(llm), None));
    let mut plan = manager
        .create_hierarchical_plan("Check two status pages", &PlanContext::new())
        .await;

    let summary = AdaptiveExecutor::new(manager, Arc::new(DryRunExecutor))
        .execute(&mut plan)
        .await
        .unwrap();

    assert_eq!(summary.completed, 6);
    assert!(summary.success());
    assert_eq!(plan.status(), TaskStatus::Completed);
    assert!(plan
        .get_all_tasks()
        .iter()
        .all(|t| t.status == TaskStatus::Completed && t.completed_at.is_some()));
}
