use chrono::Utc;
use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use tracing::info;

use devflow_core::error::Result;
use devflow_core::state::{status, WorkflowState};
use devflow_core::traits::Step;
use devflow_core::types::StepContext;

use super::{ids, or_missing, prompts, StepEnv};
use crate::artifacts::{ArtifactDir, ArtifactWriter};

/// Plans the deployment and marks the application deployed.
pub struct DeployApplication {
    env: StepEnv,
}

impl DeployApplication {
    pub fn new(env: StepEnv) -> Self {
        Self { env }
    }
}

impl Step for DeployApplication {
    fn id(&self) -> &str {
        ids::DEPLOY_APPLICATION
    }

    fn description(&self) -> &str {
        "Plan and simulate the deployment"
    }

    fn run(&self, mut state: WorkflowState, ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let prompt = prompts::deployment(
                or_missing(state.project_name.as_deref()),
                or_missing(state.code.as_deref()),
            );
            let plan = self.env.ask(&ctx, prompt).await?;
            self.env.writer().write("deployment_plan.md", &plan).await?;
            let files = self.env.writer().materialize(ArtifactDir::Deployment, &plan).await;
            info!(files = files.len(), status = status::READY_FOR_DEPLOYMENT, "Deployment plan written");
            state.deployment_plan = Some(plan);

            info!("Simulating deployment");
            state.deployment_status = Some(status::DEPLOYED.to_string());
            Ok(state)
        })
    }
}

const FEEDBACK_SAMPLES: [&str; 6] = [
    "The application is responsive and easy to use.",
    "The login flow was confusing.",
    "Useful features, but the interface could be more intuitive.",
    "Search does not return the results I expect.",
    "The new dashboard looks great.",
    "Uploading a large file crashed the app.",
];

/// Simulated production metrics and user feedback.
pub fn simulate_monitoring_data() -> Value {
    let mut rng = rand::thread_rng();
    let feedback: Vec<&str> = FEEDBACK_SAMPLES
        .choose_multiple(&mut rng, 3)
        .copied()
        .collect();
    json!({
        "timestamp": Utc::now().timestamp_millis() as f64 / 1000.0,
        "metrics": {
            "response_time_ms": rng.gen_range(50..=500),
            "error_rate": rng.gen_range(0.0..0.05),
            "cpu_usage": rng.gen_range(10.0..90.0),
            "memory_usage": rng.gen_range(20.0..80.0),
            "active_users": rng.gen_range(10..=1000),
            "requests_per_minute": rng.gen_range(10..=1000),
        },
        "user_feedback": feedback,
    })
}

pub struct MonitorApplication {
    env: StepEnv,
}

impl MonitorApplication {
    pub fn new(env: StepEnv) -> Self {
        Self { env }
    }
}

impl Step for MonitorApplication {
    fn id(&self) -> &str {
        ids::MONITOR_APPLICATION
    }

    fn description(&self) -> &str {
        "Plan monitoring and collect simulated feedback"
    }

    fn run(&self, mut state: WorkflowState, ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let prompt = prompts::monitoring(
                or_missing(state.project_name.as_deref()),
                or_missing(state.deployment_status.as_deref()),
            );
            let plan = self.env.ask(&ctx, prompt).await?;
            self.env.writer().write("monitoring_plan.md", &plan).await?;
            state.monitoring_plan = Some(plan);

            let data = simulate_monitoring_data();
            self.env.writer().write_json("monitoring_data.json", &data).await?;
            info!(metrics = %data["metrics"], "Monitoring data collected");
            state.monitoring_data = Some(data);
            Ok(state)
        })
    }
}

/// Plans maintenance from the monitoring data and closes the project with
/// a summary of every artifact.
pub struct MaintainApplication {
    env: StepEnv,
}

impl MaintainApplication {
    pub fn new(env: StepEnv) -> Self {
        Self { env }
    }
}

impl Step for MaintainApplication {
    fn id(&self) -> &str {
        ids::MAINTAIN_APPLICATION
    }

    fn description(&self) -> &str {
        "Plan maintenance and summarize the project"
    }

    fn run(&self, mut state: WorkflowState, ctx: StepContext) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let monitoring = state
                .monitoring_data
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_else(|| super::MISSING.to_string());
            let prompt = prompts::maintenance(
                or_missing(state.project_name.as_deref()),
                or_missing(state.user_stories.as_deref()),
                or_missing(state.code.as_deref()),
                &monitoring,
            );
            let plan = self.env.ask(&ctx, prompt).await?;
            self.env.writer().write("maintenance_plan.md", &plan).await?;
            state.maintenance_plan = Some(plan);

            let summary = project_summary(&state, self.env.writer());
            self.env.writer().write("project_summary.md", &summary).await?;
            info!(output = %self.env.writer().root().display(), "Project artifacts complete");
            Ok(state)
        })
    }
}

/// Markdown overview of the run's artifacts.
pub fn project_summary(state: &WorkflowState, writer: &ArtifactWriter) -> String {
    let name = state.project_name.as_deref().unwrap_or("Untitled project");
    let out = writer.root().display();
    let deployment = state.deployment_status.as_deref().unwrap_or("Unknown");
    format!(
        "# {name} - Project Summary

## Artifacts

### Requirements
- File: {out}/requirements.json

### User stories
- File: {out}/user_stories.md

### Design
- File: {out}/design_documents.md

### Code
- Directory: {out}/code/

### Tests
- Directory: {out}/tests/

### Deployment
- File: {out}/deployment_plan.md
- Status: {deployment}

### Monitoring
- File: {out}/monitoring_plan.md

### Maintenance
- File: {out}/maintenance_plan.md

## Next steps
1. Review the maintenance plan
2. Implement the recommended updates
3. Keep monitoring performance and gathering user feedback
4. Plan the next iteration
"
    )
}
