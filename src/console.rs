use std::io;

use futures::future::BoxFuture;

use devflow_agent::gate::{DecisionSource, ReviewRequest};
use devflow_core::error::{DevflowError, Result};
use devflow_core::types::{ReviewDecision, WorkflowEvent};

const PREVIEW_CHARS: usize = 1500;

/// Asks for review decisions on the terminal.
pub struct ConsoleDecisionSource;

impl DecisionSource for ConsoleDecisionSource {
    fn decide(&self, request: ReviewRequest) -> BoxFuture<'_, Result<ReviewDecision>> {
        Box::pin(async move {
            eprintln!("\n[REVIEW] {} ({})", request.step, request.artifact_field);
            eprintln!("{}", truncate(&request.artifact, PREVIEW_CHARS));
            if let Some(feedback) = &request.feedback {
                eprintln!("\n[automated review]\n{}", truncate(feedback, PREVIEW_CHARS));
            }

            let choice = tokio::task::spawn_blocking(|| {
                dialoguer::Select::new()
                    .with_prompt("Decision")
                    .items(&["Approved", "Needs Revision"])
                    .default(0)
                    .interact()
            })
            .await
            .map_err(|e| DevflowError::Io(io::Error::other(e)))?
            .map_err(|e| DevflowError::Io(io::Error::other(e)))?;

            Ok(match choice {
                0 => ReviewDecision::Approved,
                _ => ReviewDecision::NeedsRevision,
            })
        })
    }
}

/// Prompt for the project name and requirements when they were not given.
pub fn ask_project(default_name: &str) -> anyhow::Result<(String, String)> {
    let name: String = dialoguer::Input::new()
        .with_prompt("Project name")
        .default(default_name.to_string())
        .interact_text()?;
    let requirements: String = dialoguer::Input::new()
        .with_prompt("Describe what the software should do")
        .interact_text()?;
    Ok((name, requirements))
}

pub fn print_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::RunStarted { run_id, entry } => {
            eprintln!("[run {}] starting at {}", run_id, entry);
        }
        WorkflowEvent::StepStarted { step, visit, .. } => {
            if *visit > 1 {
                eprintln!("[step: {} #{}]", step, visit);
            } else {
                eprintln!("[step: {}]", step);
            }
        }
        WorkflowEvent::StepCompleted { step, next, .. } => {
            eprintln!("[{}: ok] -> {}", step, next);
        }
        WorkflowEvent::StepFailed { step, error, .. } => {
            eprintln!("[{}: ERROR] {}", step, error);
        }
        WorkflowEvent::ReviewRequested { step, artifact_key } => {
            eprintln!(
                "\n[APPROVAL] {} is waiting for a decision on \"{}\"",
                step,
                truncate(artifact_key, 80)
            );
        }
        WorkflowEvent::ReviewResolved { decision, .. } => {
            eprintln!("[APPROVAL] {}", decision);
        }
        WorkflowEvent::RevisionSubmitted { .. } => {
            eprintln!("[APPROVAL] revised artifact received");
        }
        WorkflowEvent::RunCompleted { steps, .. } => {
            eprintln!("\n[done: {} steps]", steps);
        }
        WorkflowEvent::RunCancelled { run_id } => {
            eprintln!("\n[cancelled: {}]", run_id);
        }
    }
}

pub fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
