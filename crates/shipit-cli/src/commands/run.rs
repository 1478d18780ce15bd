//! Full pipeline execution command.

use anyhow::{Context, Result};
use shipit_core::pipeline::Outcome;
use shipit_pipeline::{CancelSignal, PipelineEvent, PipelineOrchestrator, RunPlan};

use super::{load_context, make_broker, make_deployer, make_images, make_releases};

/// Run the whole pipeline: auth, version, release, image, deploy.
pub async fn execute(config_path: &str) -> Result<()> {
    let context = load_context(config_path)?;
    let plan = RunPlan::from_config(&context.config, &context.git, &context.root);

    let broker = make_broker(&context.config)?;
    let releases = make_releases(&context.config)?;
    let images = make_images()?;
    let deployer = make_deployer(&context.config)?;

    let orchestrator = PipelineOrchestrator::new(broker, releases, images, deployer);
    let cancel = CancelSignal::new();

    // Ctrl-C cancels at the next stage boundary; the stage in flight
    // runs to completion first.
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\ninterrupt received; finishing the current stage");
            interrupt.cancel();
        }
    });

    println!(
        "Releasing {} at commit {}",
        context.config.project,
        short(&plan.commit)
    );
    println!("\n--- Starting pipeline ---\n");

    let (mut rx, report_handle) = orchestrator.execute(plan, cancel);

    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::StageStarted { stage } => {
                println!("▶ Stage '{}' started", stage);
            }
            PipelineEvent::StageCompleted { stage, success } => {
                if success {
                    println!("✓ Stage '{}' completed\n", stage);
                } else {
                    println!("✗ Stage '{}' failed\n", stage);
                }
            }
            PipelineEvent::RunCompleted { success } => {
                if success {
                    println!("--- Pipeline completed ---");
                } else {
                    println!("--- Pipeline failed ---");
                }
            }
        }
    }

    let report = report_handle.await.context("pipeline task failed")?;

    println!("\n--- Run {} ---", report.run_id);
    if let Some(version) = &report.version {
        println!("  version: {}", version);
    }
    for transition in &report.transitions {
        println!(
            "  {} {}",
            transition.at.format("%H:%M:%S%.3f"),
            transition.state
        );
    }

    match report.outcome {
        Outcome::Succeeded => {
            println!("\n✓ Release complete");
            Ok(())
        }
        Outcome::Failed { stage, error } => {
            eprintln!("\n✗ Failed at stage '{}': {}", stage, error);
            Err(error.into())
        }
    }
}

fn short(commit: &str) -> &str {
    commit.get(..12).unwrap_or(commit)
}
