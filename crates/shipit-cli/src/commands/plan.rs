//! Run-plan preview without side effects.

use anyhow::Result;
use shipit_core::version::read_marker;
use shipit_pipeline::RunPlan;

use super::load_context;

/// Resolve everything a run would use and print it, touching nothing.
pub fn show(config_path: &str) -> Result<()> {
    let context = load_context(config_path)?;
    let plan = RunPlan::from_config(&context.config, &context.git, &context.root);

    let version = read_marker(&plan.marker_path)?;
    let tags = plan.tag_set(&version);
    let release = plan.release_request(&version);

    println!("project:  {}", context.config.project);
    println!("commit:   {}", plan.commit);
    if let Some(branch) = &context.git.branch {
        println!("branch:   {}", branch);
    }
    println!("version:  {}", version);
    println!();
    println!(
        "release:  tag {} on {}/{}",
        release.tag, context.config.forge.owner, context.config.forge.repo
    );
    println!("images:");
    for reference in tags.all() {
        println!("  {}", reference);
    }
    println!(
        "deploy:   {} (resource group {})",
        plan.resource, plan.resource_group
    );

    Ok(())
}
