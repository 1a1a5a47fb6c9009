//! `floe apply`

use anyhow::{Context as _, Result};
use declarative::{Blueprint, Engine, ExecuteSummary, Plan};
use std::fs;
use warehouse::SqlRenderer;

use super::Target;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::progress::{Prompt, StatementProgress};
use crate::{paths, ui};

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let mut target = Target::load(&args.target)?;
    target.config.dry_run = args.dry_run;

    let registry = warehouse::registry();
    let renderer = SqlRenderer::new(&registry);
    let engine = Engine::new(&target.provider, &registry, &renderer, target.config.clone());

    let plan = match &args.plan {
        Some(path) => load_plan(path)?,
        None => engine.plan(target.blueprint()?).context("Planning failed")?,
    };
    if plan.is_empty() {
        ui::success("Account matches the blueprint");
        return Ok(());
    }
    if !ctx.quiet {
        ui::print_plan(&plan);
    }

    let summary = engine
        .apply(
            Blueprint::new(),
            Some(plan.clone()),
            &mut StatementProgress::new(ctx.quiet),
            &mut Prompt::new(args.yes),
        )
        .context("Apply failed")?;

    if declined(&summary) {
        ui::warn("Apply cancelled");
        return Ok(());
    }
    if summary.executed > 0 {
        target.record(&plan)?;
    }
    ui::print_summary(&summary);
    Ok(())
}

fn load_plan(path: &str) -> Result<Plan> {
    let path = paths::expand(path);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Could not read plan {}", path.display()))?;
    Plan::from_json(&content).with_context(|| format!("Invalid plan {}", path.display()))
}

/// A declined run reports every statement as skipped without sending any
pub fn declined(summary: &ExecuteSummary) -> bool {
    summary.skipped > 0 && summary.statements.is_empty()
}
