//! `floe plan`

use anyhow::{Context as _, Result};
use declarative::Engine;
use std::fs;
use warehouse::SqlRenderer;

use super::Target;
use crate::Context;
use crate::cli::PlanArgs;
use crate::{paths, ui};

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let target = Target::load(&args.target)?;
    let registry = warehouse::registry();
    let renderer = SqlRenderer::new(&registry);
    let engine = Engine::new(&target.provider, &registry, &renderer, target.config.clone());

    let plan = engine.plan(target.blueprint()?).context("Planning failed")?;

    if let Some(out) = &args.out {
        let path = paths::expand(out);
        fs::write(&path, plan.to_json()?)
            .with_context(|| format!("Could not write plan to {}", path.display()))?;
        log::info!("Saved plan to {}", path.display());
    }

    if args.json {
        println!("{}", plan.to_json()?);
        return Ok(());
    }

    if plan.is_empty() {
        ui::success("Account matches the blueprint");
        return Ok(());
    }

    ui::print_plan(&plan);
    if args.sql || ctx.verbose > 0 {
        let statements = engine.compile(&plan).context("Compiling plan failed")?;
        ui::header("Statements");
        ui::print_statements(&statements);
    }
    Ok(())
}
