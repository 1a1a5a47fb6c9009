//! `floe destroy`

use anyhow::{Context as _, Result};
use declarative::{Engine, destroy_plan};
use warehouse::SqlRenderer;

use super::Target;
use super::apply::declined;
use crate::Context;
use crate::cli::DestroyArgs;
use crate::progress::{Prompt, StatementProgress};
use crate::ui;

pub fn run(ctx: &Context, args: DestroyArgs) -> Result<()> {
    let mut target = Target::load(&args.target)?;
    target.config.dry_run = args.dry_run;

    let registry = warehouse::registry();
    let renderer = SqlRenderer::new(&registry);
    let engine = Engine::new(&target.provider, &registry, &renderer, target.config.clone());

    let session = engine.session()?;
    let manifest = engine.manifest(target.blueprint()?, &session)?;
    let plan = destroy_plan(&manifest)?;
    if plan.is_empty() {
        ui::info("Blueprint declares nothing to destroy");
        return Ok(());
    }
    if !ctx.quiet {
        ui::print_plan(&plan);
    }

    let summary = engine
        .destroy(
            target.blueprint()?,
            &mut StatementProgress::new(ctx.quiet),
            &mut Prompt::new(args.yes),
        )
        .context("Destroy failed")?;

    if declined(&summary) {
        ui::warn("Destroy cancelled");
        return Ok(());
    }
    if summary.executed > 0 {
        target.record(&plan)?;
    }
    ui::print_summary(&summary);
    Ok(())
}
