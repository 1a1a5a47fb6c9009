pub mod apply;
pub mod destroy;
pub mod plan;

use anyhow::{Context, Result};
use declarative::{Blueprint, BlueprintConfig, Kind, Plan, RunMode};
use std::path::PathBuf;
use warehouse::SnapshotProvider;

use crate::cli::TargetArgs;
use crate::config::BlueprintFile;
use crate::paths;

/// A blueprint paired with the account it is reconciled against
pub struct Target {
    pub file: BlueprintFile,
    pub config: BlueprintConfig,
    pub provider: SnapshotProvider,
    snapshot_path: PathBuf,
}

impl Target {
    pub fn load(args: &TargetArgs) -> Result<Self> {
        let blueprint_path = paths::resolve(args.blueprint.as_deref(), paths::BLUEPRINT_FILE)?;
        let snapshot_path = paths::resolve(args.snapshot.as_deref(), paths::SNAPSHOT_FILE)?;

        let file = BlueprintFile::load(&blueprint_path)?;
        let config = merge_config(file.config()?, args)?;
        let provider = SnapshotProvider::load(&snapshot_path)
            .with_context(|| format!("Could not load account snapshot {}", snapshot_path.display()))?;

        log::debug!(
            "Reconciling {} against {} in {} mode",
            blueprint_path.display(),
            snapshot_path.display(),
            config.run_mode
        );
        Ok(Self {
            file,
            config,
            provider,
            snapshot_path,
        })
    }

    /// A fresh blueprint; finalizing consumes it
    pub fn blueprint(&self) -> Result<Blueprint> {
        self.file.blueprint()
    }

    /// Write the effects of an executed plan back to the snapshot
    pub fn record(&self, plan: &Plan) -> Result<()> {
        self.provider.apply_plan(plan);
        self.provider
            .snapshot()
            .save(&self.snapshot_path)
            .with_context(|| format!("Could not update {}", self.snapshot_path.display()))?;
        log::info!("Recorded {} changes in {}", plan.len(), self.snapshot_path.display());
        Ok(())
    }
}

/// Command-line settings override the blueprint file's
fn merge_config(mut config: BlueprintConfig, args: &TargetArgs) -> Result<BlueprintConfig> {
    if let Some(mode) = &args.run_mode {
        config.run_mode = mode.parse::<RunMode>()?;
    }
    if !args.allowlist.is_empty() {
        config.allowlist = args
            .allowlist
            .iter()
            .map(|k| k.parse::<Kind>())
            .collect::<declarative::Result<_>>()?;
    }
    config.ignore_ownership |= args.ignore_ownership;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    Ok(config)
}
