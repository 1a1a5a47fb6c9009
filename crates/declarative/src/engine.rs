//! Plan, apply and destroy orchestration

use crate::blueprint::Blueprint;
use crate::compiler::compile;
use crate::context::{CancelToken, ConfirmCallback, DataProvider, ProgressCallback, Renderer, SessionContext};
use crate::error::Result;
use crate::executor::{check_session_user, execute};
use crate::manifest::Manifest;
use crate::planner::{Change, Plan, plan_changes, topological_sort};
use crate::registry::Registry;
use crate::remote::RemoteFetcher;
use crate::types::{Action, BlueprintConfig, ExecuteOptions, ExecuteSummary};
use crate::urn::Urn;
use std::collections::BTreeSet;

/// Ties a provider, registry and renderer together for one account
pub struct Engine<'a> {
    provider: &'a dyn DataProvider,
    registry: &'a Registry,
    renderer: &'a dyn Renderer,
    config: BlueprintConfig,
    cancel: CancelToken,
}

impl<'a> Engine<'a> {
    pub fn new(
        provider: &'a dyn DataProvider,
        registry: &'a Registry,
        renderer: &'a dyn Renderer,
        config: BlueprintConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            renderer,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Use a caller-owned cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &BlueprintConfig {
        &self.config
    }

    pub fn session(&self) -> Result<SessionContext> {
        Ok(self.provider.fetch_session()?)
    }

    /// Finalize the blueprint and build its manifest
    pub fn manifest(&self, blueprint: Blueprint, session: &SessionContext) -> Result<Manifest> {
        let tree = blueprint.finalize(self.registry, session)?;
        Manifest::build(&tree, self.registry, session, &self.config)
    }

    /// Compute the changes that would bring the account to the blueprint
    pub fn plan(&self, blueprint: Blueprint) -> Result<Plan> {
        let session = self.session()?;
        self.plan_for(blueprint, &session)
    }

    fn plan_for(&self, blueprint: Blueprint, session: &SessionContext) -> Result<Plan> {
        let manifest = self.manifest(blueprint, session)?;
        let mut fetcher = RemoteFetcher::new(self.provider, self.registry, session, self.cancel.clone());
        let remote = fetcher.fetch(&manifest, &self.config)?;
        plan_changes(&manifest, &remote, self.registry, &self.config)
    }

    /// Compile a plan into statements for the current session
    pub fn compile(&self, plan: &Plan) -> Result<Vec<String>> {
        let session = self.session()?;
        check_session_user(plan, &session)?;
        compile(plan, self.registry, &session, self.renderer)
    }

    /// Apply a plan, computing it first when none is given
    pub fn apply<P, C>(
        &self,
        blueprint: Blueprint,
        plan: Option<Plan>,
        progress: &mut P,
        confirm: &mut C,
    ) -> Result<ExecuteSummary>
    where
        P: ProgressCallback,
        C: ConfirmCallback,
    {
        let session = self.session()?;
        let plan = match plan {
            Some(plan) => plan,
            None => self.plan_for(blueprint, &session)?,
        };
        let opts = ExecuteOptions {
            dry_run: self.config.dry_run,
            tolerate_missing: false,
            cancel: self.cancel.clone(),
        };
        self.run(&plan, &session, opts, progress, confirm)
    }

    /// Remove every resource in the blueprint, dependents first. Remote state
    /// is not fetched; missing objects are skipped.
    pub fn destroy<P, C>(&self, blueprint: Blueprint, progress: &mut P, confirm: &mut C) -> Result<ExecuteSummary>
    where
        P: ProgressCallback,
        C: ConfirmCallback,
    {
        let session = self.session()?;
        let manifest = self.manifest(blueprint, &session)?;
        let plan = destroy_plan(&manifest)?;
        let opts = ExecuteOptions {
            dry_run: self.config.dry_run,
            tolerate_missing: true,
            cancel: self.cancel.clone(),
        };
        self.run(&plan, &session, opts, progress, confirm)
    }

    fn run<P, C>(
        &self,
        plan: &Plan,
        session: &SessionContext,
        opts: ExecuteOptions,
        progress: &mut P,
        confirm: &mut C,
    ) -> Result<ExecuteSummary>
    where
        P: ProgressCallback,
        C: ConfirmCallback,
    {
        if plan.is_empty() {
            log::info!("nothing to do");
            return Ok(ExecuteSummary::default());
        }

        check_session_user(plan, session)?;
        let statements = compile(plan, self.registry, session, self.renderer)?;

        if !opts.dry_run && !confirm.confirm(&format!("Apply {} changes?", plan.len()))? {
            return Ok(ExecuteSummary {
                skipped: statements.len(),
                ..Default::default()
            });
        }

        execute(&statements, self.provider, &opts, progress)
    }
}

/// REMOVE changes for every manifest resource in reverse dependency order
pub fn destroy_plan(manifest: &Manifest) -> Result<Plan> {
    let nodes: BTreeSet<Urn> = manifest.resources.keys().cloned().collect();
    let order = topological_sort(&nodes, &manifest.refs)?;
    let changes = order
        .into_iter()
        .rev()
        .filter_map(|urn| {
            let entry = manifest.get(&urn)?;
            Some(Change {
                action: Action::Remove,
                before: Some(entry.attrs.clone()),
                after: None,
                delta: Default::default(),
                urn,
            })
        })
        .collect();
    Ok(Plan::new(changes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, NoProgress};
    use crate::error::Error;
    use crate::kind::Kind;
    use crate::resource::Resource;
    use crate::testing::{MemoryProvider, PlainRenderer, attrs, fixture_registry, session, urn};
    use serde_json::json;

    fn blueprint() -> Blueprint {
        let mut blueprint = Blueprint::new();
        blueprint.add(Resource::new(Kind::Database, "db")).unwrap();
        blueprint
            .add(Resource::new(Kind::Schema, "raw").in_database("db"))
            .unwrap();
        blueprint
    }

    #[test]
    fn test_apply_creates_in_dependency_order() {
        let provider = MemoryProvider::new(session());
        let registry = fixture_registry();
        let engine = Engine::new(&provider, &registry, &PlainRenderer, BlueprintConfig::default());

        let summary = engine
            .apply(blueprint(), None, &mut NoProgress, &mut AutoConfirm)
            .unwrap();
        assert_eq!(
            summary.statements,
            vec![
                "USE SECONDARY ROLES ALL",
                "USE ROLE SYSADMIN",
                "CREATE DATABASE DB",
                "CREATE SCHEMA DB.RAW",
            ]
        );
    }

    #[test]
    fn test_declined_apply_runs_nothing() {
        let provider = MemoryProvider::new(session());
        let registry = fixture_registry();
        let engine = Engine::new(&provider, &registry, &PlainRenderer, BlueprintConfig::default());
        let summary = engine
            .apply(blueprint(), None, &mut NoProgress, &mut AutoDecline)
            .unwrap();
        assert_eq!(summary.executed, 0);
        assert!(provider.executed().is_empty());
    }

    #[test]
    fn test_apply_with_saved_plan() {
        let provider = MemoryProvider::new(session());
        let registry = fixture_registry();
        let engine = Engine::new(&provider, &registry, &PlainRenderer, BlueprintConfig::default());
        let plan = engine.plan(blueprint()).unwrap();
        let plan = Plan::from_json(&plan.to_json().unwrap()).unwrap();

        let summary = engine
            .apply(Blueprint::new(), Some(plan), &mut NoProgress, &mut AutoConfirm)
            .unwrap();
        assert_eq!(summary.executed, 4);
    }

    #[test]
    fn test_destroy_drops_dependents_first() {
        let provider = MemoryProvider::new(session());
        let registry = fixture_registry();
        let engine = Engine::new(&provider, &registry, &PlainRenderer, BlueprintConfig::default());

        let summary = engine
            .destroy(blueprint(), &mut NoProgress, &mut AutoConfirm)
            .unwrap();
        assert_eq!(
            summary.statements,
            vec![
                "USE SECONDARY ROLES ALL",
                "USE ROLE SYSADMIN",
                "DROP SCHEMA DB.RAW",
                "DROP DATABASE DB",
            ]
        );
    }

    #[test]
    fn test_mutually_required_resources_cannot_be_planned() {
        let provider = MemoryProvider::new(session());
        let registry = fixture_registry();
        let engine = Engine::new(&provider, &registry, &PlainRenderer, BlueprintConfig::default());

        let mut blueprint = Blueprint::new();
        blueprint
            .add(Resource::new(Kind::Role, "loader").requires(Kind::Role, "reader"))
            .unwrap();
        blueprint
            .add(Resource::new(Kind::Role, "reader").requires(Kind::Role, "loader"))
            .unwrap();

        match engine.plan(blueprint) {
            Err(Error::CyclicDependency { urns }) => {
                assert_eq!(urns.len(), 2);
                assert!(urns.iter().any(|u| u.ends_with("role/LOADER")));
                assert!(urns.iter().any(|u| u.ends_with("role/READER")));
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
        assert!(provider.executed().is_empty());
    }

    #[test]
    fn test_plan_is_empty_when_in_sync() {
        let provider = MemoryProvider::new(session());
        provider.insert(urn("urn::ABC123:role/R"), attrs(json!({"name": "R", "owner": "USERADMIN"})));
        let registry = fixture_registry();
        let engine = Engine::new(&provider, &registry, &PlainRenderer, BlueprintConfig::default());

        let mut blueprint = Blueprint::new();
        blueprint.add(Resource::new(Kind::Role, "r")).unwrap();
        assert!(engine.plan(blueprint).unwrap().is_empty());
    }
}
