//! Fetching current state from the account

use crate::context::{CancelToken, DataProvider, SessionContext};
use crate::error::{Error, Result};
use crate::kind::{Kind, is_system_role};
use crate::manifest::Manifest;
use crate::registry::Registry;
use crate::types::{AttrMap, BlueprintConfig};
use crate::urn::Urn;
use rayon::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

/// Normalized attributes of every relevant object that exists remotely
pub type RemoteState = BTreeMap<Urn, AttrMap>;

/// Schemas that exist in every database and are never enumerated
const SYSTEM_SCHEMAS: &[&str] = &["INFORMATION_SCHEMA"];

/// Fetches remote state for one plan run. Listings are cached for the
/// lifetime of the fetcher.
pub struct RemoteFetcher<'a> {
    provider: &'a dyn DataProvider,
    registry: &'a Registry,
    session: &'a SessionContext,
    cancel: CancelToken,
    listings: HashMap<Kind, Vec<Urn>>,
}

impl<'a> RemoteFetcher<'a> {
    pub fn new(
        provider: &'a dyn DataProvider,
        registry: &'a Registry,
        session: &'a SessionContext,
        cancel: CancelToken,
    ) -> Self {
        Self {
            provider,
            registry,
            session,
            cancel,
            listings: HashMap::new(),
        }
    }

    /// Fetch manifest resources, plus every listed object of the allowlisted
    /// kinds in sync modes, then verify that referenced resources exist
    pub fn fetch(&mut self, manifest: &Manifest, config: &BlueprintConfig) -> Result<RemoteState> {
        let mut urns: BTreeSet<Urn> = manifest.urns.iter().cloned().collect();

        if config.run_mode.is_sync() {
            for kind in &config.allowlist {
                if !self.registry.get(*kind)?.listable {
                    continue;
                }
                for urn in self.list(*kind)? {
                    if manifest.contains(&urn) || is_enumerable(&urn) {
                        urns.insert(urn);
                    }
                }
            }
        }

        let urns: Vec<Urn> = urns.into_iter().collect();
        let state = self.fetch_parallel(&urns, config.workers)?;
        log::info!("fetched {} of {} resources", state.len(), urns.len());

        self.check_references(manifest, &state)?;
        Ok(state)
    }

    fn list(&mut self, kind: Kind) -> Result<Vec<Urn>> {
        if let Some(cached) = self.listings.get(&kind) {
            return Ok(cached.clone());
        }
        log::debug!("listing {}", kind);
        let urns: Vec<Urn> = self
            .provider
            .list_resource(kind)?
            .into_iter()
            .map(|fqn| self.session.urn(kind, fqn))
            .collect();
        self.listings.insert(kind, urns.clone());
        Ok(urns)
    }

    fn fetch_parallel(&self, urns: &[Urn], workers: usize) -> Result<RemoteState> {
        let state: Mutex<RemoteState> = Mutex::new(BTreeMap::new());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build()?;

        pool.install(|| {
            urns.par_iter().try_for_each(|urn| -> Result<()> {
                if self.cancel.is_cancelled() {
                    return Err(Error::Cancelled {
                        executed: Vec::new(),
                        remaining: vec![urn.to_string()],
                    });
                }
                if let Some(attrs) = self.fetch_one(urn)? {
                    let mut guard = match state.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    guard.insert(urn.clone(), attrs);
                }
                Ok(())
            })
        })?;

        Ok(match state.into_inner() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        })
    }

    /// Fetch one resource and normalize it with the kind's defaults
    pub fn fetch_one(&self, urn: &Urn) -> Result<Option<AttrMap>> {
        let spec = self.registry.get(urn.kind)?;
        let Some(mut attrs) = self.provider.fetch_resource(urn)? else {
            log::debug!("{} does not exist", urn);
            return Ok(None);
        };
        if spec.get_field("name").is_some() && attrs.get("name").is_none_or(Value::is_null) {
            attrs.insert("name".to_string(), Value::String(urn.name().to_string()));
        }
        Ok(Some(spec.normalize(attrs)))
    }

    /// Every reference target must be managed or exist remotely. System
    /// roles and `PUBLIC` schemas always exist and are not checked.
    fn check_references(&self, manifest: &Manifest, state: &RemoteState) -> Result<()> {
        let mut probed: HashMap<&Urn, bool> = HashMap::new();
        for (from, to) in &manifest.refs {
            if manifest.contains(to) || state.contains_key(to) || is_public_schema(to) || is_builtin_role(to) {
                continue;
            }
            let exists = match probed.get(to) {
                Some(exists) => *exists,
                None => {
                    if self.cancel.is_cancelled() {
                        return Err(Error::Cancelled {
                            executed: Vec::new(),
                            remaining: vec![to.to_string()],
                        });
                    }
                    let exists = self.provider.fetch_resource(to)?.is_some();
                    probed.insert(to, exists);
                    exists
                }
            };
            if !exists {
                return Err(Error::MissingResource {
                    urn: to.to_string(),
                    referrer: from.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn is_builtin_role(urn: &Urn) -> bool {
    urn.kind == Kind::Role && is_system_role(urn.name())
}

fn is_public_schema(urn: &Urn) -> bool {
    urn.kind == Kind::Schema && urn.name().matches("PUBLIC")
}

/// Whether a listed object takes part in sync: system roles and built-in
/// schemas are never managed
fn is_enumerable(urn: &Urn) -> bool {
    match urn.kind {
        Kind::Role => !is_system_role(urn.name()),
        Kind::Schema => {
            !is_public_schema(urn) && !SYSTEM_SCHEMAS.iter().any(|s| urn.name().matches(s))
        }
        _ => true,
    }
}
