//! Configuration for the research service
//!
//! Resolution: ENV → TOML → compiled defaults. The file itself is located by
//! `dossier_common::config::ConfigFileResolver` (CLI arg → `DOSSIER_CONFIG`
//! → `~/.config/dossier/config.toml`).
//!
//! Endpoint overrides: `DOSSIER_<SOURCE>_ENDPOINT`, e.g.
//! `DOSSIER_WEB_SEARCH_ENDPOINT`, `DOSSIER_X_ENDPOINT`.
//!
//! `validate()` runs once when the config is loaded; the orchestrator does
//! not re-check values per query.

use crate::adapters::{
    FixtureSet, LinkedInAdapter, SourceAdapter, TwitterAdapter, WebSearchAdapter,
};
use crate::cache::ResultCache;
use crate::correlation::{CorrelationWeights, CorrelatorConfig};
use crate::error::ResearchError;
use crate::orchestrator::{Orchestrator, OrchestratorConfig, SourceRegistration};
use crate::rate_limiter::{InvalidSettings, RateLimitSettings, RateLimiter};
use crate::types::SourceId;
use dossier_common::config::{load_toml_config, ConfigFileResolver, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Sources with a built-in network adapter
pub const KNOWN_SOURCES: &[&str] = &["web_search", "linkedin", "x"];

/// Top-level config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DossierConfig {
    pub logging: LoggingConfig,
    pub research: ResearchConfig,
    /// Per-source settings keyed by source id
    pub sources: BTreeMap<String, SourceSettings>,
}

/// `[research]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Wall-clock bound on one research run
    pub deadline_ms: u64,
    pub similarity_threshold: f64,
    pub relevance_threshold: f64,
    /// Search hits kept per web search
    pub max_results: usize,
    pub weights: CorrelationWeights,
    /// Bucket used by sources without their own `rate_limit`
    pub rate_limit: RateLimitSettings,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        let correlator = CorrelatorConfig::default();
        Self {
            deadline_ms: 5000,
            similarity_threshold: correlator.similarity_threshold,
            relevance_threshold: correlator.relevance_threshold,
            max_results: 10,
            weights: correlator.weights,
            rate_limit: RateLimitSettings::default(),
        }
    }
}

/// `[sources.<id>]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub enabled: bool,
    pub endpoint: Option<String>,
    /// Overrides the adapter's volatility-based TTL
    pub cache_ttl_secs: Option<u64>,
    pub rate_limit: Option<RateLimitSettings>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            cache_ttl_secs: None,
            rate_limit: None,
        }
    }
}

impl DossierConfig {
    /// Resolve, load, apply env overrides and validate
    pub fn load(cli_path: Option<PathBuf>) -> Result<Self, ResearchError> {
        let resolved = ConfigFileResolver::new("dossier").with_cli_arg(cli_path).resolve();
        if let Some((path, source)) = &resolved {
            info!("Config file {} (from {})", path.display(), source);
        }

        let mut config: DossierConfig = load_toml_config(resolved.as_ref().map(|(p, _)| p.as_path()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `DOSSIER_<SOURCE>_ENDPOINT` variables
    pub fn apply_env_overrides(&mut self) {
        let mut ids: Vec<String> = KNOWN_SOURCES.iter().map(|s| s.to_string()).collect();
        ids.extend(self.sources.keys().cloned());
        ids.sort();
        ids.dedup();

        for id in ids {
            let var = endpoint_env_var(&id);
            if let Ok(endpoint) = std::env::var(&var) {
                if endpoint.trim().is_empty() {
                    continue;
                }
                info!("{} endpoint loaded from {}", id, var);
                self.sources.entry(id).or_default().endpoint = Some(endpoint.trim().to_string());
            }
        }
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<(), ResearchError> {
        let r = &self.research;
        if r.deadline_ms == 0 {
            return Err(invalid("research.deadline_ms must be greater than 0"));
        }
        for (name, value) in [
            ("similarity_threshold", r.similarity_threshold),
            ("relevance_threshold", r.relevance_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(&format!(
                    "research.{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        let w = &r.weights;
        if [w.name, w.attributes, w.hints, w.cross_reference]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(invalid("research.weights must be non-negative"));
        }
        if w.total() <= 0.0 {
            return Err(invalid("research.weights must not all be zero"));
        }

        validate_rate_limit("research.rate_limit", &r.rate_limit)?;
        for (id, settings) in &self.sources {
            if let Some(limit) = &settings.rate_limit {
                validate_rate_limit(&format!("sources.{}.rate_limit", id), limit)?;
            }
            if settings.cache_ttl_secs == Some(0) {
                return Err(invalid(&format!(
                    "sources.{}.cache_ttl_secs must be greater than 0",
                    id
                )));
            }
        }
        Ok(())
    }

    pub fn source(&self, id: &str) -> SourceSettings {
        self.sources.get(id).cloned().unwrap_or_default()
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            deadline: Duration::from_millis(self.research.deadline_ms),
            correlator: CorrelatorConfig {
                similarity_threshold: self.research.similarity_threshold,
                relevance_threshold: self.research.relevance_threshold,
                weights: self.research.weights,
            },
        }
    }

    /// Rate limiter with per-source bucket overrides applied
    pub fn rate_limiter(&self) -> Result<RateLimiter, ResearchError> {
        let config_error = |e: InvalidSettings| ResearchError::Config(e.to_string());
        self.sources
            .iter()
            .filter_map(|(id, s)| s.rate_limit.map(|limit| (SourceId::from(id.as_str()), limit)))
            .try_fold(
                RateLimiter::new(self.research.rate_limit).map_err(config_error)?,
                |limiter, (id, limit)| limiter.with_source(id, limit).map_err(config_error),
            )
    }

    /// Build an orchestrator over fixture sources (offline) or the
    /// configured network sources
    pub fn build_orchestrator(
        &self,
        fixtures: Option<&FixtureSet>,
    ) -> Result<Orchestrator, ResearchError> {
        let adapters: Vec<Arc<dyn SourceAdapter>> = match fixtures {
            Some(set) => set.adapters(),
            None => self.network_adapters()?,
        };

        if adapters.is_empty() {
            warn!("No sources configured; every research run will fail");
        }

        let orchestrator = adapters.into_iter().fold(
            Orchestrator::new(
                self.orchestrator_config(),
                Arc::new(ResultCache::new()),
                Arc::new(self.rate_limiter()?),
            ),
            |orchestrator, adapter| {
                let settings = self.source(adapter.source_id().as_str());
                orchestrator.with_source(SourceRegistration {
                    enabled: settings.enabled,
                    cache_ttl: settings.cache_ttl_secs.map(Duration::from_secs),
                    ..SourceRegistration::new(adapter)
                })
            },
        );
        Ok(orchestrator)
    }

    fn network_adapters(&self) -> Result<Vec<Arc<dyn SourceAdapter>>, ResearchError> {
        let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();

        for id in KNOWN_SOURCES {
            let Some(endpoint) = self.source(id).endpoint else {
                info!("Source {} has no endpoint configured; not registered", id);
                continue;
            };
            let adapter: Arc<dyn SourceAdapter> = match *id {
                "web_search" => Arc::new(
                    WebSearchAdapter::new(endpoint, self.research.max_results)
                        .map_err(|e| ResearchError::Config(e.to_string()))?,
                ),
                "linkedin" => Arc::new(
                    LinkedInAdapter::new(endpoint).map_err(|e| ResearchError::Config(e.to_string()))?,
                ),
                _ => Arc::new(
                    TwitterAdapter::new(endpoint).map_err(|e| ResearchError::Config(e.to_string()))?,
                ),
            };
            adapters.push(adapter);
        }

        for id in self.sources.keys() {
            if !KNOWN_SOURCES.contains(&id.as_str()) {
                warn!("Unknown source '{}' in config ignored", id);
            }
        }
        Ok(adapters)
    }
}

/// `web_search` → `DOSSIER_WEB_SEARCH_ENDPOINT`
pub fn endpoint_env_var(source_id: &str) -> String {
    format!(
        "DOSSIER_{}_ENDPOINT",
        source_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect::<String>()
    )
}

fn validate_rate_limit(section: &str, limit: &RateLimitSettings) -> Result<(), ResearchError> {
    limit
        .validate()
        .map_err(|e| invalid(&format!("{}: {}", section, e.0)))
}

fn invalid(message: &str) -> ResearchError {
    ResearchError::Config(message.to_string())
}
