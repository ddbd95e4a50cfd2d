//! Strategy engines keyed by symbol
//!
//! In `Shared` scope every symbol goes through one engine, so the table,
//! the pending transition and the tuned risk parameters are common to the
//! whole watchlist. In `PerSymbol` scope each symbol owns all three.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapters::ModelStore;
use crate::error::Result;
use crate::strategy::engine::{EngineConfig, StrategyEngine};

const SHARED_SLOT: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineScope {
    #[default]
    Shared,
    PerSymbol,
}

impl FromStr for EngineScope {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "shared" => Ok(Self::Shared),
            "per_symbol" => Ok(Self::PerSymbol),
            other => Err(format!("invalid engine scope '{}'; expected shared|per_symbol", other)),
        }
    }
}

pub struct EnginePool {
    scope: EngineScope,
    config: EngineConfig,
    seed: Option<u64>,
    engines: HashMap<String, StrategyEngine>,
    loaded: HashSet<String>,
}

impl EnginePool {
    pub fn new(scope: EngineScope, config: EngineConfig) -> Self {
        Self {
            scope,
            config,
            seed: None,
            engines: HashMap::new(),
            loaded: HashSet::new(),
        }
    }

    /// Seed exploration. Per-symbol engines get `seed + creation index`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn scope(&self) -> EngineScope {
        self.scope
    }

    pub fn strategy_name(&self) -> &str {
        &self.config.name
    }

    fn slot(&self, symbol: &str) -> String {
        match self.scope {
            EngineScope::Shared => SHARED_SLOT.to_string(),
            EngineScope::PerSymbol => symbol.to_string(),
        }
    }

    /// Engine serving `symbol`, if one was created
    pub fn engine(&self, symbol: &str) -> Option<&StrategyEngine> {
        self.engines.get(&self.slot(symbol))
    }

    /// Engine serving `symbol`, created with a fresh table when missing
    pub fn engine_for(&mut self, symbol: &str) -> &mut StrategyEngine {
        let slot = self.slot(symbol);
        let index = self.engines.len() as u64;
        let (config, seed) = (&self.config, self.seed);
        self.engines.entry(slot).or_insert_with(|| match seed {
            Some(seed) => StrategyEngine::with_seed(config.clone(), seed.wrapping_add(index)),
            None => StrategyEngine::new(config.clone()),
        })
    }

    /// Engine for `symbol` with its stored model loaded and performance applied.
    ///
    /// The model is read once per engine; a failed read is retried on the
    /// next call. Store failures are logged and the engine is used as is.
    pub async fn prepare(&mut self, symbol: &str, store: &dyn ModelStore) -> &mut StrategyEngine {
        let slot = self.slot(symbol);
        let strategy = self.config.name.clone();

        if !self.loaded.contains(&slot) {
            match store.load_model(symbol, &strategy).await {
                Ok(Some(blob)) => {
                    if let Err(e) = self.engine_for(symbol).load_model(&blob) {
                        warn!(symbol, %strategy, error = %e, "stored model unreadable, starting fresh");
                    }
                    self.loaded.insert(slot);
                }
                Ok(None) => {
                    debug!(symbol, %strategy, "no stored model");
                    self.loaded.insert(slot);
                }
                Err(e) => warn!(symbol, %strategy, error = %e, "model load failed"),
            }
        }

        match store.strategy_performance(symbol, &strategy).await {
            Ok(Some(performance)) => self.engine_for(symbol).apply_performance(symbol, &performance),
            Ok(None) => {}
            Err(e) => warn!(symbol, %strategy, error = %e, "performance lookup failed"),
        }

        self.engine_for(symbol)
    }

    /// Save the table serving `symbol` under that symbol's key.
    ///
    /// Returns false when no engine serves the symbol yet.
    pub async fn persist(&self, symbol: &str, store: &dyn ModelStore) -> Result<bool> {
        let Some(engine) = self.engine(symbol) else {
            return Ok(false);
        };
        let blob = engine.save_model()?;
        store.save_model(symbol, &self.config.name, &blob).await?;
        Ok(true)
    }
}
