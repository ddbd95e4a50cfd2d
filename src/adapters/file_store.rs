//! Model persistence on the local filesystem
//!
//! ```text
//! {dir}/models/{symbol}__{strategy}.json        serialized Q-table
//! {dir}/performance/{symbol}__{strategy}.json   trade ledger
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::adapters::traits::ModelStore;
use crate::error::Result;
use crate::strategy::{PerformanceSummary, TradeLedger};

#[derive(Debug, Clone)]
pub struct JsonFileModelStore {
    dir: PathBuf,
}

impl JsonFileModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn model_path(&self, symbol: &str, strategy: &str) -> PathBuf {
        self.dir.join("models").join(file_name(symbol, strategy))
    }

    pub fn ledger_path(&self, symbol: &str, strategy: &str) -> PathBuf {
        self.dir.join("performance").join(file_name(symbol, strategy))
    }

    /// Full trade ledger, `None` when nothing was recorded
    pub async fn ledger(&self, symbol: &str, strategy: &str) -> Result<Option<TradeLedger>> {
        match read_optional(&self.ledger_path(symbol, strategy)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

fn file_name(symbol: &str, strategy: &str) -> String {
    format!("{}__{}.json", symbol, strategy)
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a sibling temp file so readers never see a partial blob
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl ModelStore for JsonFileModelStore {
    async fn load_model(&self, symbol: &str, strategy: &str) -> Result<Option<String>> {
        let path = self.model_path(symbol, strategy);
        let blob = read_optional(&path).await?;
        debug!(path = %path.display(), found = blob.is_some(), "model lookup");
        Ok(blob)
    }

    async fn save_model(&self, symbol: &str, strategy: &str, blob: &str) -> Result<()> {
        let path = self.model_path(symbol, strategy);
        write_atomic(&path, blob).await?;
        debug!(path = %path.display(), bytes = blob.len(), "model saved");
        Ok(())
    }

    async fn record_trade_result(
        &self,
        symbol: &str,
        strategy: &str,
        is_win: bool,
        pnl_percent: f64,
    ) -> Result<()> {
        let mut ledger = self.ledger(symbol, strategy).await?.unwrap_or_default();
        ledger.record(is_win, pnl_percent);
        write_atomic(
            &self.ledger_path(symbol, strategy),
            &serde_json::to_string_pretty(&ledger)?,
        )
        .await?;
        info!(
            symbol,
            strategy,
            is_win,
            pnl_percent = %format!("{:.2}", pnl_percent),
            total_trades = ledger.total_trades(),
            "trade result recorded"
        );
        Ok(())
    }

    async fn strategy_performance(&self, symbol: &str, strategy: &str) -> Result<Option<PerformanceSummary>> {
        Ok(self
            .ledger(symbol, strategy)
            .await?
            .filter(|l| l.total_trades() > 0)
            .map(|l| l.summary()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QTradeError;

    #[tokio::test]
    async fn test_missing_files_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileModelStore::new(dir.path());
        assert!(store.load_model("BTCUSDT", "q").await.unwrap().is_none());
        assert!(store.strategy_performance("BTCUSDT", "q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_model_and_ledger_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileModelStore::new(dir.path());

        store.save_model("BTCUSDT", "q", r#"{"1_0":{"long":1.0,"short":0.0,"hold":0.0}}"#).await.unwrap();
        assert!(store.model_path("BTCUSDT", "q").ends_with("models/BTCUSDT__q.json"));

        tokio_test::assert_ok!(store.record_trade_result("BTCUSDT", "q", true, 3.0).await);
        tokio_test::assert_ok!(store.record_trade_result("BTCUSDT", "q", false, -1.5).await);

        // A fresh handle reads what the first one wrote
        let reopened = JsonFileModelStore::new(dir.path());
        let blob = reopened.load_model("BTCUSDT", "q").await.unwrap().unwrap();
        assert!(blob.contains("1_0"));
        let perf = reopened.strategy_performance("BTCUSDT", "q").await.unwrap().unwrap();
        assert_eq!(perf.total_trades, 2);
        assert_eq!(perf.profit_loss_ratio, 2.0);
    }

    #[tokio::test]
    async fn test_corrupt_ledger_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileModelStore::new(dir.path());
        let path = store.ledger_path("ETHUSDT", "q");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let err = store.strategy_performance("ETHUSDT", "q").await.unwrap_err();
        assert!(matches!(err, QTradeError::Json(_)));
    }
}
