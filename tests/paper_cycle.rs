use std::path::Path;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use qtrade::adapters::{
    CsvCandleArchive, JsonFileModelStore, LogNotifier, MarketDataSource, ModelStore, PaperExecution,
};
use qtrade::domain::{flat_series, Candle, Side, Timeframe};
use qtrade::rl::{QLearningConfig, StateKey};
use qtrade::{EngineConfig, EnginePool, EngineScope, ExitReason, LiveConfig, LiveCycleController};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn bars(closes: &[Decimal]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    flat_series(start, Timeframe::M15, closes)
}

fn write_archive(path: &Path, candles: &[Candle]) {
    let mut raw = String::from("timestamp,open,high,low,close,volume\n");
    for c in candles {
        raw.push_str(&format!(
            "{},{},{},{},{},{}\n",
            c.timestamp.timestamp(),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume
        ));
    }
    std::fs::write(path, raw).unwrap();
}

/// Opens a protected long from the archive, then closes it on the stop once price falls.
#[tokio::test]
async fn paper_cycle_opens_then_stops_out() {
    let data = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();

    let archive = CsvCandleArchive::new(data.path());
    let path = archive.path_for("BTCUSDT", Timeframe::M15);
    write_archive(&path, &bars(&[dec!(100); 30]));

    let market: Arc<dyn MarketDataSource> = Arc::new(archive);
    let paper = Arc::new(PaperExecution::new(dec!(1000)).with_market(market.clone(), Timeframe::M15));
    let store = Arc::new(JsonFileModelStore::new(state.path()));

    let config = EngineConfig {
        learning: QLearningConfig {
            epsilon: 0.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut pool = EnginePool::new(EngineScope::Shared, config).with_seed(9);
    pool.engine_for("BTCUSDT").q_table_mut().entry(&StateKey::from("-1_0")).long = 1.0;

    let mut controller = LiveCycleController::new(
        LiveConfig {
            watchlist: vec!["BTCUSDT".to_string()],
            ..Default::default()
        },
        pool,
        market,
        paper.clone(),
        store.clone(),
        Arc::new(LogNotifier::default()),
    );

    let first = controller.run_cycle().await;
    assert_eq!(first.opened.len(), 1);
    assert_eq!(first.opened[0].side, Side::Long);
    assert_eq!(first.opened[0].stop_loss, dec!(99));
    assert_eq!(paper.orders().await.len(), 3);
    assert!(store.load_model("BTCUSDT", "qlearning").await.unwrap().is_some());

    let mut closes = vec![dec!(100); 30];
    closes.push(dec!(98));
    write_archive(&path, &bars(&closes));

    let second = controller.run_cycle().await;
    assert_eq!(second.positions_checked, 1);
    assert_eq!(second.closed.len(), 1);
    let closed = &second.closed[0];
    assert_eq!(closed.exit_reason, Some(ExitReason::StopLoss));
    assert_eq!(closed.exit_price, Some(dec!(98)));
    assert_eq!(closed.pnl_percent, Some(dec!(-2)));

    let perf = store.strategy_performance("BTCUSDT", "qlearning").await.unwrap().unwrap();
    assert_eq!(perf.total_trades, 1);
    assert_eq!(perf.win_rate, 0.0);
}
