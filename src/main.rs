use clap::Parser;
use qtrade::adapters::{
    CsvCandleArchive, JsonFileModelStore, LogNotifier, MarketDataSource, ModelStore, PaperExecution,
};
use qtrade::backtest::BacktestSimulator;
use qtrade::cli::{self, Cli, Commands, OutputMode};
use qtrade::config::{AppConfig, LoggingConfig};
use qtrade::domain::Timeframe;
use qtrade::live::LiveCycleController;
use qtrade::rl::QTable;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("config: {e}");
        }
        anyhow::bail!("invalid configuration ({} problems)", errors.len());
    }

    init_logging(&config.logging);
    let mode = OutputMode::from_json_flag(cli.json);

    match cli.command {
        Commands::Train { symbols, days } => run_train(&config, symbols, days, mode).await,
        Commands::Backtest { symbol, days } => run_backtest(&config, &symbol, days, mode).await,
        Commands::Cycle { watch } => run_cycle_mode(&config, watch, mode).await,
        Commands::Model { symbol } => show_model(&config, &symbol, mode).await,
    }
}

fn simulator(config: &AppConfig) -> (BacktestSimulator, Arc<CsvCandleArchive>) {
    let archive = Arc::new(CsvCandleArchive::new(&config.storage.data_dir));
    let store: Arc<dyn ModelStore> = Arc::new(JsonFileModelStore::new(&config.storage.model_dir));
    let sim = BacktestSimulator::new(
        config.backtest_config(),
        config.engine_pool(),
        archive.clone(),
        store,
    );
    (sim, archive)
}

async fn run_train(
    config: &AppConfig,
    symbols: Vec<String>,
    days: Option<usize>,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let (mut sim, archive) = simulator(config);

    let symbols = if !symbols.is_empty() {
        symbols
    } else if !config.watchlist.is_empty() {
        config.watchlist.clone()
    } else {
        archive.symbols(Timeframe::D1).await?
    };
    if symbols.is_empty() {
        anyhow::bail!("no symbols to train: set a watchlist or add daily archives");
    }

    let days = days.unwrap_or(config.backtest.days);
    info!("Training {} symbols over {} days", symbols.len(), days);
    let summary = sim.train_watchlist(&symbols, days).await;
    cli::print_training_summary(&summary, mode)
}

async fn run_backtest(
    config: &AppConfig,
    symbol: &str,
    days: Option<usize>,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let (mut sim, _) = simulator(config);
    let stats = sim.run(symbol, days.unwrap_or(config.backtest.days)).await;
    cli::print_backtest(&stats, mode)
}

async fn run_cycle_mode(config: &AppConfig, watch: bool, mode: OutputMode) -> anyhow::Result<()> {
    if config.watchlist.is_empty() {
        warn!("Watchlist is empty, cycles will only manage open positions");
    }

    let market: Arc<dyn MarketDataSource> = Arc::new(CsvCandleArchive::new(&config.storage.data_dir));
    let execution = Arc::new(
        PaperExecution::new(config.cycle.paper_balance_usd)
            .with_market(market.clone(), config.strategy.timeframe),
    );
    let store = Arc::new(JsonFileModelStore::new(&config.storage.model_dir));

    let mut controller = LiveCycleController::new(
        config.live_config(),
        config.engine_pool(),
        market,
        execution,
        store,
        Arc::new(LogNotifier::default()),
    );

    if !watch {
        let report = controller.run_cycle().await;
        return cli::print_cycle_report(&report, &controller.open_positions(), mode);
    }

    info!(
        "Paper trading {} symbols every {}s (Ctrl+C to stop)",
        config.watchlist.len(),
        config.cycle.interval_secs
    );
    let mut ticker = tokio::time::interval(Duration::from_secs(config.cycle.interval_secs));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = controller.run_cycle().await;
                if let Err(e) = cli::print_cycle_report(&report, &controller.open_positions(), mode) {
                    error!("Failed to print cycle report: {}", e);
                }
            }
            _ = &mut shutdown => break,
        }
    }

    let open = controller.open_positions().len();
    if open > 0 {
        warn!("Stopping with {} open paper positions", open);
    }
    Ok(())
}

async fn show_model(config: &AppConfig, symbol: &str, mode: OutputMode) -> anyhow::Result<()> {
    let store = JsonFileModelStore::new(&config.storage.model_dir);
    let Some(blob) = store.load_model(symbol, &config.strategy.name).await? else {
        println!("No stored model for {} / {}", symbol, config.strategy.name);
        return Ok(());
    };

    let table = QTable::from_json(&config.learning, &blob)?;
    cli::print_items(&cli::q_rows(&table), mode)?;

    if mode == OutputMode::Table {
        if let Some(perf) = store.strategy_performance(symbol, &config.strategy.name).await? {
            println!(
                "trades: {}  win rate: {:.1}%  p/l ratio: {:.2}",
                perf.total_trades,
                perf.win_rate * 100.0,
                perf.profit_loss_ratio
            );
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging(cfg: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},qtrade=debug", cfg.level)));

    // `tracing_appender::rolling::daily` panics if it can't create the initial
    // log file, so preflight writability.
    let file_layer = cfg.dir.as_deref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                log_dir, e
            );
            return None;
        }

        let test_path = std::path::Path::new(log_dir).join(".qtrade_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                // Daily rotating file appender
                let file_appender = tracing_appender::rolling::daily(log_dir, "qtrade.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // Keep the guard alive for the life of the process
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false) // No color codes in file
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    });

    // Console layer, plain or JSON
    let (plain_layer, json_layer) = if cfg.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain_layer)
        .with(json_layer)
        .with(file_layer)
        .init();
}
