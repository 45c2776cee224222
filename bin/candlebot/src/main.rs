use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Candle, Config, MarketDataSource};
use engine::{BinanceRest, BinanceStream, Engine};
use signals::{EvaluationResult, SignalConfig, SignalPipeline};

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().unwrap_or_else(|e| panic!("Invalid configuration: {e}"));
    info!(
        pair = %cfg.pair,
        interval = %cfg.interval,
        heikin_ashi = cfg.heikin_ashi,
        "Candlebot starting"
    );

    let signal_cfg = SignalConfig::load_or_default(&cfg.signal_config_path)
        .unwrap_or_else(|e| panic!("Failed to load signal config: {e}"));

    // ── Engine ────────────────────────────────────────────────────────────────
    let pipeline = SignalPipeline::new(&signal_cfg, cfg.heikin_ashi)
        .unwrap_or_else(|e| panic!("Invalid indicator set: {e}"));
    info!(
        indicators = pipeline.indicators().specs().len(),
        rules = pipeline.rules().len(),
        "Signal pipeline ready"
    );

    let (engine, handle) = Engine::new(pipeline);
    tokio::spawn(engine.run());

    // ── Live stream ───────────────────────────────────────────────────────────
    // Started before the backfill; the engine holds live candles until the
    // history has been applied.
    let (candle_tx, mut candle_rx) = mpsc::channel::<Candle>(256);
    tokio::spawn(BinanceStream::new(cfg.pair.clone(), cfg.interval.clone(), candle_tx).run());

    let live_handle = handle.clone();
    let pair = cfg.pair.clone();
    tokio::spawn(async move {
        while let Some(candle) = candle_rx.recv().await {
            match live_handle.append(candle).await {
                Ok(result) => report(&pair, &result),
                Err(e) => {
                    warn!(error = %e, "Engine stopped, dropping live stream");
                    break;
                }
            }
        }
    });

    // ── Backfill ──────────────────────────────────────────────────────────────
    let rest = BinanceRest::new().unwrap_or_else(|e| panic!("Failed to build REST client: {e}"));
    let history = match rest
        .historical_candles(&cfg.pair, &cfg.interval, cfg.backfill_limit)
        .await
    {
        Ok(candles) => candles,
        Err(e) => {
            warn!(error = %e, "Backfill failed, starting from an empty series");
            Vec::new()
        }
    };
    let fetched = history.len();
    let backfill = handle
        .backfill(history)
        .await
        .unwrap_or_else(|e| panic!("Engine rejected backfill: {e}"));
    info!(
        fetched,
        appended = backfill.appended,
        replaced = backfill.replaced,
        rejected = backfill.rejected,
        "Warm-up complete, evaluating live candles"
    );

    // Keep main alive
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received. Exiting.");
}

/// Log one evaluation: every active condition, then the verdict.
fn report(pair: &str, result: &EvaluationResult) {
    if !result.outcome.is_applied() {
        return;
    }
    let opentime = result.snapshot.as_ref().map(|s| s.opentime);

    if result.active_conditions.is_empty() {
        info!(%pair, ?opentime, "No signals");
        return;
    }

    for condition in &result.active_conditions {
        info!(
            %pair,
            condition = %condition.name,
            action = %condition.action,
            weight = condition.weight,
            value = condition.observed_value,
            "{}",
            condition.description
        );
    }
    info!(
        %pair,
        ?opentime,
        changes = result.deltas.len(),
        total_weight = result.total_weight,
        market = %result.market_state,
        "Market is {}",
        result.market_state
    );
}
