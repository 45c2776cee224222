use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

use common::{AppendOutcome, Candle, EngineState, Error, Result};
use signals::{EvaluationResult, SignalPipeline, Summary};

type History = Vec<(DateTime<Utc>, Option<f64>)>;

/// Counts of how a backfill batch was applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub appended: usize,
    pub replaced: usize,
    pub rejected: usize,
}

enum Request {
    Backfill {
        candles: Vec<Candle>,
        reply: oneshot::Sender<BackfillReport>,
    },
    Append {
        candle: Candle,
        reply: oneshot::Sender<EvaluationResult>,
    },
    History {
        name: String,
        reply: oneshot::Sender<Result<History>>,
    },
    Summary {
        reply: oneshot::Sender<Summary>,
    },
}

/// Cloneable handle passed to the transport tasks and the binary.
#[derive(Clone)]
pub struct EngineHandle {
    request_tx: mpsc::Sender<Request>,
    state: Arc<RwLock<EngineState>>,
}

impl EngineHandle {
    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Apply historical candles oldest first and switch the engine to
    /// `Running`. Live candles queued during warm-up are applied right after.
    pub async fn backfill(&self, candles: Vec<Candle>) -> Result<BackfillReport> {
        self.request(|reply| Request::Backfill { candles, reply }).await
    }

    /// Hand one live candle to the engine. While the engine is warming up the
    /// reply is held back until the backfill has been applied.
    pub async fn append(&self, candle: Candle) -> Result<EvaluationResult> {
        self.request(|reply| Request::Append { candle, reply }).await
    }

    pub async fn indicator_history(&self, name: impl Into<String>) -> Result<History> {
        let name = name.into();
        self.request(|reply| Request::History { name, reply }).await?
    }

    pub async fn summary(&self) -> Result<Summary> {
        self.request(|reply| Request::Summary { reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.request_tx
            .send(build(reply))
            .await
            .map_err(|_| Error::EngineClosed)?;
        rx.await.map_err(|_| Error::EngineClosed)
    }
}

/// Owns the signal pipeline and applies requests strictly in arrival order.
pub struct Engine {
    pipeline: SignalPipeline,
    state: Arc<RwLock<EngineState>>,
    request_rx: mpsc::Receiver<Request>,
    /// Live candles received before the backfill, in arrival order.
    pending: VecDeque<(Candle, oneshot::Sender<EvaluationResult>)>,
}

impl Engine {
    pub fn new(pipeline: SignalPipeline) -> (Self, EngineHandle) {
        let (request_tx, request_rx) = mpsc::channel(128);
        let state = Arc::new(RwLock::new(EngineState::WarmingUp));

        let handle = EngineHandle {
            request_tx,
            state: state.clone(),
        };

        let engine = Engine {
            pipeline,
            state,
            request_rx,
            pending: VecDeque::new(),
        };

        (engine, handle)
    }

    /// Run the engine until every handle is dropped.
    /// Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!("Engine warming up. Waiting for backfill.");

        while let Some(request) = self.request_rx.recv().await {
            match request {
                Request::Backfill { candles, reply } => {
                    let report = self.backfill(candles);
                    *self.state.write().await = EngineState::Running;
                    let _ = reply.send(report);
                    self.drain_pending();
                }

                Request::Append { candle, reply } => {
                    if *self.state.read().await == EngineState::WarmingUp {
                        debug!(opentime = %candle.opentime, "Queueing live candle until backfill completes");
                        self.pending.push_back((candle, reply));
                        continue;
                    }
                    let _ = reply.send(self.pipeline.append(candle));
                }

                Request::History { name, reply } => {
                    let _ = reply.send(self.pipeline.indicator_history(&name));
                }

                Request::Summary { reply } => {
                    let _ = reply.send(self.pipeline.summary());
                }
            }
        }

        warn!("Engine request channel closed, shutting down");
    }

    fn backfill(&mut self, candles: Vec<Candle>) -> BackfillReport {
        let mut report = BackfillReport::default();
        for candle in candles {
            match self.pipeline.append(candle).outcome {
                AppendOutcome::Appended => report.appended += 1,
                AppendOutcome::Replaced => report.replaced += 1,
                AppendOutcome::RejectedOutOfOrder | AppendOutcome::RejectedInvalid => {
                    report.rejected += 1
                }
            }
        }

        let summary = self.pipeline.summary();
        info!(
            appended = report.appended,
            replaced = report.replaced,
            rejected = report.rejected,
            total_weight = summary.total_weight,
            market = %summary.market_state,
            "Backfill applied"
        );
        report
    }

    fn drain_pending(&mut self) {
        if !self.pending.is_empty() {
            info!(count = self.pending.len(), "Applying candles queued during warm-up");
        }
        while let Some((candle, reply)) = self.pending.pop_front() {
            let _ = reply.send(self.pipeline.append(candle));
        }
    }
}
