//! Position monitor.
//!
//! Ticks at a fixed interval, runs the profit engine over every open
//! position, and persists the store after each cycle. Returns once no
//! positions remain or the cancellation token fires; in the latter case the
//! store is saved before returning.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument, Span};

use super::profit::{CycleReport, ProfitEngine};
use crate::storage::{PositionRepository, PositionStore};

/// Shorter intervals are allowed but risk aggregator throttling.
pub const MIN_RECOMMENDED_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Evaluating,
}

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// Every position was closed.
    Drained,
    Cancelled,
}

pub struct MonitorLoop {
    engine: Arc<ProfitEngine>,
    repo: Arc<dyn PositionRepository>,
    interval: Duration,
    state: MonitorState,
    cycles: u64,
    span: Span,
}

impl MonitorLoop {
    pub fn new(engine: Arc<ProfitEngine>, repo: Arc<dyn PositionRepository>, interval: Duration) -> Self {
        if interval < MIN_RECOMMENDED_INTERVAL {
            warn!(
                interval_secs = interval.as_secs(),
                recommended_secs = MIN_RECOMMENDED_INTERVAL.as_secs(),
                "Check interval below recommended minimum"
            );
        }
        Self {
            engine,
            repo,
            interval,
            state: MonitorState::Idle,
            cycles: 0,
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Completed cycles since construction.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Monitor `store` until it drains or `cancel` fires.
    pub async fn run(&mut self, store: &mut PositionStore, cancel: &CancellationToken) -> MonitorExit {
        let span = self.span.clone();
        self.run_inner(store, cancel).instrument(span).await
    }

    async fn run_inner(&mut self, store: &mut PositionStore, cancel: &CancellationToken) -> MonitorExit {
        if store.is_empty() {
            info!("No open positions to monitor");
            return MonitorExit::Drained;
        }

        info!(
            positions = store.len(),
            interval_secs = self.interval.as_secs(),
            "Monitoring started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Shutdown requested, saving positions");
                    self.persist(store);
                    return MonitorExit::Cancelled;
                }
                _ = ticker.tick() => {}
            }

            let report = self.run_cycle(store, cancel).await;

            if report.cancelled {
                info!("Cycle interrupted by shutdown");
                return MonitorExit::Cancelled;
            }
            if store.is_empty() {
                info!(cycles = self.cycles, "All positions closed, monitor exiting");
                return MonitorExit::Drained;
            }
        }
    }

    /// One Idle → Evaluating → Idle transition, persisting at the end.
    pub async fn run_cycle(&mut self, store: &mut PositionStore, cancel: &CancellationToken) -> CycleReport {
        self.state = MonitorState::Evaluating;
        self.cycles += 1;
        info!(cycle = self.cycles, positions = store.len(), "Starting cycle");

        let report = self.engine.evaluate_all_positions(store, cancel).await;
        log_cycle_report(self.cycles, &report, store.len());

        self.persist(store);
        self.state = MonitorState::Idle;
        report
    }

    fn persist(&self, store: &PositionStore) {
        if let Err(e) = store.save(self.repo.as_ref()) {
            error!(error = %e, "Failed to save positions");
        }
    }
}

fn log_cycle_report(cycle: u64, report: &CycleReport, open: usize) {
    info!(
        cycle,
        evaluated = report.evaluated,
        sells = report.sells,
        failed = report.failed_sells,
        closed = report.closed.len(),
        open,
        at = %report.timestamp.format("%H:%M:%S"),
        "Cycle complete"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
