//! Polling loop that keeps a local cache of the remote simulation.
//!
//! The owner creates a [`SyncLoop`] when its view appears and drops (or
//! [`SyncLoop::shutdown`]s) it when the view goes away. Network work runs on
//! spawned tokio tasks that report back over a channel; the owner applies
//! those reports with [`SyncLoop::drain`] or [`SyncLoop::next_outcome`], so
//! the cache is only ever touched from one place and always replaced whole.
//!
//! Every fetch is an independent task: a slow response never delays the next
//! tick, and responses may arrive out of order. Each response carries the
//! sequence number it was requested under so the cache can tell when an older
//! answer lands after a newer one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::grid::{GridError, GridProjector, ParcelGrid, DEFAULT_MAX_CELLS};
use crate::{
    Command, CommandRejected, GardenService, Parcel, ParcelBatch, SimulationState, TransportError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchTarget {
    Status,
    Parcels,
}

impl FetchTarget {
    pub fn label(self) -> &'static str {
        match self {
            FetchTarget::Status => "status",
            FetchTarget::Parcels => "parcels",
        }
    }
}

/// Why a fetch was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshCause {
    Poll,
    /// Follow-up after a dispatched command completed.
    Command,
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub status_interval: Duration,
    pub parcel_interval: Duration,
    /// Drop responses older than the newest one already applied for the same
    /// target. Off by default: responses apply in arrival order.
    pub discard_stale_responses: bool,
    pub max_grid_cells: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(1),
            parcel_interval: Duration::from_secs(5),
            discard_stale_responses: false,
            max_grid_cells: DEFAULT_MAX_CELLS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncConfigError {
    #[error("{0} interval must be greater than zero")]
    ZeroInterval(&'static str),
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), SyncConfigError> {
        if self.status_interval.is_zero() {
            return Err(SyncConfigError::ZeroInterval("status"));
        }
        if self.parcel_interval.is_zero() {
            return Err(SyncConfigError::ZeroInterval("parcel"));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Rejected(#[from] CommandRejected),
    #[error("sync loop has been shut down")]
    Closed,
}

#[derive(Debug)]
enum SyncEvent {
    Status {
        seq: u64,
        cause: RefreshCause,
        state: SimulationState,
    },
    Parcels {
        seq: u64,
        cause: RefreshCause,
        batch: ParcelBatch,
    },
    FetchFailed {
        cause: RefreshCause,
        target: FetchTarget,
        error: TransportError,
    },
    CommandCompleted {
        command: Command,
        result: Result<(), TransportError>,
    },
}

/// What applying one report did to the cache.
#[derive(Debug)]
pub enum SyncOutcome {
    StatusUpdated {
        cause: RefreshCause,
    },
    ParcelsUpdated {
        cause: RefreshCause,
        parcels: usize,
    },
    StaleDiscarded {
        target: FetchTarget,
    },
    FetchFailed {
        target: FetchTarget,
        cause: RefreshCause,
        error: TransportError,
    },
    CommandSucceeded(Command),
    CommandFailed {
        command: Command,
        error: TransportError,
    },
}

/// Last known remote state. Values are replaced, never edited.
#[derive(Debug, Default)]
pub struct SyncCache {
    status: Option<SimulationState>,
    parcels: Option<Arc<[Parcel]>>,
    grid: Option<Result<ParcelGrid, GridError>>,
    rejected_records: usize,
    status_error: Option<String>,
    parcels_error: Option<String>,
    status_seq: Option<u64>,
    parcels_seq: Option<u64>,
    stale_overwrites: u64,
}

impl SyncCache {
    pub fn status(&self) -> Option<&SimulationState> {
        self.status.as_ref()
    }

    /// `None` until the first parcel snapshot arrives.
    pub fn parcels(&self) -> Option<&[Parcel]> {
        self.parcels.as_deref()
    }

    pub fn grid(&self) -> Option<Result<&ParcelGrid, &GridError>> {
        self.grid.as_ref().map(Result::as_ref)
    }

    pub fn is_loading(&self) -> bool {
        self.parcels.is_none()
    }

    /// Records the service sent that could not be read as parcels at all.
    pub fn rejected_records(&self) -> usize {
        self.rejected_records
    }

    /// Most recent fetch failure for `target`, cleared by the next success.
    pub fn last_error(&self, target: FetchTarget) -> Option<&str> {
        match target {
            FetchTarget::Status => self.status_error.as_deref(),
            FetchTarget::Parcels => self.parcels_error.as_deref(),
        }
    }

    /// Responses applied after a newer one for the same target.
    pub fn stale_overwrites(&self) -> u64 {
        self.stale_overwrites
    }

    fn admit(&mut self, target: FetchTarget, seq: u64, discard_stale: bool) -> bool {
        let last = match target {
            FetchTarget::Status => &mut self.status_seq,
            FetchTarget::Parcels => &mut self.parcels_seq,
        };
        match *last {
            Some(applied) if seq < applied => {
                if discard_stale {
                    debug!(
                        target: "garden::sync",
                        fetch = target.label(),
                        seq,
                        applied,
                        "sync.stale_discarded"
                    );
                    return false;
                }
                self.stale_overwrites += 1;
                debug!(
                    target: "garden::sync",
                    fetch = target.label(),
                    seq,
                    applied,
                    "sync.stale_applied"
                );
            }
            _ => *last = Some(seq),
        }
        true
    }
}

struct Shared<S> {
    service: S,
    sender: UnboundedSender<SyncEvent>,
    next_seq: AtomicU64,
    closed: AtomicBool,
}

impl<S: GardenService> Shared<S> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn publish(&self, event: SyncEvent) {
        if self.sender.send(event).is_err() {
            trace!(target: "garden::sync", "sync.event_dropped");
        }
    }

    fn spawn_fetch(self: &Arc<Self>, target: FetchTarget, cause: RefreshCause) {
        if self.is_closed() {
            return;
        }
        let seq = self.next_seq();
        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.fetch(seq, target, cause).await });
    }

    async fn fetch(&self, seq: u64, target: FetchTarget, cause: RefreshCause) {
        if self.is_closed() {
            return;
        }
        trace!(target: "garden::sync", fetch = target.label(), seq, ?cause, "sync.fetch");
        let event = match target {
            FetchTarget::Status => match self.service.fetch_status().await {
                Ok(state) => SyncEvent::Status { seq, cause, state },
                Err(error) => SyncEvent::FetchFailed {
                    cause,
                    target,
                    error,
                },
            },
            FetchTarget::Parcels => match self.service.fetch_parcels().await {
                Ok(batch) => SyncEvent::Parcels { seq, cause, batch },
                Err(error) => SyncEvent::FetchFailed {
                    cause,
                    target,
                    error,
                },
            },
        };
        self.publish(event);
    }
}

async fn run_poll_loop<S: GardenService>(
    shared: Arc<Shared<S>>,
    status_every: Duration,
    parcels_every: Duration,
) {
    // First tick of each interval fires immediately.
    let mut status_ticker = tokio::time::interval(status_every);
    let mut parcel_ticker = tokio::time::interval(parcels_every);
    status_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    parcel_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = status_ticker.tick() => shared.spawn_fetch(FetchTarget::Status, RefreshCause::Poll),
            _ = parcel_ticker.tick() => shared.spawn_fetch(FetchTarget::Parcels, RefreshCause::Poll),
        }
    }
}

pub struct SyncLoop<S: GardenService> {
    shared: Arc<Shared<S>>,
    receiver: UnboundedReceiver<SyncEvent>,
    cache: SyncCache,
    projector: GridProjector,
    config: SyncConfig,
    poll_task: Option<JoinHandle<()>>,
}

impl<S: GardenService> SyncLoop<S> {
    /// Start polling `service`. Status and parcels are fetched right away and
    /// then on their configured periods.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start(service: S, config: SyncConfig) -> Result<Self, SyncConfigError> {
        config.validate()?;
        let (sender, receiver) = unbounded_channel();
        let shared = Arc::new(Shared {
            service,
            sender,
            next_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        let poll_task = tokio::spawn(run_poll_loop(
            Arc::clone(&shared),
            config.status_interval,
            config.parcel_interval,
        ));
        info!(
            target: "garden::sync",
            status_interval_ms = config.status_interval.as_millis() as u64,
            parcel_interval_ms = config.parcel_interval.as_millis() as u64,
            discard_stale = config.discard_stale_responses,
            "sync.started"
        );

        Ok(Self {
            shared,
            receiver,
            cache: SyncCache::default(),
            projector: GridProjector::with_max_cells(config.max_grid_cells),
            config,
            poll_task: Some(poll_task),
        })
    }

    pub fn cache(&self) -> &SyncCache {
        &self.cache
    }

    pub fn status(&self) -> Option<&SimulationState> {
        self.cache.status()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn is_enabled(&self, command: Command) -> bool {
        command.is_enabled(self.cache.status())
    }

    /// Send `command` if the cached status allows it. Once the service answers
    /// (successfully or not) one extra status fetch is issued; the result of
    /// both arrives through [`drain`](Self::drain).
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn dispatch(&self, command: Command) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        if let Err(rejected) = command.check(self.cache.status()) {
            debug!(
                target: "garden::sync",
                command = %command,
                reason = %rejected,
                "command.rejected"
            );
            return Err(rejected.into());
        }

        info!(target: "garden::sync", command = %command, "command.dispatched");
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let result = shared.service.execute(command).await;
            shared.publish(SyncEvent::CommandCompleted { command, result });
            let seq = shared.next_seq();
            shared
                .fetch(seq, FetchTarget::Status, RefreshCause::Command)
                .await;
        });
        Ok(())
    }

    /// Out-of-band fetch outside the polling cadence.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn refresh(&self, target: FetchTarget) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        self.shared.spawn_fetch(target, RefreshCause::Manual);
        Ok(())
    }

    /// Apply every report that has arrived so far without waiting.
    pub fn drain(&mut self) -> Vec<SyncOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            outcomes.push(self.apply(event));
        }
        outcomes
    }

    /// Wait for the next report and apply it.
    pub async fn next_outcome(&mut self) -> Option<SyncOutcome> {
        let event = self.receiver.recv().await?;
        Some(self.apply(event))
    }

    /// Stop polling. Requests already in flight finish, but no new fetch is
    /// started and later dispatches fail with [`DispatchError::Closed`].
    pub fn shutdown(&mut self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        info!(target: "garden::sync", "sync.stopped");
    }

    fn apply(&mut self, event: SyncEvent) -> SyncOutcome {
        let discard_stale = self.config.discard_stale_responses;
        match event {
            SyncEvent::Status { seq, cause, state } => {
                if !self.cache.admit(FetchTarget::Status, seq, discard_stale) {
                    return SyncOutcome::StaleDiscarded {
                        target: FetchTarget::Status,
                    };
                }
                trace!(
                    target: "garden::sync",
                    step = state.current_step,
                    running = state.is_running,
                    speed = state.speed_multiplier,
                    "sync.status_applied"
                );
                self.cache.status = Some(state);
                self.cache.status_error = None;
                SyncOutcome::StatusUpdated { cause }
            }
            SyncEvent::Parcels { seq, cause, batch } => {
                if !self.cache.admit(FetchTarget::Parcels, seq, discard_stale) {
                    return SyncOutcome::StaleDiscarded {
                        target: FetchTarget::Parcels,
                    };
                }
                let ParcelBatch { parcels, rejected } = batch;
                let count = parcels.len();
                let parcels: Arc<[Parcel]> = parcels.into();
                let grid = self.projector.project(Arc::clone(&parcels));
                match &grid {
                    Ok(grid) => debug!(
                        target: "garden::sync",
                        parcels = count,
                        rejected,
                        excluded = grid.excluded_count(),
                        duplicates = grid.duplicate_count(),
                        columns = grid.columns(),
                        rows = grid.rows(),
                        "sync.parcels_applied"
                    ),
                    Err(err) => warn!(
                        target: "garden::sync",
                        parcels = count,
                        error = %err,
                        "grid.projection_failed"
                    ),
                }
                self.cache.parcels = Some(parcels);
                self.cache.grid = Some(grid);
                self.cache.rejected_records = rejected;
                self.cache.parcels_error = None;
                SyncOutcome::ParcelsUpdated {
                    cause,
                    parcels: count,
                }
            }
            SyncEvent::FetchFailed {
                cause,
                target,
                error,
            } => {
                warn!(
                    target: "garden::sync",
                    fetch = target.label(),
                    ?cause,
                    error = %error,
                    "sync.fetch_failed"
                );
                let message = Some(error.to_string());
                match target {
                    FetchTarget::Status => self.cache.status_error = message,
                    FetchTarget::Parcels => self.cache.parcels_error = message,
                }
                SyncOutcome::FetchFailed {
                    target,
                    cause,
                    error,
                }
            }
            SyncEvent::CommandCompleted { command, result } => match result {
                Ok(()) => {
                    info!(target: "garden::sync", command = %command, "command.completed");
                    SyncOutcome::CommandSucceeded(command)
                }
                Err(error) => {
                    warn!(
                        target: "garden::sync",
                        command = %command,
                        error = %error,
                        "command.failed"
                    );
                    SyncOutcome::CommandFailed { command, error }
                }
            },
        }
    }
}

impl<S: GardenService> Drop for SyncLoop<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
