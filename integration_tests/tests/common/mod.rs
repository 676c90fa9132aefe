#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context};
use garden_runtime::{
    Command, GardenService, Parcel, ParcelBatch, SimulationState, SyncConfig, SyncLoop,
    SyncOutcome, TransportError,
};

/// In-process simulation service. Commands mutate the held state the way the
/// real service does; every call is counted.
#[derive(Default)]
pub struct FakeGarden {
    state: Mutex<SimulationState>,
    parcels: Mutex<Vec<Parcel>>,
    rejected: AtomicUsize,
    status_fetches: AtomicUsize,
    parcel_fetches: AtomicUsize,
    commands: Mutex<Vec<Command>>,
    fail_status: AtomicBool,
    fail_commands: AtomicBool,
    status_delays: Mutex<VecDeque<Duration>>,
}

impl FakeGarden {
    pub fn new(parcels: Vec<Parcel>) -> Arc<Self> {
        let garden = Self::default();
        *garden.parcels.lock().expect("parcels lock") = parcels;
        Arc::new(garden)
    }

    pub fn with_rejected(self: Arc<Self>, rejected: usize) -> Arc<Self> {
        self.rejected.store(rejected, Ordering::SeqCst);
        self
    }

    pub fn status_fetches(&self) -> usize {
        self.status_fetches.load(Ordering::SeqCst)
    }

    pub fn parcel_fetches(&self) -> usize {
        self.parcel_fetches.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().expect("commands lock").clone()
    }

    pub fn state(&self) -> SimulationState {
        *self.state.lock().expect("state lock")
    }

    pub fn set_step(&self, step: u64) {
        self.state.lock().expect("state lock").current_step = step;
    }

    pub fn fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    /// Delay the next status responses, one entry per call.
    pub fn delay_status(&self, delays: impl IntoIterator<Item = Duration>) {
        self.status_delays
            .lock()
            .expect("delay lock")
            .extend(delays);
    }

    fn apply(&self, command: Command) {
        let mut state = self.state.lock().expect("state lock");
        match command {
            Command::Start => state.is_running = true,
            Command::Pause => state.is_running = false,
            Command::Reset => *state = SimulationState::default(),
            Command::Step => state.current_step += 1,
            Command::SetSpeed(speed) => state.speed_multiplier = speed.get(),
        }
    }
}

impl GardenService for FakeGarden {
    async fn fetch_parcels(&self) -> Result<ParcelBatch, TransportError> {
        self.parcel_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(ParcelBatch {
            parcels: self.parcels.lock().expect("parcels lock").clone(),
            rejected: self.rejected.load(Ordering::SeqCst),
        })
    }

    async fn fetch_status(&self) -> Result<SimulationState, TransportError> {
        self.status_fetches.fetch_add(1, Ordering::SeqCst);
        // Snapshot at request time so a delayed answer is an old answer.
        let snapshot = self.state();
        let delay = self.status_delays.lock().expect("delay lock").pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(TransportError::Request {
                endpoint: "simulation/status".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(snapshot)
    }

    async fn execute(&self, command: Command) -> Result<(), TransportError> {
        self.commands.lock().expect("commands lock").push(command);
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                endpoint: "simulation".to_string(),
                status: 500,
                message: "simulation engine unavailable".to_string(),
            });
        }
        self.apply(command);
        Ok(())
    }
}

/// Intervals long enough that only the immediate first tick fires during a test.
pub fn quiet_config() -> SyncConfig {
    SyncConfig {
        status_interval: Duration::from_secs(600),
        parcel_interval: Duration::from_secs(600),
        ..SyncConfig::default()
    }
}

pub const WAIT: Duration = Duration::from_secs(5);

/// Apply outcomes until one matches `pred`, returning it.
pub async fn wait_for<S, F>(sync: &mut SyncLoop<S>, mut pred: F) -> anyhow::Result<SyncOutcome>
where
    S: GardenService,
    F: FnMut(&SyncOutcome) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let outcome = sync
                .next_outcome()
                .await
                .ok_or_else(|| anyhow!("sync channel closed"))?;
            if pred(&outcome) {
                return Ok::<_, anyhow::Error>(outcome);
            }
        }
    })
    .await
    .context("timed out waiting for sync outcome")?
}

/// Wait until both halves of the first poll have been applied.
pub async fn wait_for_initial_sync<S: GardenService>(sync: &mut SyncLoop<S>) -> anyhow::Result<()> {
    tokio::time::timeout(WAIT, async {
        while sync.cache().status().is_none() || sync.cache().is_loading() {
            sync.next_outcome()
                .await
                .ok_or_else(|| anyhow!("sync channel closed"))?;
        }
        Ok::<_, anyhow::Error>(())
    })
    .await
    .context("timed out waiting for initial sync")?
}

/// Poll `cond` until it holds or the wait budget runs out.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> anyhow::Result<()> {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .context("condition never held")
}
