use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::{Command, ParcelBatch, SimulationState, WireError};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },
    #[error("{endpoint} responded with status {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("could not decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: WireError,
    },
}

impl TransportError {
    pub fn endpoint(&self) -> &str {
        match self {
            TransportError::Request { endpoint, .. }
            | TransportError::Status { endpoint, .. }
            | TransportError::Decode { endpoint, .. } => endpoint,
        }
    }
}

/// The five operations the dashboard needs from the simulation service.
///
/// Implementations own timeouts and wire encoding; the sync loop only relies
/// on each call eventually resolving.
pub trait GardenService: Send + Sync + 'static {
    fn fetch_parcels(&self) -> impl Future<Output = Result<ParcelBatch, TransportError>> + Send;

    fn fetch_status(&self) -> impl Future<Output = Result<SimulationState, TransportError>> + Send;

    fn execute(&self, command: Command) -> impl Future<Output = Result<(), TransportError>> + Send;
}

impl<T: GardenService> GardenService for Arc<T> {
    fn fetch_parcels(&self) -> impl Future<Output = Result<ParcelBatch, TransportError>> + Send {
        (**self).fetch_parcels()
    }

    fn fetch_status(&self) -> impl Future<Output = Result<SimulationState, TransportError>> + Send {
        (**self).fetch_status()
    }

    fn execute(&self, command: Command) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).execute(command)
    }
}
