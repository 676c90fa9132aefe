//! Shared runtime for the garden dashboard.
//!
//! Re-exports the data contracts from `garden_schema` and adds the pieces that
//! operate on them without any terminal or HTTP dependency: command gating,
//! the text command parser, the parcel grid projector and the polling sync
//! loop that keeps a local cache in step with the remote service.

pub use garden_schema::*;

mod command_text;
mod commands;
pub mod grid;
mod service;
pub mod sync;

pub use command_text::{parse_command_line, CommandParseError};
pub use commands::{
    Command, CommandRejected, SpeedError, SpeedMultiplier, DEFAULT_SPEED, MAX_SPEED, MIN_SPEED,
    SPEED_STEP,
};
pub use grid::{
    project_parcels, GridAddress, GridBounds, GridCell, GridError, GridProjector, ParcelGrid,
    DEFAULT_MAX_CELLS,
};
pub use service::{GardenService, TransportError};
pub use sync::{
    DispatchError, FetchTarget, RefreshCause, SyncCache, SyncConfig, SyncConfigError, SyncLoop,
    SyncOutcome,
};
