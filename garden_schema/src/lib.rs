//! Data contracts published by the remote garden simulation service.
//!
//! Records here are read-only snapshots: the service owns them and the
//! dashboard replaces its copy wholesale on every poll. Raw JSON enters through
//! [`decode_parcels_json`] / [`decode_status_json`], which normalize the
//! service's inconsistent field spellings before anything else sees them.

use std::fmt;

use serde::{Deserialize, Serialize};

mod wire;

pub use wire::{
    decode_error_body, decode_parcels_json, decode_parcels_value, decode_status_json,
    normalize_parcel, CoordinateError, ErrorBody, ParcelBatch, WireError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParcelId(pub i64);

impl fmt::Display for ParcelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer position of a parcel in garden space. Not necessarily zero based
/// or contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParcelCoord {
    pub x: i32,
    pub y: i32,
}

impl ParcelCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for ParcelCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub id: ParcelId,
    /// `None` when the service sent no usable coordinate pair.
    pub coord: Option<ParcelCoord>,
    pub humidity_level: Option<f64>,
    pub plants: Vec<Plant>,
    pub insects: Vec<Insect>,
    pub treatment_device: Option<TreatmentDevice>,
}

impl Parcel {
    pub fn new(id: i64, coord: Option<ParcelCoord>) -> Self {
        Self {
            id: ParcelId(id),
            coord,
            humidity_level: None,
            plants: Vec::new(),
            insects: Vec::new(),
            treatment_device: None,
        }
    }

    pub fn at(id: i64, x: i32, y: i32) -> Self {
        Self::new(id, Some(ParcelCoord::new(x, y)))
    }

    pub fn with_humidity(mut self, humidity: f64) -> Self {
        self.humidity_level = Some(humidity);
        self
    }

    pub fn coord(&self) -> Option<ParcelCoord> {
        self.coord
    }

    pub fn plant_count(&self) -> usize {
        self.plants.len()
    }

    pub fn insect_count(&self) -> usize {
        self.insects.len()
    }

    /// Humidity rounded to a whole percentage for display.
    pub fn humidity_percent(&self) -> Option<i64> {
        self.humidity_level
            .filter(|value| value.is_finite())
            .map(|value| value.round() as i64)
    }

    pub fn humidity_band(&self) -> Option<HumidityBand> {
        self.humidity_level
            .filter(|value| value.is_finite())
            .map(HumidityBand::classify)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HumidityBand {
    Parched,
    Dry,
    Moist,
    Saturated,
}

impl HumidityBand {
    pub fn classify(humidity: f64) -> Self {
        if humidity < 25.0 {
            HumidityBand::Parched
        } else if humidity < 50.0 {
            HumidityBand::Dry
        } else if humidity < 75.0 {
            HumidityBand::Moist
        } else {
            HumidityBand::Saturated
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HumidityBand::Parched => "parched",
            HumidityBand::Dry => "dry",
            HumidityBand::Moist => "moist",
            HumidityBand::Saturated => "saturated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Plant {
    pub id: Option<i64>,
    pub species: String,
    pub current_age: i32,
    pub maturity_age: i32,
    pub is_runner: bool,
    pub colonization_probability: Option<f64>,
    pub parcel_id: Option<i64>,
}

impl Plant {
    pub fn is_mature(&self) -> bool {
        self.current_age >= self.maturity_age
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Insect {
    pub id: Option<i64>,
    pub species: String,
    pub sex: String,
    pub health_index: i32,
    pub mobility: f64,
    pub insecticide_resistance: f64,
    pub steps_without_food: i32,
    pub parcel_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreatmentDevice {
    pub id: Option<i64>,
    pub radius: i32,
    pub programs: Vec<TreatmentProgram>,
    pub parcel_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreatmentProgram {
    pub id: Option<i64>,
    pub start_time: i32,
    pub duration: i32,
    #[serde(rename = "type")]
    pub kind: Option<TreatmentType>,
    pub device_id: Option<i64>,
}

impl TreatmentProgram {
    pub fn is_active_at(&self, step: u64) -> bool {
        let start = i64::from(self.start_time);
        let end = start + i64::from(self.duration.max(0));
        let step = step as i64;
        step >= start && step < end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TreatmentType {
    Water,
    Insecticide,
    Fertilizer,
}

impl TreatmentType {
    pub fn label(self) -> &'static str {
        match self {
            TreatmentType::Water => "water",
            TreatmentType::Insecticide => "insecticide",
            TreatmentType::Fertilizer => "fertilizer",
        }
    }
}

/// Authoritative simulation status as last reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationState {
    pub current_step: u64,
    #[serde(alias = "running")]
    pub is_running: bool,
    pub speed_multiplier: f64,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self {
            current_step: 0,
            is_running: false,
            speed_multiplier: 1.0,
        }
    }
}

impl SimulationState {
    pub fn status_label(&self) -> &'static str {
        if self.is_running {
            "Running"
        } else {
            "Paused"
        }
    }
}
