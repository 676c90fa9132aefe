use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::{Insect, Parcel, ParcelCoord, ParcelId, Plant, SimulationState, TreatmentDevice};

// Bean-style getters for `xCoordinate` serialize as `xcoordinate`; older
// builds of the service emit the camel-case spelling instead.
const X_FIELDS: [&str; 2] = ["xcoordinate", "xCoordinate"];
const Y_FIELDS: [&str; 2] = ["ycoordinate", "yCoordinate"];

#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to parse payload: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("expected a JSON array of parcels, found {found}")]
    NotAnArray { found: &'static str },
    #[error("parcel record is not an object (found {found})")]
    NotAnObject { found: &'static str },
    #[error("parcel record has no usable id")]
    MissingId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    #[error("neither {0} nor {1} is present")]
    Missing(&'static str, &'static str),
    #[error("{field} is not a number: {value}")]
    NotNumeric { field: &'static str, value: String },
    #[error("{field} is not an integer: {value}")]
    Fractional { field: &'static str, value: String },
    #[error("{field} is outside the i32 range: {value}")]
    OutOfRange { field: &'static str, value: String },
}

/// Result of ingesting one parcel listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParcelBatch {
    pub parcels: Vec<Parcel>,
    /// Records dropped entirely (not an object, or no id).
    pub rejected: usize,
}

impl ParcelBatch {
    pub fn malformed_coordinates(&self) -> usize {
        self.parcels
            .iter()
            .filter(|parcel| parcel.coord.is_none())
            .count()
    }
}

/// Error body returned by the service alongside non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

pub fn decode_error_body(data: &str) -> Option<ErrorBody> {
    serde_json::from_str(data).ok()
}

pub fn decode_status_json(data: &str) -> Result<SimulationState, WireError> {
    Ok(serde_json::from_str(data)?)
}

pub fn decode_parcels_json(data: &str) -> Result<ParcelBatch, WireError> {
    let value: Value = serde_json::from_str(data)?;
    decode_parcels_value(value)
}

pub fn decode_parcels_value(value: Value) -> Result<ParcelBatch, WireError> {
    let records = match value {
        Value::Array(records) => records,
        other => {
            return Err(WireError::NotAnArray {
                found: kind_of(&other),
            })
        }
    };

    let mut batch = ParcelBatch {
        parcels: Vec::with_capacity(records.len()),
        rejected: 0,
    };
    for (index, record) in records.iter().enumerate() {
        match normalize_parcel(record) {
            Ok(parcel) => batch.parcels.push(parcel),
            Err(err) => {
                warn!(
                    target: "garden::wire",
                    index,
                    error = %err,
                    "parcel.rejected"
                );
                batch.rejected += 1;
            }
        }
    }
    Ok(batch)
}

/// Convert one raw parcel record into a [`Parcel`].
///
/// Only a missing object shape or id rejects the record. Bad coordinates leave
/// `coord` empty (and are logged) so the parcel still counts in the snapshot.
pub fn normalize_parcel(record: &Value) -> Result<Parcel, WireError> {
    let object = record.as_object().ok_or(WireError::NotAnObject {
        found: kind_of(record),
    })?;
    let id = object
        .get("id")
        .and_then(Value::as_i64)
        .map(ParcelId)
        .ok_or(WireError::MissingId)?;

    let coord = match (
        read_coordinate(object, X_FIELDS),
        read_coordinate(object, Y_FIELDS),
    ) {
        (Ok(x), Ok(y)) => Some(ParcelCoord::new(x, y)),
        (x, y) => {
            for err in [x.err(), y.err()].into_iter().flatten() {
                warn!(
                    target: "garden::wire",
                    parcel = %id,
                    error = %err,
                    "parcel.coordinate_malformed"
                );
            }
            None
        }
    };

    let humidity_level = object.get("humidityLevel").and_then(Value::as_f64);

    Ok(Parcel {
        id,
        coord,
        humidity_level,
        plants: read_list::<Plant>(object, "plants", id),
        insects: read_list::<Insect>(object, "insects", id),
        treatment_device: read_optional::<TreatmentDevice>(object, "treatmentDevice", id),
    })
}

fn read_coordinate(
    object: &Map<String, Value>,
    fields: [&'static str; 2],
) -> Result<i32, CoordinateError> {
    let (field, value) = fields
        .iter()
        .find_map(|field| match object.get(*field) {
            Some(Value::Null) | None => None,
            Some(value) => Some((*field, value)),
        })
        .ok_or(CoordinateError::Missing(fields[0], fields[1]))?;

    let number = match value {
        Value::Number(number) => number,
        other => {
            return Err(CoordinateError::NotNumeric {
                field,
                value: other.to_string(),
            })
        }
    };

    if let Some(integer) = number.as_i64() {
        return i32::try_from(integer).map_err(|_| CoordinateError::OutOfRange {
            field,
            value: integer.to_string(),
        });
    }

    let float = number.as_f64().unwrap_or(f64::NAN);
    if !float.is_finite() || float.fract() != 0.0 {
        return Err(CoordinateError::Fractional {
            field,
            value: number.to_string(),
        });
    }
    if float < f64::from(i32::MIN) || float > f64::from(i32::MAX) {
        return Err(CoordinateError::OutOfRange {
            field,
            value: number.to_string(),
        });
    }
    Ok(float as i32)
}

fn read_list<T: DeserializeOwned>(
    object: &Map<String, Value>,
    field: &'static str,
    parcel: ParcelId,
) -> Vec<T> {
    match object.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|err| {
            warn!(
                target: "garden::wire",
                %parcel,
                field,
                error = %err,
                "parcel.nested_list_malformed"
            );
            Vec::new()
        }),
    }
}

fn read_optional<T: DeserializeOwned>(
    object: &Map<String, Value>,
    field: &'static str,
    parcel: ParcelId,
) -> Option<T> {
    match object.get(field) {
        None | Some(Value::Null) => None,
        Some(value) => match serde_json::from_value(value.clone()) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(
                    target: "garden::wire",
                    %parcel,
                    field,
                    error = %err,
                    "parcel.nested_record_malformed"
                );
                None
            }
        },
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
