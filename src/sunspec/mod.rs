pub mod decoder;
pub mod models;
pub mod point;

use crate::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

pub use decoder::{decode, encode_point};
pub use models::{ModelDefinition, ModelRegistry};
pub use point::{Access, DataType, PointDefinition, PointValue};

pub type PointMap = BTreeMap<String, PointValue>;

/// Model ID of the SunSpec Common block, which carries device identity.
pub const COMMON_MODEL_ID: u16 = 1;

/// A model block present on the connected device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ModelInstance {
    pub model_id: u16,
    /// Address of the first register after the model's ID/length header.
    pub start_offset: u16,
    pub length: u16,
}

/// Decoded values of one model, captured at a single read.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelSnapshot {
    pub model_id: u16,
    pub model_name: String,
    pub points: PointMap,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<PointMap>,
    pub captured_at: DateTime<Utc>,
}

impl ModelSnapshot {
    pub fn point(&self, name: &str) -> Option<&PointValue> {
        self.points.get(name)
    }

    fn text(&self, name: &str) -> Option<String> {
        self.point(name).and_then(PointValue::as_str).map(str::to_string)
    }
}

// DeviceInfo {{{
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub options: Option<String>,
    pub device_address: Option<u16>,
}

impl DeviceInfo {
    /// Builds device identity from a Common model snapshot.
    pub fn from_common(snapshot: &ModelSnapshot) -> Result<Self> {
        if snapshot.model_id != COMMON_MODEL_ID {
            return Err(Error::Decode {
                model_id: snapshot.model_id,
                point: "Mn".to_string(),
                reason: "device info needs the Common model".to_string(),
            });
        }

        Ok(Self {
            manufacturer: snapshot.text("Mn"),
            model: snapshot.text("Md"),
            serial_number: snapshot.text("SN"),
            firmware_version: snapshot.text("Vr"),
            options: snapshot.text("Opt"),
            device_address: snapshot
                .point("DA")
                .and_then(PointValue::as_i64)
                .and_then(|v| u16::try_from(v).ok()),
        })
    }
} // }}}
