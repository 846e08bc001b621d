use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::{deserialize_amount, deserialize_timestamp_option, Document};
use crate::errors::RideError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Remarks {
    pub brake_condition: String,
    pub tyre_pressure: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Defects {
    pub airbags: bool,
    pub brakes: bool,
    pub clutch: bool,
    pub horns: bool,
    pub indicators: bool,
    pub oil: bool,
    pub physical_damage: bool,
    pub tyre_pressure: bool,
}

impl Defects {
    pub fn count(&self) -> usize {
        [
            self.airbags,
            self.brakes,
            self.clutch,
            self.horns,
            self.indicators,
            self.oil,
            self.physical_damage,
            self.tyre_pressure,
        ]
        .iter()
        .filter(|flag| **flag)
        .count()
    }
}

/// Checklist snapshot taken before or after a trip. `mileage` is only filled
/// in on post-trip inspections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    #[serde(default)]
    pub remarks: Remarks,
    #[serde(default)]
    pub defects: Defects,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp_option")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "deserialize_mileage",
        skip_serializing_if = "Option::is_none"
    )]
    pub mileage: Option<f64>,
}

fn deserialize_mileage<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_amount(deserializer).map(Some)
}

impl Inspection {
    pub fn from_document(doc: &Document) -> Result<Self, RideError> {
        doc.decode::<Inspection>()
            .map_err(|e| RideError::decode("inspection", &doc.id, e))
    }

    pub fn defect_count(&self) -> usize {
        self.defects.count()
    }

    pub fn has_defects(&self) -> bool {
        self.defect_count() > 0
    }
}
