use serde::{Deserialize, Serialize};

use super::document::{deserialize_amount, Document};
use crate::errors::RideError;

/// Expenses recorded against a trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripCharges {
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub incidental: f64,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub misc: f64,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub fuel: f64,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub toll: f64,
    #[serde(default)]
    pub go_clicked: Option<String>,
    #[serde(default)]
    pub end_clicked: Option<String>,
}

impl TripCharges {
    pub fn from_document(doc: &Document) -> Result<Self, RideError> {
        doc.decode::<TripCharges>()
            .map_err(|e| RideError::decode("trip charges", &doc.id, e))
    }

    /// Folds the expense documents of one trip into a single record. Amounts
    /// add up; for the click markers the last non-empty value wins.
    pub fn aggregate<'a>(items: impl IntoIterator<Item = &'a TripCharges>) -> TripCharges {
        items.into_iter().fold(TripCharges::default(), |mut acc, c| {
            acc.incidental += c.incidental;
            acc.misc += c.misc;
            acc.fuel += c.fuel;
            acc.toll += c.toll;
            if c.go_clicked.as_deref().is_some_and(|s| !s.is_empty()) {
                acc.go_clicked = c.go_clicked.clone();
            }
            if c.end_clicked.as_deref().is_some_and(|s| !s.is_empty()) {
                acc.end_clicked = c.end_clicked.clone();
            }
            acc
        })
    }

    /// Fuel, toll and misc. Incidentals are reimbursed separately and not part
    /// of the trip total.
    pub fn total(&self) -> f64 {
        self.fuel + self.toll + self.misc
    }
}
