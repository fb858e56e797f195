use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AvatarError, Result};
use crate::models::transcript::json_kind;

/// Fixed label describing where the vehicle fields came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionLabel {
    #[default]
    RegexExtracted,
    NoDataFound,
    ManualEdit,
}

impl ExtractionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionLabel::RegexExtracted => "regex_extracted",
            ExtractionLabel::NoDataFound => "no_data_found",
            ExtractionLabel::ManualEdit => "manual_edit",
        }
    }
}

impl fmt::Display for ExtractionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionLabel {
    type Err = AvatarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "regex_extracted" => Ok(ExtractionLabel::RegexExtracted),
            "no_data_found" => Ok(ExtractionLabel::NoDataFound),
            "manual_edit" => Ok(ExtractionLabel::ManualEdit),
            other => Err(AvatarError::Decode(format!("unknown extraction label '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExtractedVehicleData {
    pub year: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub vin: Option<String>,
    #[serde(default)]
    pub label: ExtractionLabel,
}

impl ExtractedVehicleData {
    /// True when no field was captured. `Some("")` counts as captured.
    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.make.is_none() && self.model.is_none() && self.vin.is_none()
    }

    pub fn no_data_found() -> Self {
        Self {
            label: ExtractionLabel::NoDataFound,
            ..Self::default()
        }
    }

    /// Overwrite every field with operator-supplied values.
    pub fn apply(&mut self, fields: VehicleFields) {
        self.year = fields.year;
        self.make = fields.make;
        self.model = fields.model;
        self.vin = fields.vin;
        self.label = ExtractionLabel::ManualEdit;
    }
}

/// Operator corrections. Every field is treated as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VehicleFields {
    pub year: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub vin: Option<String>,
}

impl VehicleFields {
    /// Coerce a loosely typed JSON object into string fields.
    ///
    /// Numbers and booleans are stringified, `null` or a missing key means
    /// absent. Arrays and objects cannot be coerced.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            AvatarError::Decode(format!("fields must be a JSON object, got {}", json_kind(value)))
        })?;

        let field = |name: &str| -> Result<Option<String>> {
            match obj.get(name) {
                None | Some(serde_json::Value::Null) => Ok(None),
                Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
                Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
                Some(serde_json::Value::Bool(b)) => Ok(Some(b.to_string())),
                Some(other) => Err(AvatarError::Decode(format!(
                    "field '{}' must be a string, got {}",
                    name,
                    json_kind(other)
                ))),
            }
        };

        Ok(Self {
            year: field("year")?,
            make: field("make")?,
            model: field("model")?,
            vin: field("vin")?,
        })
    }
}
