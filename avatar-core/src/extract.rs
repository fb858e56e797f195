//! Vehicle attribute extraction from transcript text (rule-based, no LLM)
//!
//! Single deterministic pass, in this order:
//! 1. VIN: first 17-char run of `[A-HJ-NPR-Z0-9]`, uppercased
//! 2. Year: first whole-word `19xx` / `20xx`
//! 3. Make: first hit walking the fixed `Make` table (table order wins, not text order)
//! 4. Model: token(s) right after the matched make
//!
//! No check-digit validation and no confidence scoring beyond `ExtractionLabel`.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

use crate::error::AvatarError;
use crate::models::transcript::json_kind;
use crate::models::{ExtractedVehicleData, ExtractionLabel, TranscriptMessage};

static VIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b[A-HJ-NPR-Z0-9]{17}\b").expect("valid VIN regex"));

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid year regex"));

static MODEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+(\S+)(?:\s+(\S+))?").expect("valid model regex"));

static MAKE_RES: LazyLock<Vec<(Make, Regex)>> = LazyLock::new(|| {
    Make::ALL
        .iter()
        .map(|make| {
            let pattern = format!(r"(?i)\b(?:{})\b", make.pattern());
            (*make, Regex::new(&pattern).expect("valid make regex"))
        })
        .collect()
});

/// First words of multi-word model names; the following token is kept too.
const MODEL_PREFIXES: &[&str] = &["grand", "model", "land", "santa", "range", "town", "crown"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Invalid input kind: expected string, got {0}")]
    InvalidInputKind(&'static str),
}

impl From<ExtractError> for AvatarError {
    fn from(e: ExtractError) -> Self {
        AvatarError::Validation(e.to_string())
    }
}

/// Manufacturer allow-list. Declaration order is match precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Make {
    Toyota,
    Honda,
    Ford,
    Chevrolet,
    Nissan,
    Hyundai,
    Kia,
    Subaru,
    Mazda,
    Volkswagen,
    Bmw,
    MercedesBenz,
    Audi,
    Lexus,
    Acura,
    Infiniti,
    Jeep,
    Dodge,
    Ram,
    Gmc,
    Buick,
    Cadillac,
    Chrysler,
    Lincoln,
    Tesla,
    Volvo,
    Mitsubishi,
    Porsche,
    Jaguar,
    LandRover,
    Mini,
    Genesis,
}

impl Make {
    pub const ALL: [Make; 32] = [
        Make::Toyota,
        Make::Honda,
        Make::Ford,
        Make::Chevrolet,
        Make::Nissan,
        Make::Hyundai,
        Make::Kia,
        Make::Subaru,
        Make::Mazda,
        Make::Volkswagen,
        Make::Bmw,
        Make::MercedesBenz,
        Make::Audi,
        Make::Lexus,
        Make::Acura,
        Make::Infiniti,
        Make::Jeep,
        Make::Dodge,
        Make::Ram,
        Make::Gmc,
        Make::Buick,
        Make::Cadillac,
        Make::Chrysler,
        Make::Lincoln,
        Make::Tesla,
        Make::Volvo,
        Make::Mitsubishi,
        Make::Porsche,
        Make::Jaguar,
        Make::LandRover,
        Make::Mini,
        Make::Genesis,
    ];

    /// Canonical display name, stored as `make`.
    pub fn name(&self) -> &'static str {
        match self {
            Make::Toyota => "Toyota",
            Make::Honda => "Honda",
            Make::Ford => "Ford",
            Make::Chevrolet => "Chevrolet",
            Make::Nissan => "Nissan",
            Make::Hyundai => "Hyundai",
            Make::Kia => "Kia",
            Make::Subaru => "Subaru",
            Make::Mazda => "Mazda",
            Make::Volkswagen => "Volkswagen",
            Make::Bmw => "BMW",
            Make::MercedesBenz => "Mercedes-Benz",
            Make::Audi => "Audi",
            Make::Lexus => "Lexus",
            Make::Acura => "Acura",
            Make::Infiniti => "Infiniti",
            Make::Jeep => "Jeep",
            Make::Dodge => "Dodge",
            Make::Ram => "Ram",
            Make::Gmc => "GMC",
            Make::Buick => "Buick",
            Make::Cadillac => "Cadillac",
            Make::Chrysler => "Chrysler",
            Make::Lincoln => "Lincoln",
            Make::Tesla => "Tesla",
            Make::Volvo => "Volvo",
            Make::Mitsubishi => "Mitsubishi",
            Make::Porsche => "Porsche",
            Make::Jaguar => "Jaguar",
            Make::LandRover => "Land Rover",
            Make::Mini => "Mini",
            Make::Genesis => "Genesis",
        }
    }

    /// Extra spellings customers use, as a regex alternation.
    fn aliases(&self) -> Option<&'static str> {
        match self {
            Make::Chevrolet => Some(r"chevrolet|chevy"),
            Make::Volkswagen => Some(r"volkswagen|vw"),
            Make::MercedesBenz => Some(r"mercedes-benz|mercedes\s+benz|mercedes"),
            Make::LandRover => Some(r"land\s+rover"),
            _ => None,
        }
    }

    fn pattern(&self) -> String {
        match self.aliases() {
            Some(alternation) => alternation.to_string(),
            None => regex::escape(&self.name().to_lowercase()),
        }
    }
}

impl fmt::Display for Make {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Extract vehicle attributes from free text. Pure; never fails.
pub fn extract(text: &str) -> ExtractedVehicleData {
    let vin = VIN_RE.find(text).map(|m| m.as_str().to_uppercase());
    let year = YEAR_RE.find(text).map(|m| m.as_str().to_string());

    let make_hit = MAKE_RES
        .iter()
        .find_map(|(make, re)| re.find(text).map(|m| (*make, m.end())));

    let (make, model) = match make_hit {
        Some((make, end)) => (Some(make.name().to_string()), extract_model(&text[end..])),
        None => (None, None),
    };

    let mut data = ExtractedVehicleData {
        year,
        make,
        model,
        vin,
        label: ExtractionLabel::RegexExtracted,
    };
    if data.is_empty() {
        data.label = ExtractionLabel::NoDataFound;
    }
    data
}

/// Boundary variant for loosely typed payloads: only JSON strings are text.
pub fn extract_value(value: &serde_json::Value) -> Result<ExtractedVehicleData, ExtractError> {
    match value {
        serde_json::Value::String(text) => Ok(extract(text)),
        other => Err(ExtractError::InvalidInputKind(json_kind(other))),
    }
}

/// Concatenate message texts in transcript order.
pub fn transcript_text(messages: &[TranscriptMessage]) -> String {
    messages
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

// Trailing punctuation is kept ("Civic,"); callers pin this as current behavior.
fn extract_model(after_make: &str) -> Option<String> {
    let caps = MODEL_RE.captures(after_make)?;
    let first = caps.get(1)?.as_str();

    let wants_second = MODEL_PREFIXES.contains(&first.to_lowercase().as_str());

    match caps.get(2) {
        Some(second) if wants_second => Some(format!("{} {}", first, second.as_str())),
        _ => Some(first.to_string()),
    }
}
