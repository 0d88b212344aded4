//! Operator-tunable scoring weights.
//!
//! A `WeightSet` is only ever built whole. There is no setter for a single
//! coefficient; changing one means validating and swapping in a new set.

use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;

use crate::models::Factor;

pub const MAX_WEIGHT: u8 = 5;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum WeightError {
    #[error("weights must be a table of coefficient names to integers")]
    NotATable,
    #[error("missing coefficient `{0}`")]
    Missing(&'static str),
    #[error("coefficient `{name}` must be an integer, got {value}")]
    NotInteger { name: &'static str, value: String },
    #[error("coefficient `{name}` must be between 0 and 5, got {value}")]
    OutOfRange { name: &'static str, value: i64 },
    #[error("unknown coefficient `{0}`")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub struct WeightSet {
    severity: u8,
    people_impact: u8,
    urgency: u8,
    location_criticality: u8,
    wait_time: u8,
    recurrence: u8,
}

impl Default for WeightSet {
    fn default() -> Self {
        Self {
            severity: 5,
            people_impact: 3,
            urgency: 4,
            location_criticality: 2,
            wait_time: 3,
            recurrence: 1,
        }
    }
}

impl WeightSet {
    pub fn new(
        severity: i64,
        people_impact: i64,
        urgency: i64,
        location_criticality: i64,
        wait_time: i64,
        recurrence: i64,
    ) -> Result<Self, WeightError> {
        Ok(Self {
            severity: checked(Factor::Severity, severity)?,
            people_impact: checked(Factor::PeopleImpact, people_impact)?,
            urgency: checked(Factor::Urgency, urgency)?,
            location_criticality: checked(Factor::LocationCriticality, location_criticality)?,
            wait_time: checked(Factor::WaitTime, wait_time)?,
            recurrence: checked(Factor::Recurrence, recurrence)?,
        })
    }

    /// Build a set from an untyped table such as a decoded TOML or JSON body.
    /// Every factor must be present exactly once as an integer in range.
    pub fn create(values: &Value) -> Result<Self, WeightError> {
        let table = values.as_object().ok_or(WeightError::NotATable)?;

        if let Some(unknown) = table.keys().find(|key| Factor::parse(key).is_none()) {
            return Err(WeightError::Unknown(unknown.clone()));
        }

        let mut coefficients = [0i64; 6];
        for (slot, factor) in coefficients.iter_mut().zip(Factor::ALL) {
            let raw = table
                .get(factor.as_str())
                .ok_or(WeightError::Missing(factor.as_str()))?;
            *slot = raw.as_i64().ok_or_else(|| WeightError::NotInteger {
                name: factor.as_str(),
                value: raw.to_string(),
            })?;
        }

        let [severity, people_impact, urgency, location_criticality, wait_time, recurrence] =
            coefficients;
        Self::new(
            severity,
            people_impact,
            urgency,
            location_criticality,
            wait_time,
            recurrence,
        )
    }

    pub fn get(&self, factor: Factor) -> u8 {
        match factor {
            Factor::Severity => self.severity,
            Factor::PeopleImpact => self.people_impact,
            Factor::Urgency => self.urgency,
            Factor::LocationCriticality => self.location_criticality,
            Factor::WaitTime => self.wait_time,
            Factor::Recurrence => self.recurrence,
        }
    }
}

fn checked(factor: Factor, value: i64) -> Result<u8, WeightError> {
    match u8::try_from(value) {
        Ok(weight) if weight <= MAX_WEIGHT => Ok(weight),
        _ => Err(WeightError::OutOfRange {
            name: factor.as_str(),
            value,
        }),
    }
}

/// Parse a TOML weight file body, e.g. `severity = 5` per line.
pub fn parse_toml(body: &str) -> anyhow::Result<WeightSet> {
    let table: toml::Table = body.parse().context("weights file is not valid TOML")?;
    let value = serde_json::to_value(table)?;
    Ok(WeightSet::create(&value)?)
}

pub fn load_file(path: &Path) -> anyhow::Result<WeightSet> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read weights from {}", path.display()))?;
    parse_toml(&body).with_context(|| format!("invalid weights in {}", path.display()))
}
