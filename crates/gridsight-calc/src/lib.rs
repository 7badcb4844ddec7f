//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Derived energy metrics and demo value sampling."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Pure derived-metrics calculation.
//!
//! [`derive_metrics`] maps one reading plus the usage constants to the
//! forecast, carbon and budget figures shown on the dashboard. It holds no
//! state and is recomputed on every render. The constants are taken as
//! given: `days_passed` and `budget_limit_kwh` act as divisors, and a zero
//! value produces infinities. Configuration validation rejects those values
//! before they reach this crate.

use gridsight_common::config::UsageConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Constants feeding the projection formulae.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageConstants {
    pub budget_limit_kwh: f64,
    pub days_passed: f64,
    pub carbon_factor: f64,
}

impl From<&UsageConfig> for UsageConstants {
    fn from(config: &UsageConfig) -> Self {
        Self {
            budget_limit_kwh: config.budget_limit_kwh,
            days_passed: config.days_passed,
            carbon_factor: config.carbon_factor_kg_per_kwh,
        }
    }
}

/// Instantaneous electrical reading, either live or demo-sampled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub current_a: f64,
    pub power_w: f64,
    pub energy_kwh: f64,
}

/// Input selector for a metrics recompute. The original dashboard overloaded
/// a nullable sample for this; the enum makes the substitution explicit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataSource {
    Live(Reading),
    Demo,
}

/// Draws pseudo-random demo readings within the fixed presentation ranges.
#[derive(Debug)]
pub struct DemoSampler {
    rng: StdRng,
}

impl DemoSampler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// A fresh reading is drawn on every call.
    pub fn draw(&mut self) -> Reading {
        Reading {
            current_a: self.rng.gen_range(1.2..2.0),
            power_w: self.rng.gen_range(350.0..650.0),
            energy_kwh: self.rng.gen_range(25.0..65.0),
        }
    }

    /// Resolve a data source to a concrete reading, drawing demo values
    /// when no live reading applies.
    pub fn resolve(&mut self, source: DataSource) -> Reading {
        match source {
            DataSource::Live(reading) => reading,
            DataSource::Demo => self.draw(),
        }
    }
}

impl Default for DemoSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Figures derived from one reading. Ephemeral; recomputed per render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub current_a: f64,
    pub power_w: f64,
    pub energy_kwh: f64,
    /// Linear monthly projection: `(energy / days_passed) * 30`.
    pub prediction_kwh: f64,
    /// Carbon mass for the energy used so far, in kg CO2.
    pub carbon_kg: f64,
    /// Budget utilisation percentage (may exceed 100).
    pub progress_percent: f64,
    pub annual_carbon_kg: f64,
    /// Energy saved over a year if usage stays on budget; never negative.
    pub annual_savings_kwh: f64,
    /// True when the projection overshoots the budget ceiling.
    pub is_high_risk: bool,
}

pub fn derive_metrics(reading: Reading, constants: &UsageConstants) -> DerivedMetrics {
    let prediction_kwh = (reading.energy_kwh / constants.days_passed) * 30.0;
    let carbon_kg = reading.energy_kwh * constants.carbon_factor;
    let progress_percent = (reading.energy_kwh / constants.budget_limit_kwh) * 100.0;
    let annual_savings_kwh = (constants.budget_limit_kwh - prediction_kwh) * 12.0;

    DerivedMetrics {
        current_a: reading.current_a,
        power_w: reading.power_w,
        energy_kwh: reading.energy_kwh,
        prediction_kwh,
        carbon_kg,
        progress_percent,
        annual_carbon_kg: carbon_kg * 12.0,
        annual_savings_kwh: annual_savings_kwh.max(0.0),
        is_high_risk: prediction_kwh > constants.budget_limit_kwh,
    }
}
