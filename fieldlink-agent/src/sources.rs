//! Sensor sources.
//!
//! A source is anything that can produce a [`MetricRecord`] on demand. The
//! variants here are simulated bench sensors; hardware drivers plug in by
//! implementing [`Source`].

use std::time::Instant;

use fieldlink_agent_framework::{AgentError, MetricRecord};
use fieldlink_common::current_timestamp_secs;
use serde::{Deserialize, Serialize};

/// Capability interface for sensor sources.
pub trait Source: Send {
    /// Sensor identifier.
    fn id(&self) -> &str;

    /// Read the current value.
    fn read(&mut self) -> MetricRecord;
}

/// Source definition from the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Level switch that trips on every fifth read.
    Float { id: String, description: String },

    /// Consumption meter pulsing on a 200 ms tick.
    Energy { id: String, description: String },

    /// Pressure transducer oscillating between two bounds.
    Pressure {
        id: String,
        description: String,
        #[serde(default)]
        min_pressure: f64,
        #[serde(default = "default_max_pressure")]
        max_pressure: f64,
        #[serde(default = "default_pressure_unit")]
        unit: String,
    },
}

fn default_max_pressure() -> f64 {
    30.0
}

fn default_pressure_unit() -> String {
    "psi".to_string()
}

/// The simulated bench set: ten float and ten energy sensors.
pub fn default_sources() -> Vec<SourceConfig> {
    (0..10)
        .flat_map(|i| {
            [
                SourceConfig::Float {
                    id: format!("float_sensor_{}", i),
                    description: format!("A test float sensor {}", i),
                },
                SourceConfig::Energy {
                    id: format!("energy_sensor_{}", i),
                    description: format!("A test energy consumption sensor {}", i),
                },
            ]
        })
        .collect()
}

impl SourceConfig {
    pub fn id(&self) -> &str {
        match self {
            SourceConfig::Float { id, .. }
            | SourceConfig::Energy { id, .. }
            | SourceConfig::Pressure { id, .. } => id,
        }
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.id().trim().is_empty() {
            return Err(AgentError::validation("source id must not be empty"));
        }
        if let SourceConfig::Pressure {
            id,
            min_pressure,
            max_pressure,
            ..
        } = self
        {
            if min_pressure >= max_pressure {
                return Err(AgentError::validation(format!(
                    "source '{}': min_pressure must be below max_pressure",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Construct the source this definition describes.
    pub fn build(&self) -> Box<dyn Source> {
        match self.clone() {
            SourceConfig::Float { id, description } => Box::new(FloatSensor::new(id, description)),
            SourceConfig::Energy { id, description } => {
                Box::new(EnergyConsumptionSensor::new(id, description))
            }
            SourceConfig::Pressure {
                id,
                description,
                min_pressure,
                max_pressure,
                unit,
            } => Box::new(PressureSensor::new(
                id,
                description,
                min_pressure,
                max_pressure,
                unit,
            )),
        }
    }
}

/// Build every configured source.
pub fn build_sources(configs: &[SourceConfig]) -> Vec<Box<dyn Source>> {
    configs.iter().map(SourceConfig::build).collect()
}

const COUNTER_WRAP: u32 = 1000;

/// Simulated level switch: `1.0` on every fifth read, `0.0` otherwise.
pub struct FloatSensor {
    id: String,
    description: String,
    counter: u32,
}

impl FloatSensor {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: format!("FloatSensor: {}", description.into()),
            counter: 0,
        }
    }
}

impl Source for FloatSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&mut self) -> MetricRecord {
        let value = if self.counter % 5 == 0 { 1.0 } else { 0.0 };
        self.counter = (self.counter + 1) % COUNTER_WRAP;
        MetricRecord::new(&self.id, &self.description, value, current_timestamp_secs())
    }
}

/// Simulated consumption meter.
///
/// The meter advances one tick every 200 ms; it reads `0.0` on every fifth
/// tick and `100.0` otherwise.
pub struct EnergyConsumptionSensor {
    id: String,
    description: String,
    started: Instant,
}

impl EnergyConsumptionSensor {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: format!("EnergyConsumptionSensor: {}", description.into()),
            started: Instant::now(),
        }
    }

    fn value_at_tick(tick: u128) -> f64 {
        if (tick % COUNTER_WRAP as u128) % 5 == 0 {
            0.0
        } else {
            100.0
        }
    }
}

impl Source for EnergyConsumptionSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&mut self) -> MetricRecord {
        let tick = self.started.elapsed().as_millis() / 200;
        MetricRecord::new(
            &self.id,
            &self.description,
            Self::value_at_tick(tick),
            current_timestamp_secs(),
        )
    }
}

/// Simulated pressure transducer following a slow sine wave.
pub struct PressureSensor {
    id: String,
    description: String,
    min_pressure: f64,
    max_pressure: f64,
    unit: String,
    started: Instant,
}

impl PressureSensor {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        min_pressure: f64,
        max_pressure: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: format!("PressureSensor: {}", description.into()),
            min_pressure,
            max_pressure,
            unit: unit.into(),
            started: Instant::now(),
        }
    }

    fn pressure_at(&self, elapsed_secs: f64) -> f64 {
        let normalized = ((elapsed_secs * 0.1).sin() + 1.0) / 2.0;
        let pressure = self.min_pressure + normalized * (self.max_pressure - self.min_pressure);
        (pressure * 100.0).round() / 100.0
    }
}

impl Source for PressureSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&mut self) -> MetricRecord {
        let value = self.pressure_at(self.started.elapsed().as_secs_f64());
        MetricRecord::new(&self.id, &self.description, value, current_timestamp_secs())
            .with_unit(&self.unit)
    }
}
