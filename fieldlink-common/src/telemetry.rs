use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Error;

/// A single measurement produced by a sensor source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Sensor identifier (e.g., "float_sensor_0").
    pub id: String,

    /// Human-readable description, prefixed with the sensor variant.
    pub description: String,

    /// The measured value.
    pub value: f64,

    /// Unix epoch seconds when the measurement was taken.
    pub timestamp: i64,

    /// Measurement unit, if the source reports one (e.g., "psi").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl MetricRecord {
    /// Create a new record without a unit.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        value: f64,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            value,
            timestamp,
            unit: None,
        }
    }

    /// Attach a measurement unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Device health snapshot, sampled by the agent itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Unix epoch seconds when the snapshot was taken.
    pub timestamp: i64,

    /// Global CPU usage in percent.
    pub cpu_percent: f64,

    /// Used memory in percent of total.
    pub memory_percent: f64,

    /// Hottest temperature sensor reading, `null` when the host exposes none.
    pub temperature_celsius: Option<f64>,
}

/// Classification of a batch. Governs endpoint routing and queue key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    #[serde(rename = "sensor-batch")]
    Sensor,
    #[serde(rename = "device-status")]
    DeviceStatus,
}

impl MetricKind {
    /// All kinds, in dispatch order.
    pub const ALL: [MetricKind; 2] = [MetricKind::Sensor, MetricKind::DeviceStatus];

    /// The string used in persisted records and as queue key prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Sensor => "sensor-batch",
            MetricKind::DeviceStatus => "device-status",
        }
    }

    /// Collector endpoint path for this kind.
    pub fn endpoint(&self) -> &'static str {
        match self {
            MetricKind::Sensor => "/metrics",
            MetricKind::DeviceStatus => "/devices/status",
        }
    }

    /// Resolve the kind from a queue key prefix.
    ///
    /// Unknown prefixes (including the legacy `batch-` keys) are sensor batches.
    pub fn from_key(key: &str) -> Self {
        if key.starts_with(MetricKind::DeviceStatus.as_str()) {
            MetricKind::DeviceStatus
        } else {
            MetricKind::Sensor
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}

/// The unit of export and persistence.
///
/// Serializes as the bare collector payload: a JSON array of records for
/// sensor batches, a JSON object for a device status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Batch {
    Sensor(Vec<MetricRecord>),
    DeviceStatus(DeviceStatus),
}

impl Batch {
    /// The kind carried by this batch.
    pub fn kind(&self) -> MetricKind {
        match self {
            Batch::Sensor(_) => MetricKind::Sensor,
            Batch::DeviceStatus(_) => MetricKind::DeviceStatus,
        }
    }

    /// Number of measurements in the batch.
    pub fn len(&self) -> usize {
        match self {
            Batch::Sensor(records) => records.len(),
            Batch::DeviceStatus(_) => 1,
        }
    }

    /// True for a sensor batch with no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// False if any measurement is NaN or infinite.
    ///
    /// JSON has no encoding for those values; serde_json writes them as
    /// `null`, which no longer decodes as a number.
    pub fn is_finite(&self) -> bool {
        match self {
            Batch::Sensor(records) => records.iter().all(|r| r.value.is_finite()),
            Batch::DeviceStatus(status) => {
                status.cpu_percent.is_finite()
                    && status.memory_percent.is_finite()
                    && status.temperature_celsius.is_none_or(f64::is_finite)
            }
        }
    }
}

/// Get the current time in seconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch (should never happen in practice).
pub fn current_timestamp_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
