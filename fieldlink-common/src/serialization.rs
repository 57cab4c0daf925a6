use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Encode a value as compact JSON bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(Error::from)
}

/// Encode a value as a compact JSON string (used by the log sink).
pub fn encode_string<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Error::from)
}

/// Decode JSON bytes into a value.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Batch, DeviceStatus, MetricRecord};

    #[test]
    fn test_encode_is_compact() {
        let record = MetricRecord::new("float_sensor_0", "FloatSensor: tank", 1.0, 1_700_000_000);
        let encoded = encode_string(&record).unwrap();

        assert!(!encoded.contains(' '));
        assert!(!encoded.contains('\n'));
        assert!(encoded.starts_with('{'));
    }

    #[test]
    fn test_decode_sensor_batch() {
        let data = br#"[{"id":"s1","description":"d","value":2.5,"timestamp":10}]"#;
        let batch: Batch = decode(data).unwrap();

        match batch {
            Batch::Sensor(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].id, "s1");
                assert_eq!(records[0].value, 2.5);
            }
            other => panic!("expected sensor batch, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_status_batch_with_null_temperature() {
        let data =
            br#"{"timestamp":10,"cpu_percent":12.5,"memory_percent":40.0,"temperature_celsius":null}"#;
        let batch: Batch = decode(data).unwrap();

        assert_eq!(
            batch,
            Batch::DeviceStatus(DeviceStatus {
                timestamp: 10,
                cpu_percent: 12.5,
                memory_percent: 40.0,
                temperature_celsius: None,
            })
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode::<Batch>(b"not json").is_err());
    }
}
