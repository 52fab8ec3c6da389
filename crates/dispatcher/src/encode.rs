//! Outbound encodings
//!
//! - Message bus: one flat JSON record per reading, keyed by `sensor_id`
//! - Time series: InfluxDB line protocol, one point per reading

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use contracts::{CanonicalReading, QualityFlags, ReadingBatch};
use serde::{Deserialize, Serialize};

/// Line protocol measurement name
pub const MEASUREMENT: &str = "air_quality";

/// Flat message-bus value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatReading {
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    pub manufacturer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub source_id: String,
    #[serde(flatten)]
    pub measurements: BTreeMap<String, f64>,
    pub quality_flags: QualityFlags,
}

impl From<&CanonicalReading> for FlatReading {
    fn from(reading: &CanonicalReading) -> Self {
        Self {
            sensor_id: reading.sensor_id.clone(),
            timestamp: reading.timestamp,
            lat: reading.location.lat,
            lon: reading.location.lon,
            location_name: reading.location.name.clone(),
            manufacturer: reading.source_metadata.manufacturer.clone(),
            model: reading.source_metadata.model.clone(),
            source_id: reading.source_metadata.source_id.clone(),
            measurements: reading.measurements.clone(),
            quality_flags: reading.quality_flags.clone(),
        }
    }
}

/// One keyed bus message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub key: String,
    pub value: FlatReading,
}

impl From<&CanonicalReading> for BusMessage {
    fn from(reading: &CanonicalReading) -> Self {
        Self {
            key: reading.sensor_id.clone(),
            value: FlatReading::from(reading),
        }
    }
}

/// Messages for a batch, in batch order
pub fn bus_messages(batch: &ReadingBatch) -> Vec<BusMessage> {
    batch.readings.iter().map(|r| BusMessage::from(r.as_ref())).collect()
}

/// Encode one reading as a line-protocol point
///
/// Returns `None` when the reading has no finite measurement.
pub fn line_protocol(reading: &CanonicalReading) -> Option<String> {
    let fields: Vec<String> = reading
        .measurements
        .iter()
        .filter(|(_, v)| v.is_finite())
        .map(|(k, v)| format!("{}={}", escape_key(k), v))
        .collect();
    if fields.is_empty() {
        return None;
    }

    let mut line = String::from(MEASUREMENT);
    let tags = [
        ("location_name", reading.location.name.as_deref()),
        ("manufacturer", Some(reading.source_metadata.manufacturer.as_str())),
        ("sensor_id", Some(reading.sensor_id.as_str())),
    ];
    for (key, value) in tags {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            let _ = write!(line, ",{key}={}", escape_key(value));
        }
    }
    let _ = write!(line, " {} {}", fields.join(","), reading.timestamp.timestamp());
    Some(line)
}

/// Newline-joined points for a batch
pub fn line_protocol_batch(batch: &ReadingBatch) -> String {
    batch
        .readings
        .iter()
        .filter_map(|r| line_protocol(r))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escape tag keys, tag values and field keys
fn escape_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use contracts::{Location, SourceMetadata};
    use std::sync::Arc;

    fn reading() -> CanonicalReading {
        CanonicalReading {
            sensor_id: "purpleair:42".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            location: Location::new(47.6, -122.3).with_name("Pike Place, North"),
            measurements: [("pm25".to_string(), 12.5), ("humidity".to_string(), 40.0)]
                .into_iter()
                .collect(),
            source_metadata: SourceMetadata {
                source_id: "pa".into(),
                manufacturer: "PurpleAir".into(),
                model: None,
            },
            quality_flags: QualityFlags {
                validated: true,
                anomaly_score: 0.0,
                issues: vec![],
            },
        }
    }

    #[test]
    fn test_line_protocol() {
        let line = line_protocol(&reading()).unwrap();
        assert_eq!(
            line,
            "air_quality,location_name=Pike\\ Place\\,\\ North,manufacturer=PurpleAir,sensor_id=purpleair:42 humidity=40,pm25=12.5 1714564800"
        );
    }

    #[test]
    fn test_line_protocol_skips_empty_tags_and_nan() {
        let mut r = reading();
        r.location.name = None;
        r.measurements.insert("pm10".into(), f64::NAN);
        let line = line_protocol(&r).unwrap();
        assert!(!line.contains("location_name"));
        assert!(!line.contains("pm10"));

        r.measurements.clear();
        assert!(line_protocol(&r).is_none());
    }

    #[test]
    fn test_flat_bus_message() {
        let batch = ReadingBatch::new(1, vec![Arc::new(reading())]);
        let messages = bus_messages(&batch);
        assert_eq!(messages[0].key, "purpleair:42");

        let value = serde_json::to_value(&messages[0].value).unwrap();
        assert_eq!(value["pm25"], 12.5);
        assert_eq!(value["location_name"], "Pike Place, North");
        assert_eq!(value["quality_flags"]["validated"], true);
    }
}
