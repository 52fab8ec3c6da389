//! Clarity-style adapter
//!
//! Datapoint-oriented API. Each datapoint carries a GeoJSON point
//! (`[lon, lat]`) and a `characteristics` map of `{ value }` objects.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use contracts::{
    pollutant, CanonicalReading, Cursor, FetchBatch, FetchError, Location, MalformedRecord,
    RawRecord, SourceAdapter, SourceConfig, SourceMetadata,
};
use serde_json::Value;
use tracing::{debug, instrument};

use super::common::{as_f64, as_id, as_text, as_timestamp, send_json};
use crate::error::{IngestionError, Result};

const DEFAULT_ENDPOINT: &str = "https://clarity-data-api.clarity.io";

/// Upstream characteristic → canonical measurement key
///
/// Anything else is passed through under its upstream name.
const CHARACTERISTICS: [(&str, &str); 8] = [
    ("pm1ConcMass", pollutant::PM1),
    ("pm2_5ConcMass", pollutant::PM25),
    ("pm10ConcMass", pollutant::PM10),
    ("temperature", pollutant::TEMPERATURE),
    ("relHumid", pollutant::HUMIDITY),
    ("pressure", pollutant::PRESSURE),
    ("no2Conc", pollutant::NO2),
    ("o3Conc", pollutant::O3),
];

pub struct ClarityAdapter {
    source_id: String,
    endpoint: String,
    api_key: String,
    org: Option<String>,
    client: reqwest::Client,
}

impl ClarityAdapter {
    pub const MANUFACTURER: &'static str = "Clarity";

    pub fn new(source: &SourceConfig, api_key: String) -> Result<Self> {
        let endpoint = source
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/')
            .to_string();
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| IngestionError::ClientBuild {
                source_id: source.id.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            source_id: source.id.clone(),
            endpoint,
            api_key,
            org: source.params.get("org").cloned(),
            client,
        })
    }

    fn datapoints(body: &Value) -> &[Value] {
        body.as_array()
            .or_else(|| body.get("data").and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn canonical_key(characteristic: &str) -> String {
    CHARACTERISTICS
        .iter()
        .find(|(name, _)| *name == characteristic)
        .map(|(_, key)| key.to_string())
        .unwrap_or_else(|| characteristic.to_string())
}

#[async_trait]
impl SourceAdapter for ClarityAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn manufacturer(&self) -> &str {
        Self::MANUFACTURER
    }

    #[instrument(name = "clarity_fetch", skip(self, cursor), fields(source_id = %self.source_id))]
    async fn fetch(&self, cursor: Option<&Cursor>) -> std::result::Result<FetchBatch, FetchError> {
        let mut request = self
            .client
            .get(format!("{}/v2/recent-datapoints", self.endpoint))
            .header("x-api-key", &self.api_key);
        if let Some(org) = &self.org {
            request = request.query(&[("org", org.as_str())]);
        }
        if let Some(cursor) = cursor {
            request = request.query(&[("startTime", cursor.as_str())]);
        }

        let body = send_json(&self.source_id, request).await?;
        let points = Self::datapoints(&body);

        let newest: Option<DateTime<Utc>> = points
            .iter()
            .filter_map(|p| p.get("time").and_then(as_timestamp))
            .max();
        let records: Vec<RawRecord> = points
            .iter()
            .map(|p| RawRecord::new(&self.source_id, p.clone()))
            .collect();

        debug!(records = records.len(), newest = ?newest, "clarity datapoints fetched");
        Ok(FetchBatch::new(
            records,
            newest.map(|t| Cursor::new(t.to_rfc3339_opts(SecondsFormat::Secs, true))),
        ))
    }

    fn transform(&self, record: &RawRecord) -> std::result::Result<CanonicalReading, MalformedRecord> {
        let malformed = |reason: &str| MalformedRecord::new(&self.source_id, reason);
        let point = &record.payload;

        let sensor_id = point
            .get("device")
            .or_else(|| point.get("deviceCode"))
            .and_then(as_id)
            .ok_or_else(|| malformed("missing device"))?;
        let timestamp = point
            .get("time")
            .and_then(as_timestamp)
            .ok_or_else(|| malformed("missing or invalid time"))?;

        let measurements: BTreeMap<String, f64> = point
            .get("characteristics")
            .and_then(Value::as_object)
            .map(|chars| {
                chars
                    .iter()
                    .filter_map(|(name, c)| {
                        let value = c.get("value").and_then(as_f64)?;
                        Some((canonical_key(name), value))
                    })
                    .collect()
            })
            .unwrap_or_default();
        if measurements.is_empty() {
            return Err(malformed("no measurements"));
        }

        // GeoJSON order is [lon, lat]
        let coordinates = point
            .pointer("/location/coordinates")
            .and_then(Value::as_array);
        let location = Location {
            lat: coordinates.and_then(|c| c.get(1)).and_then(as_f64),
            lon: coordinates.and_then(|c| c.first()).and_then(as_f64),
            name: point.get("locationName").and_then(as_text),
        };

        Ok(CanonicalReading {
            sensor_id: format!("clarity:{sensor_id}"),
            timestamp,
            location,
            measurements,
            source_metadata: SourceMetadata {
                source_id: self.source_id.clone(),
                manufacturer: Self::MANUFACTURER.to_string(),
                model: point.get("model").and_then(as_text),
            },
            quality_flags: Default::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> ClarityAdapter {
        ClarityAdapter::new(&SourceConfig::new("cl", "clarity", 300), "key".into()).unwrap()
    }

    #[test]
    fn test_transform_maps_geojson_and_characteristics() {
        let record = RawRecord::new(
            "cl",
            json!({
                "device": "A1B2C3D4",
                "time": "2024-05-01T12:00:00Z",
                "location": { "type": "Point", "coordinates": [-122.33, 47.61] },
                "characteristics": {
                    "pm2_5ConcMass": { "value": 12.5, "raw": 14.0 },
                    "relHumid": { "value": 55 },
                    "vocIndex": { "value": 101 },
                    "no2Conc": { "raw": 3 }
                }
            }),
        );
        let reading = adapter().transform(&record).unwrap();
        assert_eq!(reading.sensor_id, "clarity:A1B2C3D4");
        assert_eq!(reading.location.lat, Some(47.61));
        assert_eq!(reading.location.lon, Some(-122.33));
        assert_eq!(reading.measurement("pm25"), Some(12.5));
        assert_eq!(reading.measurement("humidity"), Some(55.0));
        // unknown characteristic passes through, value-less one is skipped
        assert_eq!(reading.measurement("vocIndex"), Some(101.0));
        assert!(reading.measurement("no2").is_none());
    }

    #[test]
    fn test_missing_location_is_not_malformed() {
        let record = RawRecord::new(
            "cl",
            json!({
                "device": "A1",
                "time": "2024-05-01T12:00:00Z",
                "characteristics": { "temperature": { "value": 21.0 } }
            }),
        );
        let reading = adapter().transform(&record).unwrap();
        assert!(reading.location.lat.is_none());
        assert!(reading.location.lon.is_none());
    }

    #[test]
    fn test_missing_time_is_malformed() {
        let record = RawRecord::new(
            "cl",
            json!({ "device": "A1", "characteristics": { "temperature": { "value": 21.0 } } }),
        );
        let err = adapter().transform(&record).unwrap_err();
        assert!(err.reason.contains("time"), "got: {err}");
    }

    #[test]
    fn test_datapoints_accepts_wrapped_body() {
        let body = json!({ "data": [ {"device": "x"} ] });
        assert_eq!(ClarityAdapter::datapoints(&body).len(), 1);
        assert!(ClarityAdapter::datapoints(&json!({})).is_empty());
    }
}
