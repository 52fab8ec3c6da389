//! PurpleAir-style adapter
//!
//! Column-oriented API: one `fields` header row plus `data` rows, with a
//! `data_time_stamp` used as the `modified_since` cursor.

use std::collections::BTreeMap;

use async_trait::async_trait;
use contracts::{
    pollutant, CanonicalReading, Cursor, FetchBatch, FetchError, Location, MalformedRecord,
    RawRecord, SourceAdapter, SourceConfig, SourceMetadata,
};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::common::{as_f64, as_id, as_text, as_timestamp, send_json};
use crate::error::{IngestionError, Result};

const DEFAULT_ENDPOINT: &str = "https://api.purpleair.com";
const DEFAULT_FIELDS: &str =
    "name,model,latitude,longitude,last_seen,pm1.0,pm2.5,pm10.0,temperature,humidity,pressure";

/// Bounding-box and filter params forwarded verbatim
const PASSTHROUGH_PARAMS: [&str; 6] = ["nwlng", "nwlat", "selng", "selat", "location_type", "show_only"];

/// Upstream column → canonical measurement key
const MEASUREMENT_COLUMNS: [(&str, &str); 6] = [
    ("pm1.0", pollutant::PM1),
    ("pm2.5", pollutant::PM25),
    ("pm10.0", pollutant::PM10),
    ("temperature", pollutant::TEMPERATURE),
    ("humidity", pollutant::HUMIDITY),
    ("pressure", pollutant::PRESSURE),
];

pub struct PurpleAirAdapter {
    source_id: String,
    endpoint: String,
    api_key: String,
    fields: String,
    query: Vec<(String, String)>,
    client: reqwest::Client,
}

impl PurpleAirAdapter {
    pub const MANUFACTURER: &'static str = "PurpleAir";

    pub fn new(source: &SourceConfig, api_key: String) -> Result<Self> {
        let endpoint = source
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/')
            .to_string();

        let mut fields = source
            .params
            .get("fields")
            .cloned()
            .unwrap_or_else(|| DEFAULT_FIELDS.to_string());
        if !fields.split(',').any(|f| f.trim() == "last_seen") {
            fields.push_str(",last_seen");
        }

        let mut query = Vec::new();
        for key in PASSTHROUGH_PARAMS {
            if let Some(value) = source.params.get(key) {
                if value.trim().is_empty() {
                    return Err(IngestionError::invalid_param(&source.id, key, "must not be empty"));
                }
                query.push((key.to_string(), value.clone()));
            }
        }

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
            fields,
            query,
            client,
        })
    }

    /// Zip the `fields` header with every `data` row
    fn rows_to_records(&self, body: &Value) -> std::result::Result<Vec<RawRecord>, FetchError> {
        let fields: Vec<&str> = body
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::unavailable(&self.source_id, "response has no 'fields'"))?
            .iter()
            .map(|f| f.as_str().unwrap_or_default())
            .collect();

        let rows = match body.get("data").and_then(Value::as_array) {
            Some(rows) => rows,
            None => return Ok(Vec::new()),
        };

        Ok(rows
            .iter()
            .filter_map(Value::as_array)
            .map(|row| {
                let object: Map<String, Value> = fields
                    .iter()
                    .zip(row.iter())
                    .filter(|(name, _)| !name.is_empty())
                    .map(|(name, value)| (name.to_string(), value.clone()))
                    .collect();
                RawRecord::new(&self.source_id, Value::Object(object))
            })
            .collect())
    }
}

fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

#[async_trait]
impl SourceAdapter for PurpleAirAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn manufacturer(&self) -> &str {
        Self::MANUFACTURER
    }

    #[instrument(name = "purpleair_fetch", skip(self, cursor), fields(source_id = %self.source_id))]
    async fn fetch(&self, cursor: Option<&Cursor>) -> std::result::Result<FetchBatch, FetchError> {
        let mut request = self
            .client
            .get(format!("{}/v1/sensors", self.endpoint))
            .header("X-API-Key", &self.api_key)
            .query(&[("fields", self.fields.as_str())])
            .query(&self.query);
        if let Some(cursor) = cursor {
            request = request.query(&[("modified_since", cursor.as_str())]);
        }

        let body = send_json(&self.source_id, request).await?;
        let records = self.rows_to_records(&body)?;
        let next_cursor = body
            .get("data_time_stamp")
            .and_then(as_id)
            .map(Cursor::new);

        debug!(records = records.len(), cursor = ?next_cursor, "purpleair rows fetched");
        Ok(FetchBatch::new(records, next_cursor))
    }

    fn transform(&self, record: &RawRecord) -> std::result::Result<CanonicalReading, MalformedRecord> {
        let malformed = |reason: &str| MalformedRecord::new(&self.source_id, reason);
        let payload = record
            .payload
            .as_object()
            .ok_or_else(|| malformed("payload is not an object"))?;

        let sensor_id = payload
            .get("sensor_index")
            .and_then(as_id)
            .ok_or_else(|| malformed("missing sensor_index"))?;
        let timestamp = payload
            .get("last_seen")
            .and_then(as_timestamp)
            .ok_or_else(|| malformed("missing or invalid last_seen"))?;

        let mut measurements = BTreeMap::new();
        for (column, key) in MEASUREMENT_COLUMNS {
            if let Some(value) = payload.get(column).and_then(as_f64) {
                let value = if key == pollutant::TEMPERATURE {
                    fahrenheit_to_celsius(value)
                } else {
                    value
                };
                measurements.insert(key.to_string(), value);
            }
        }
        if measurements.is_empty() {
            return Err(malformed("no measurements"));
        }

        let location = Location {
            lat: payload.get("latitude").and_then(as_f64),
            lon: payload.get("longitude").and_then(as_f64),
            name: payload.get("name").and_then(as_text),
        };

        Ok(CanonicalReading {
            sensor_id: format!("purpleair:{sensor_id}"),
            timestamp,
            location,
            measurements,
            source_metadata: SourceMetadata {
                source_id: self.source_id.clone(),
                manufacturer: Self::MANUFACTURER.to_string(),
                model: payload.get("model").and_then(as_text),
            },
            quality_flags: Default::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> PurpleAirAdapter {
        PurpleAirAdapter::new(&SourceConfig::new("pa", "purpleair", 60), "key".into()).unwrap()
    }

    #[test]
    fn test_rows_zip_with_fields() {
        let adapter = adapter();
        let body = json!({
            "data_time_stamp": 1714564800,
            "fields": ["sensor_index", "last_seen", "name", "latitude", "longitude", "pm2.5", "temperature"],
            "data": [
                [131075, 1714564790, "Backyard", 47.61, -122.33, 8.4, 68.0],
                [131076, 1714564795, null, 47.62, -122.30, 9.1, null]
            ]
        });
        let records = adapter.rows_to_records(&body).unwrap();
        assert_eq!(records.len(), 2);

        let reading = adapter.transform(&records[0]).unwrap();
        assert_eq!(reading.sensor_id, "purpleair:131075");
        assert_eq!(reading.timestamp.timestamp(), 1714564790);
        assert_eq!(reading.location.name.as_deref(), Some("Backyard"));
        assert_eq!(reading.measurement("pm25"), Some(8.4));
        assert!((reading.measurement("temperature").unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(reading.source_metadata.source_id, "pa");

        let reading = adapter.transform(&records[1]).unwrap();
        assert!(reading.location.name.is_none());
        assert!(reading.measurement("temperature").is_none());
    }

    #[test]
    fn test_missing_required_fields_are_malformed() {
        let adapter = adapter();
        let no_id = RawRecord::new("pa", json!({"last_seen": 1714564790, "pm2.5": 3.0}));
        assert!(adapter.transform(&no_id).unwrap_err().reason.contains("sensor_index"));

        let no_measurements = RawRecord::new("pa", json!({"sensor_index": 1, "last_seen": 1714564790}));
        assert_eq!(adapter.transform(&no_measurements).unwrap_err().reason, "no measurements");
    }

    #[test]
    fn test_fields_always_include_last_seen() {
        let mut source = SourceConfig::new("pa", "purpleair", 60);
        source.params.insert("fields".into(), "pm2.5".into());
        let adapter = PurpleAirAdapter::new(&source, "key".into()).unwrap();
        assert_eq!(adapter.fields, "pm2.5,last_seen");
    }
}
