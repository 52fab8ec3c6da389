//! HttpBusSink - publishes batches to a Kafka REST proxy (v2 JSON)
//!
//! `POST {url}/topics/{topic}` with `{"records": [{"key", "value"}]}`.
//! Records keep batch order, so per-key order survives partitioning.

use std::collections::HashMap;
use std::time::Duration;

use contracts::{ContractError, ReadingBatch, ReadingSink};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::encode::{bus_messages, BusMessage};

const CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";
const DEFAULT_TOPIC: &str = "air-quality-readings";

#[derive(Serialize)]
struct ProduceRequest<'a> {
    records: &'a [BusMessage],
}

/// Configuration for HttpBusSink
#[derive(Debug, Clone)]
pub struct HttpBusConfig {
    pub url: String,
    pub topic: String,
    pub timeout: Duration,
}

impl HttpBusConfig {
    /// Create config from params map (`url`, `topic`, `timeout_secs`)
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let url = params
            .get("url")
            .ok_or_else(|| "missing 'url' parameter".to_string())?
            .trim_end_matches('/')
            .to_string();
        let topic = params
            .get("topic")
            .cloned()
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        let timeout_secs = match params.get("timeout_secs") {
            Some(v) => v
                .parse()
                .map_err(|e| format!("invalid timeout_secs '{v}': {e}"))?,
            None => 10,
        };
        Ok(Self {
            url,
            topic,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/topics/{}", self.url, self.topic)
    }
}

/// Sink that produces bus messages over HTTP
pub struct HttpBusSink {
    name: String,
    config: HttpBusConfig,
    client: reqwest::Client,
}

impl HttpBusSink {
    pub fn new(name: impl Into<String>, config: HttpBusConfig) -> Result<Self, ContractError> {
        let name = name.into();
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ContractError::sink_connection(&name, e.to_string()))?;
        Ok(Self {
            name,
            config,
            client,
        })
    }

    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config =
            HttpBusConfig::from_params(params).map_err(|e| ContractError::sink_connection(&name, e))?;
        Self::new(name, config)
    }
}

impl ReadingSink for HttpBusSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "http_bus_sink_write",
        skip(self, batch),
        fields(sink = %self.name, batch_id = batch.batch_id)
    )]
    async fn write_batch(&mut self, batch: &ReadingBatch) -> Result<(), ContractError> {
        if batch.is_empty() {
            return Ok(());
        }
        let messages = bus_messages(batch);
        let response = self
            .client
            .post(self.config.endpoint())
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&ProduceRequest {
                records: &messages,
            })
            .send()
            .await
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContractError::sink_write(
                &self.name,
                format!("bus returned {status}: {body}"),
            ));
        }
        debug!(records = messages.len(), "batch produced");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}
