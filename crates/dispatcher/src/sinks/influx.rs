//! InfluxSink - writes points to InfluxDB v2 (line protocol)

use std::collections::HashMap;
use std::time::Duration;

use contracts::{ContractError, ReadingBatch, ReadingSink};
use tracing::{debug, instrument};

use crate::encode::line_protocol_batch;

/// Configuration for InfluxSink
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub org: String,
    pub bucket: String,
    /// API token, resolved from `token_env`
    pub token: Option<String>,
    pub timeout: Duration,
}

impl InfluxConfig {
    /// Create config from params map
    ///
    /// `url` is required; `org`/`bucket` default to `airq`; the token is
    /// read from the environment variable named by `token_env`.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let url = params
            .get("url")
            .ok_or_else(|| "missing 'url' parameter".to_string())?
            .trim_end_matches('/')
            .to_string();
        let token = match params.get("token_env") {
            Some(env) => Some(
                std::env::var(env)
                    .ok()
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| format!("token env '{env}' is not set"))?,
            ),
            None => None,
        };
        Ok(Self {
            url,
            org: params.get("org").cloned().unwrap_or_else(|| "airq".into()),
            bucket: params.get("bucket").cloned().unwrap_or_else(|| "airq".into()),
            token,
            timeout: Duration::from_secs(10),
        })
    }
}

/// Sink that writes line protocol to InfluxDB
pub struct InfluxSink {
    name: String,
    config: InfluxConfig,
    client: reqwest::Client,
}

impl InfluxSink {
    pub fn new(name: impl Into<String>, config: InfluxConfig) -> Result<Self, ContractError> {
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
            InfluxConfig::from_params(params).map_err(|e| ContractError::sink_connection(&name, e))?;
        Self::new(name, config)
    }
}

impl ReadingSink for InfluxSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "influx_sink_write",
        skip(self, batch),
        fields(sink = %self.name, batch_id = batch.batch_id)
    )]
    async fn write_batch(&mut self, batch: &ReadingBatch) -> Result<(), ContractError> {
        let body = line_protocol_batch(batch);
        if body.is_empty() {
            return Ok(());
        }

        let mut request = self
            .client
            .post(format!("{}/api/v2/write", self.config.url))
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "s"),
            ])
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        if let Some(token) = &self.config.token {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Token {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ContractError::sink_write(
                &self.name,
                format!("influxdb returned {status}: {text}"),
            ));
        }
        debug!(points = batch.len(), "points written");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let mut params = HashMap::new();
        params.insert("url".to_string(), "http://influx:8086".to_string());
        let config = InfluxConfig::from_params(&params).unwrap();
        assert_eq!(config.org, "airq");
        assert!(config.token.is_none());

        params.insert("token_env".to_string(), "AIRQ_TEST_SURELY_UNSET_TOKEN".to_string());
        let err = InfluxConfig::from_params(&params).unwrap_err();
        assert!(err.contains("AIRQ_TEST_SURELY_UNSET_TOKEN"));
    }
}
