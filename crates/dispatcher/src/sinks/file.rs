//! FileSink - appends encoded batches to a local file

use std::collections::HashMap;
use std::path::PathBuf;

use contracts::{ContractError, ReadingBatch, ReadingSink, SinkRole};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, instrument};

use crate::encode::{bus_messages, line_protocol_batch};

/// On-disk encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// One bus message (`{key, value}`) per line
    Jsonl,
    /// InfluxDB line protocol
    LineProtocol,
}

impl FileFormat {
    /// Default encoding for a sink role
    pub fn for_role(role: SinkRole) -> Self {
        match role {
            SinkRole::MessageBus => Self::Jsonl,
            SinkRole::TimeSeries => Self::LineProtocol,
        }
    }
}

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file
    pub path: PathBuf,
    pub format: FileFormat,
}

impl FileSinkConfig {
    /// Create config from params map
    ///
    /// `path` is required; `format` (`jsonl` / `line_protocol`) defaults
    /// from the sink role.
    pub fn from_params(params: &HashMap<String, String>, role: SinkRole) -> Result<Self, String> {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .ok_or_else(|| "missing 'path' parameter".to_string())?;

        let format = match params.get("format").map(String::as_str) {
            Some("jsonl") => FileFormat::Jsonl,
            Some("line_protocol") => FileFormat::LineProtocol,
            None => FileFormat::for_role(role),
            Some(other) => return Err(format!("unknown format '{other}'")),
        };

        Ok(Self { path, format })
    }
}

/// Sink that appends batches to a file
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    file: Option<File>,
}

impl FileSink {
    /// Create a new FileSink, creating parent directories
    pub async fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .await?;

        Ok(Self {
            name: name.into(),
            config,
            file: Some(file),
        })
    }

    /// Create from params map (for factory)
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
        role: SinkRole,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = FileSinkConfig::from_params(params, role)
            .map_err(|e| ContractError::sink_connection(&name, e))?;
        Self::new(&name, config)
            .await
            .map_err(|e| ContractError::sink_connection(&name, e.to_string()))
    }

    fn encode(&self, batch: &ReadingBatch) -> Result<String, ContractError> {
        let mut out = match self.config.format {
            FileFormat::Jsonl => bus_messages(batch)
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?
                .join("\n"),
            FileFormat::LineProtocol => line_protocol_batch(batch),
        };
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out)
    }
}

impl ReadingSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, batch),
        fields(sink = %self.name, batch_id = batch.batch_id)
    )]
    async fn write_batch(&mut self, batch: &ReadingBatch) -> Result<(), ContractError> {
        let data = self.encode(batch)?;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| ContractError::sink_write(&self.name, "file closed"))?;
        file.write_all(data.as_bytes()).await.map_err(|e| {
            error!(sink = %self.name, batch_id = batch.batch_id, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(file) = self.file.as_mut() {
            file.flush()
                .await
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        debug!(sink = %self.name, path = %self.config.path.display(), "FileSink closed");
        Ok(())
    }
}
