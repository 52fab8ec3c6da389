//! Mock 数据源
//!
//! 无网络环境下的测试与演示用 adapter:
//! - `ScriptedAdapter`: 按脚本逐次返回批次或错误，并记录调用
//! - `SyntheticAdapter`: 随机生成读数，可注入故障 (`source_type = "mock"`)

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use contracts::{
    pollutant, CanonicalReading, Cursor, FetchBatch, FetchError, Location, MalformedRecord,
    RawRecord, SourceAdapter, SourceConfig, SourceMetadata,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{IngestionError, Result};

/// Mock payload 格式
///
/// 两种 mock adapter 共用，`transform` 直接反序列化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockReading {
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub measurements: BTreeMap<String, f64>,
}

impl MockReading {
    pub fn new(sensor_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            lat: None,
            lon: None,
            name: None,
            measurements: BTreeMap::new(),
        }
    }

    /// 设置坐标
    pub fn at(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    /// 添加一个测量值
    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.measurements.insert(key.to_string(), value);
        self
    }

    /// 包装为 RawRecord
    pub fn into_record(self, source_id: &str) -> RawRecord {
        let payload = serde_json::to_value(&self).unwrap_or_default();
        RawRecord::new(source_id, payload)
    }
}

fn transform_mock(
    source_id: &str,
    manufacturer: &str,
    record: &RawRecord,
) -> std::result::Result<CanonicalReading, MalformedRecord> {
    let mock: MockReading = serde_json::from_value(record.payload.clone())
        .map_err(|e| MalformedRecord::new(source_id, e.to_string()))?;
    if mock.sensor_id.trim().is_empty() {
        return Err(MalformedRecord::new(source_id, "missing sensor_id"));
    }
    if mock.measurements.is_empty() {
        return Err(MalformedRecord::new(source_id, "no measurements"));
    }

    Ok(CanonicalReading {
        sensor_id: mock.sensor_id,
        timestamp: mock.timestamp,
        location: Location {
            lat: mock.lat,
            lon: mock.lon,
            name: mock.name,
        },
        measurements: mock.measurements,
        source_metadata: SourceMetadata {
            source_id: source_id.to_string(),
            manufacturer: manufacturer.to_string(),
            model: None,
        },
        quality_flags: Default::default(),
    })
}

// ============================================================================
// ScriptedAdapter
// ============================================================================

/// 脚本化 adapter
///
/// 每次 `fetch` 弹出一个脚本步骤；脚本耗尽后返回 fallback (默认空批次)。
pub struct ScriptedAdapter {
    source_id: String,
    script: Mutex<VecDeque<std::result::Result<FetchBatch, FetchError>>>,
    fallback: std::result::Result<FetchBatch, FetchError>,
    delay: Option<Duration>,
    calls: Mutex<Vec<ScriptedCall>>,
}

/// 一次 fetch 调用记录
#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub cursor: Option<Cursor>,
    pub at: Instant,
}

impl ScriptedAdapter {
    pub const MANUFACTURER: &'static str = "Scripted";

    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(FetchBatch::empty()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 追加一个成功批次
    pub fn then_batch(self, records: Vec<RawRecord>, next_cursor: Option<&str>) -> Self {
        self.push(Ok(FetchBatch::new(records, next_cursor.map(Cursor::new))))
    }

    /// 追加 mock 读数批次
    pub fn then_readings(self, readings: Vec<MockReading>, next_cursor: Option<&str>) -> Self {
        let records = readings
            .into_iter()
            .map(|r| r.into_record(&self.source_id))
            .collect();
        self.then_batch(records, next_cursor)
    }

    /// 追加一个失败
    pub fn then_fail(self, err: FetchError) -> Self {
        self.push(Err(err))
    }

    /// 脚本耗尽后的返回值
    pub fn otherwise(mut self, result: std::result::Result<FetchBatch, FetchError>) -> Self {
        self.fallback = result;
        self
    }

    /// 每次调用前等待
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(self, step: std::result::Result<FetchBatch, FetchError>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(step);
        self
    }

    /// 调用次数
    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    /// 全部调用记录
    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.lock_calls().clone()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<ScriptedCall>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn manufacturer(&self) -> &str {
        Self::MANUFACTURER
    }

    async fn fetch(&self, cursor: Option<&Cursor>) -> std::result::Result<FetchBatch, FetchError> {
        self.lock_calls().push(ScriptedCall {
            cursor: cursor.cloned(),
            at: Instant::now(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        trace!(source_id = %self.source_id, scripted = step.is_some(), "scripted fetch");
        step.unwrap_or_else(|| self.fallback.clone())
    }

    fn transform(&self, record: &RawRecord) -> std::result::Result<CanonicalReading, MalformedRecord> {
        transform_mock(&self.source_id, Self::MANUFACTURER, record)
    }
}

// ============================================================================
// SyntheticAdapter
// ============================================================================

/// 合成数据源配置
///
/// 从 `SourceConfig.params` 读取。
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    /// 传感器数量
    pub sensors: usize,
    /// 中心坐标
    pub lat: f64,
    pub lon: f64,
    /// PM2.5 尖峰概率 (每条读数)
    pub spike_rate: f64,
    /// UpstreamUnavailable 概率 (每次 fetch)
    pub failure_rate: f64,
    /// UpstreamRateLimited 概率 (每次 fetch)
    pub rate_limit_rate: f64,
    /// 始终返回 UpstreamAuthError
    pub auth_failure: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sensors: 3,
            lat: 47.61,
            lon: -122.33,
            spike_rate: 0.0,
            failure_rate: 0.0,
            rate_limit_rate: 0.0,
            auth_failure: false,
        }
    }
}

impl SyntheticConfig {
    pub fn from_source(source: &SourceConfig) -> Result<Self> {
        let mut config = Self::default();
        let params = &source.params;
        if let Some(v) = params.get("sensors") {
            config.sensors = parse_param(source, "sensors", v)?;
        }
        if let Some(v) = params.get("lat") {
            config.lat = parse_param(source, "lat", v)?;
        }
        if let Some(v) = params.get("lon") {
            config.lon = parse_param(source, "lon", v)?;
        }
        for (key, slot) in [
            ("spike_rate", &mut config.spike_rate),
            ("failure_rate", &mut config.failure_rate),
            ("rate_limit_rate", &mut config.rate_limit_rate),
        ] {
            if let Some(v) = params.get(key) {
                let rate: f64 = parse_param(source, key, v)?;
                if !(0.0..=1.0).contains(&rate) {
                    return Err(IngestionError::invalid_param(&source.id, key, "must be in [0, 1]"));
                }
                *slot = rate;
            }
        }
        if let Some(v) = params.get("auth_failure") {
            config.auth_failure = parse_param(source, "auth_failure", v)?;
        }
        Ok(config)
    }
}

fn parse_param<T: std::str::FromStr>(source: &SourceConfig, key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| IngestionError::invalid_param(&source.id, key, e.to_string()))
}

/// 合成数据 adapter
pub struct SyntheticAdapter {
    source_id: String,
    config: SyntheticConfig,
}

impl SyntheticAdapter {
    pub const MANUFACTURER: &'static str = "Synthetic";

    pub fn new(source_id: impl Into<String>, config: SyntheticConfig) -> Self {
        Self {
            source_id: source_id.into(),
            config,
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// 生成一轮读数或注入的故障
    fn generate(&self) -> std::result::Result<FetchBatch, FetchError> {
        let mut rng = rand::rng();
        if self.config.auth_failure {
            return Err(FetchError::auth(&self.source_id, 401));
        }
        if rng.random_bool(self.config.failure_rate) {
            return Err(FetchError::unavailable(&self.source_id, "injected failure"));
        }
        if rng.random_bool(self.config.rate_limit_rate) {
            return Err(FetchError::rate_limited(&self.source_id, None));
        }

        let now = Utc::now().trunc_subsecs(0);
        let records = (0..self.config.sensors)
            .map(|i| {
                let offset = i as f64 * 0.01;
                let pm25 = if rng.random_bool(self.config.spike_rate) {
                    rng.random_range(550.0..900.0)
                } else {
                    rng.random_range(2.0..35.0)
                };
                MockReading::new(format!("{}-{i:03}", self.source_id), now)
                    .at(self.config.lat + offset, self.config.lon - offset)
                    .with(pollutant::PM25, pm25)
                    .with(pollutant::PM10, pm25 * rng.random_range(1.2..1.8))
                    .with(pollutant::TEMPERATURE, rng.random_range(8.0..26.0))
                    .with(pollutant::HUMIDITY, rng.random_range(30.0..80.0))
                    .into_record(&self.source_id)
            })
            .collect();

        Ok(FetchBatch::new(records, Some(Cursor::new(now.to_rfc3339()))))
    }
}

#[async_trait]
impl SourceAdapter for SyntheticAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn manufacturer(&self) -> &str {
        Self::MANUFACTURER
    }

    async fn fetch(&self, _cursor: Option<&Cursor>) -> std::result::Result<FetchBatch, FetchError> {
        let result = self.generate();
        if let Ok(batch) = &result {
            debug!(source_id = %self.source_id, records = batch.len(), "synthetic batch generated");
        }
        result
    }

    fn transform(&self, record: &RawRecord) -> std::result::Result<CanonicalReading, MalformedRecord> {
        transform_mock(&self.source_id, Self::MANUFACTURER, record)
    }
}
