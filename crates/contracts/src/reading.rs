//! CanonicalReading - 管道内的统一数据单元
//!
//! Adapter 负责从上游原始载荷构造，Validator / Scorer 各写入一次
//! `quality_flags`，之后只读。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 标准测量项名称
pub mod pollutant {
    pub const PM1: &str = "pm1";
    pub const PM25: &str = "pm25";
    pub const PM10: &str = "pm10";
    pub const TEMPERATURE: &str = "temperature";
    pub const HUMIDITY: &str = "humidity";
    pub const PRESSURE: &str = "pressure";
    pub const NO2: &str = "no2";
    pub const O3: &str = "o3";
    pub const CO: &str = "co";
    pub const SO2: &str = "so2";
}

/// 标准化空气质量读数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalReading {
    /// 传感器 ID (稳定、非空)
    pub sensor_id: String,

    /// 采样时间 (UTC)
    pub timestamp: DateTime<Utc>,

    /// 位置
    pub location: Location,

    /// 测量值: 污染物名 -> 数值
    ///
    /// BTreeMap 保证序列化顺序稳定。
    pub measurements: BTreeMap<String, f64>,

    /// 来源元数据
    pub source_metadata: SourceMetadata,

    /// 质量标记 (仅由管道写入)
    #[serde(default)]
    pub quality_flags: QualityFlags,
}

/// 位置
///
/// 经纬度在 transform 阶段可以缺失，由 Validator 判定。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// 纬度 (度)
    pub lat: Option<f64>,

    /// 经度 (度)
    pub lon: Option<f64>,

    /// 站点名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat: Some(lat),
            lon: Some(lon),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// 来源元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// 产生该读数的 source 配置 ID
    #[serde(default)]
    pub source_id: String,

    /// 厂商
    pub manufacturer: String,

    /// 型号
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// 质量标记
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityFlags {
    /// 是否通过全部校验
    pub validated: bool,

    /// 异常分数 [0, 1]
    pub anomaly_score: f64,

    /// 校验问题列表 (按检查顺序)
    #[serde(default)]
    pub issues: Vec<String>,
}

impl CanonicalReading {
    /// 读取单个测量值
    pub fn measurement(&self, name: &str) -> Option<f64> {
        self.measurements.get(name).copied()
    }

    /// 写入校验结果
    pub fn with_validation(mut self, issues: Vec<String>) -> Self {
        self.quality_flags.validated = issues.is_empty();
        self.quality_flags.issues = issues;
        self
    }

    /// 写入异常分数 (截断到 [0, 1])
    pub fn with_anomaly_score(mut self, score: f64) -> Self {
        self.quality_flags.anomaly_score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// 产生该读数的 source ID
    pub fn source_id(&self) -> &str {
        &self.source_metadata.source_id
    }
}
