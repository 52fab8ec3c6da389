//! 污染物量程表
//!
//! 硬量程用于校验 (超出即拒绝)，软阈值与变化率阈值用于异常评分。

use contracts::pollutant;

/// 单个测量项的硬量程
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollutantRange {
    pub key: &'static str,
    /// 问题描述中使用的名称
    pub display: &'static str,
    pub min: f64,
    pub max: f64,
}

impl PollutantRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

const fn range(key: &'static str, display: &'static str, min: f64, max: f64) -> PollutantRange {
    PollutantRange {
        key,
        display,
        min,
        max,
    }
}

/// 已知测量项的硬量程
pub const HARD_RANGES: [PollutantRange; 10] = [
    range(pollutant::PM1, "PM1", 0.0, 1000.0),
    range(pollutant::PM25, "PM2.5", 0.0, 1000.0),
    range(pollutant::PM10, "PM10", 0.0, 2000.0),
    range(pollutant::TEMPERATURE, "Temperature", -50.0, 60.0),
    range(pollutant::HUMIDITY, "Humidity", 0.0, 100.0),
    range(pollutant::PRESSURE, "Pressure", 800.0, 1100.0),
    range(pollutant::NO2, "NO2", 0.0, 2000.0),
    range(pollutant::O3, "O3", 0.0, 1000.0),
    range(pollutant::CO, "CO", 0.0, 1000.0),
    range(pollutant::SO2, "SO2", 0.0, 1000.0),
];

/// 查找硬量程，未知测量项返回 None
pub fn hard_range(key: &str) -> Option<&'static PollutantRange> {
    HARD_RANGES.iter().find(|r| r.key == key)
}

/// 展示名称，未知测量项原样返回
pub fn display_name(key: &str) -> &str {
    hard_range(key).map(|r| r.display).unwrap_or(key)
}

/// 软阈值: 超出区间即贡献固定分数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftThreshold {
    pub key: &'static str,
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub weight: f64,
}

impl SoftThreshold {
    pub fn exceeded(&self, value: f64) -> bool {
        self.low.is_some_and(|low| value < low) || self.high.is_some_and(|high| value > high)
    }
}

pub const SOFT_THRESHOLDS: [SoftThreshold; 4] = [
    SoftThreshold {
        key: pollutant::PM25,
        low: None,
        high: Some(500.0),
        weight: 0.5,
    },
    SoftThreshold {
        key: pollutant::PM10,
        low: None,
        high: Some(1000.0),
        weight: 0.5,
    },
    SoftThreshold {
        key: pollutant::PM1,
        low: None,
        high: Some(500.0),
        weight: 0.5,
    },
    SoftThreshold {
        key: pollutant::TEMPERATURE,
        low: Some(-20.0),
        high: Some(50.0),
        weight: 0.3,
    },
];

/// 每分钟变化率阈值
pub const RATE_THRESHOLDS: [(&str, f64); 5] = [
    (pollutant::PM25, 50.0),
    (pollutant::PM10, 100.0),
    (pollutant::PM1, 50.0),
    (pollutant::TEMPERATURE, 5.0),
    (pollutant::HUMIDITY, 20.0),
];
