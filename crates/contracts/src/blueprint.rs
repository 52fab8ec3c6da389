//! IngestBlueprint - Config Loader 输出
//!
//! 描述完整的采集配置：管道参数、抓取策略、去重、批处理、数据源与输出路由。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::{ContractError, RetryPolicy};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的采集配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 管道全局参数
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// 抓取参数
    #[serde(default)]
    pub fetcher: FetcherSettings,

    /// 去重参数
    #[serde(default)]
    pub dedup: DedupSettings,

    /// 微批参数
    #[serde(default)]
    pub batch: BatchSettings,

    /// Sink 写入重试策略
    #[serde(default)]
    pub sink_retry: RetryPolicy,

    /// 隔离区 / 死信存储
    #[serde(default)]
    pub audit: AuditSettings,

    /// 数据源列表
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// 输出路由
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// 管道全局参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// 读数最大允许年龄 (秒)
    pub staleness_secs: u64,

    /// 允许的时钟偏差 (秒)
    pub max_clock_skew_secs: u64,

    /// 工作池大小上限
    pub max_workers: usize,

    /// SourceConfig 刷新间隔 (秒)
    pub config_refresh_secs: u64,

    /// 优雅关闭硬超时 (秒)
    pub shutdown_deadline_secs: u64,

    /// 变化率评分保留的传感器数上限
    pub history_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            staleness_secs: 3_600,
            max_clock_skew_secs: 60,
            max_workers: 8,
            config_refresh_secs: 60,
            shutdown_deadline_secs: 10,
            history_capacity: 10_000,
        }
    }
}

impl PipelineSettings {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn max_clock_skew(&self) -> Duration {
        Duration::from_secs(self.max_clock_skew_secs)
    }

    pub fn config_refresh(&self) -> Duration {
        Duration::from_secs(self.config_refresh_secs)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_secs)
    }
}

/// 抓取参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherSettings {
    /// 单次请求超时 (秒)
    pub timeout_secs: u64,

    /// 上游失败重试策略
    pub retry: RetryPolicy,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

impl FetcherSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 去重参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupSettings {
    /// 去重 TTL (秒)，默认取最长轮询间隔的 2 倍
    pub ttl_secs: Option<u64>,

    /// TTL 上限 (秒)
    pub max_ttl_secs: u64,

    /// 内存硬上限 (条目数)
    pub max_entries: usize,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            ttl_secs: None,
            max_ttl_secs: 86_400,
            max_entries: 500_000,
        }
    }
}

/// 微批参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// 批大小上限
    pub max_size: usize,

    /// 批等待上限 (毫秒)
    pub max_wait_ms: u64,

    /// 发布队列容量
    pub queue_capacity: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_wait_ms: 5_000,
            queue_capacity: 1_024,
        }
    }
}

impl BatchSettings {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// 隔离区与死信文件路径
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// 被拒读数的隔离记录 (JSONL)
    pub quarantine_path: PathBuf,

    /// 写入失败批次的死信记录 (JSONL)
    pub dead_letter_path: PathBuf,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            quarantine_path: PathBuf::from("data/quarantine.jsonl"),
            dead_letter_path: PathBuf::from("data/dead_letter.jsonl"),
        }
    }
}

/// 数据源配置
///
/// 由 Scheduler 持有，启动时及刷新周期读取，管道 worker 只读。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// 唯一标识符
    pub id: String,

    /// 适配器类型 (e.g., "purpleair")
    pub source_type: String,

    /// 轮询间隔 (秒)
    pub interval_secs: u64,

    /// 凭据所在的环境变量名
    #[serde(default)]
    pub credentials_env: Option<String>,

    /// 每个间隔允许的并发请求数
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// 上游上报分辨率 (秒)，用于去重 key 截断
    #[serde(default = "default_reporting_resolution")]
    pub reporting_resolution_secs: u64,

    /// API 根地址
    #[serde(default)]
    pub endpoint: Option<String>,

    /// 适配器特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_concurrency() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

fn default_reporting_resolution() -> u64 {
    60
}

impl SourceConfig {
    /// 最小可用配置
    pub fn new(id: impl Into<String>, source_type: impl Into<String>, interval_secs: u64) -> Self {
        Self {
            id: id.into(),
            source_type: source_type.into(),
            interval_secs,
            credentials_env: None,
            concurrency: default_concurrency(),
            enabled: default_enabled(),
            reporting_resolution_secs: default_reporting_resolution(),
            endpoint: None,
            params: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn reporting_resolution(&self) -> Duration {
        Duration::from_secs(self.reporting_resolution_secs.max(1))
    }
}

/// Sink 在管道中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkRole {
    /// 消息总线 (按 sensor_id 分区)
    MessageBus,
    /// 时序库
    TimeSeries,
}

/// Sink 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// 角色
    pub role: SinkRole,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量 (批次数)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    64
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// 本地文件 (JSONL / line protocol)
    File,
    /// HTTP 消息总线 (Kafka REST proxy)
    Http,
    /// InfluxDB v2 HTTP 写入
    Influxdb,
}

impl IngestBlueprint {
    /// 已启用的数据源
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|source| source.enabled)
    }

    /// 最长轮询间隔
    pub fn longest_interval(&self) -> Duration {
        self.enabled_sources()
            .map(SourceConfig::interval)
            .max()
            .unwrap_or_default()
    }

    /// 实际使用的去重 TTL
    ///
    /// 未显式配置时取最长轮询间隔的 2 倍，并受 `max_ttl_secs` 约束。
    pub fn effective_dedup_ttl(&self) -> Duration {
        let cap = Duration::from_secs(self.dedup.max_ttl_secs);
        let ttl = match self.dedup.ttl_secs {
            Some(secs) => Duration::from_secs(secs),
            None => (self.longest_interval() * 2).max(Duration::from_secs(60)),
        };
        ttl.min(cap)
    }

    /// 校验后的去重 TTL
    ///
    /// TTL 必须 >= 2 × 最长轮询间隔；未显式配置时，若该下限超过
    /// `max_ttl_secs` 会被截断，同样视为错误。
    pub fn checked_dedup_ttl(&self) -> Result<Duration, ContractError> {
        let floor = self.longest_interval() * 2;
        let max_ttl_secs = self.dedup.max_ttl_secs;
        match self.dedup.ttl_secs {
            Some(ttl_secs) => {
                if Duration::from_secs(ttl_secs) < floor {
                    return Err(ContractError::config_validation(
                        "dedup.ttl_secs",
                        format!(
                            "ttl_secs ({ttl_secs}) must be >= 2x the longest polling interval ({}s)",
                            floor.as_secs()
                        ),
                    ));
                }
                if ttl_secs > max_ttl_secs {
                    return Err(ContractError::config_validation(
                        "dedup.ttl_secs",
                        format!("ttl_secs ({ttl_secs}) must be <= max_ttl_secs ({max_ttl_secs})"),
                    ));
                }
            }
            None if floor > Duration::from_secs(max_ttl_secs) => {
                return Err(ContractError::config_validation(
                    "dedup.max_ttl_secs",
                    format!(
                        "2x the longest polling interval ({}s) exceeds max_ttl_secs ({max_ttl_secs})",
                        floor.as_secs()
                    ),
                ));
            }
            None => {}
        }
        Ok(self.effective_dedup_ttl())
    }

    /// 按名称查找数据源
    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|source| source.id == id)
    }
}
