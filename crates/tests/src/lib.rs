//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟 e2e 测试（scripted adapter → scheduler → publisher → sinks，无需网络）
//! - 调度行为：退避隔离、认证降级、配置刷新、关闭

#[cfg(test)]
mod support;

#[cfg(test)]
mod e2e;

#[cfg(test)]
mod scheduling;

#[cfg(test)]
mod contract_tests {
    use contracts::{CanonicalReading, FetchError, SourceAdapter, SourceConfig};

    #[test]
    fn test_config_version_default() {
        assert_eq!(contracts::ConfigVersion::default(), contracts::ConfigVersion::V1);
    }

    #[test]
    fn test_fetch_error_kinds() {
        assert!(FetchError::unavailable("pa", "503").is_retryable());
        assert!(FetchError::rate_limited("pa", None).is_retryable());
        assert!(!FetchError::auth("pa", 401).is_retryable());
        assert_eq!(FetchError::auth("pa", 403).kind(), "upstream_auth_error");
    }

    #[test]
    fn test_canonical_reading_json_shape() {
        let now = chrono::Utc::now();
        let record = ingestion::MockReading::new("s1", now)
            .at(47.6, -122.3)
            .with("pm25", 12.5)
            .into_record("pa-west");
        let reading: CanonicalReading = ingestion::ScriptedAdapter::new("pa-west")
            .transform(&record)
            .unwrap();

        let value = serde_json::to_value(&reading).unwrap();
        for key in ["sensor_id", "timestamp", "location", "measurements", "source_metadata", "quality_flags"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["measurements"]["pm25"], 12.5);
        assert_eq!(value["source_metadata"]["source_id"], "pa-west");
    }

    #[test]
    fn test_source_config_new_defaults() {
        let source = SourceConfig::new("pa", "purpleair", 120);
        assert!(source.enabled);
        assert_eq!(source.concurrency, 1);
    }
}
