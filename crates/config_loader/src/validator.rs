//! 配置校验模块
//!
//! 校验规则：
//! - source id 唯一且非空
//! - interval_secs / concurrency / reporting_resolution_secs > 0
//! - 重试策略合法 (jitter < factor - 1，保证退避时延单调不减)
//! - 去重 TTL >= 2 × 最长轮询间隔，且不超过上限
//! - sink 名称唯一、必填参数齐全、类型与角色匹配

use std::collections::HashSet;

use contracts::{ContractError, IngestBlueprint, RetryPolicy, SinkRole, SinkType, SourceConfig};

/// 校验 IngestBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &IngestBlueprint) -> Result<(), ContractError> {
    validate_pipeline(blueprint)?;
    validate_sources(&blueprint.sources)?;
    validate_retry("fetcher.retry", &blueprint.fetcher.retry)?;
    validate_retry("sink_retry", &blueprint.sink_retry)?;
    validate_batch(blueprint)?;
    validate_dedup(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// 校验管道全局参数
fn validate_pipeline(blueprint: &IngestBlueprint) -> Result<(), ContractError> {
    let pipeline = &blueprint.pipeline;
    if pipeline.max_workers == 0 {
        return Err(ContractError::config_validation(
            "pipeline.max_workers",
            "max_workers must be > 0",
        ));
    }
    if pipeline.config_refresh_secs == 0 {
        return Err(ContractError::config_validation(
            "pipeline.config_refresh_secs",
            "config_refresh_secs must be > 0",
        ));
    }
    if blueprint.fetcher.timeout_secs == 0 {
        return Err(ContractError::config_validation(
            "fetcher.timeout_secs",
            "timeout_secs must be > 0",
        ));
    }
    Ok(())
}

/// 校验数据源列表 (元数据刷新时也会单独调用)
pub fn validate_sources(sources: &[SourceConfig]) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, source) in sources.iter().enumerate() {
        if source.id.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("sources[{idx}].id"),
                "source id cannot be empty",
            ));
        }
        if !seen.insert(source.id.as_str()) {
            return Err(ContractError::config_validation(
                format!("sources[id={}]", source.id),
                "duplicate source id",
            ));
        }
        if source.source_type.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("sources[{}].source_type", source.id),
                "source_type cannot be empty",
            ));
        }
        if source.interval_secs == 0 {
            return Err(ContractError::config_validation(
                format!("sources[{}].interval_secs", source.id),
                "interval_secs must be > 0",
            ));
        }
        if source.concurrency == 0 {
            return Err(ContractError::config_validation(
                format!("sources[{}].concurrency", source.id),
                "concurrency must be >= 1",
            ));
        }
        if source.reporting_resolution_secs == 0 {
            return Err(ContractError::config_validation(
                format!("sources[{}].reporting_resolution_secs", source.id),
                "reporting_resolution_secs must be > 0",
            ));
        }
    }
    Ok(())
}

/// 校验重试策略
fn validate_retry(field: &str, policy: &RetryPolicy) -> Result<(), ContractError> {
    if policy.max_attempts == 0 {
        return Err(ContractError::config_validation(
            format!("{field}.max_attempts"),
            "max_attempts must be >= 1",
        ));
    }
    if policy.factor.is_nan() || policy.factor < 1.0 {
        return Err(ContractError::config_validation(
            format!("{field}.factor"),
            format!("factor must be >= 1, got {}", policy.factor),
        ));
    }
    if policy.base_delay_ms > policy.max_delay_ms {
        return Err(ContractError::config_validation(
            format!("{field}.base_delay_ms / {field}.max_delay_ms"),
            format!(
                "base_delay_ms ({}) must be <= max_delay_ms ({})",
                policy.base_delay_ms, policy.max_delay_ms
            ),
        ));
    }
    let jitter_limit = if policy.factor > 1.0 {
        policy.factor - 1.0
    } else {
        0.0
    };
    if policy.jitter < 0.0 || (policy.jitter > 0.0 && policy.jitter >= jitter_limit) {
        return Err(ContractError::config_validation(
            format!("{field}.jitter"),
            format!(
                "jitter must be in [0, factor - 1), got {} with factor {}",
                policy.jitter, policy.factor
            ),
        ));
    }
    Ok(())
}

/// 校验微批参数
fn validate_batch(blueprint: &IngestBlueprint) -> Result<(), ContractError> {
    let batch = &blueprint.batch;
    if batch.max_size == 0 {
        return Err(ContractError::config_validation(
            "batch.max_size",
            "max_size must be > 0",
        ));
    }
    if batch.max_wait_ms == 0 {
        return Err(ContractError::config_validation(
            "batch.max_wait_ms",
            "max_wait_ms must be > 0",
        ));
    }
    if batch.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "batch.queue_capacity",
            "queue_capacity must be > 0",
        ));
    }
    Ok(())
}

/// 校验去重参数
fn validate_dedup(blueprint: &IngestBlueprint) -> Result<(), ContractError> {
    let dedup = &blueprint.dedup;
    if dedup.max_entries == 0 {
        return Err(ContractError::config_validation(
            "dedup.max_entries",
            "max_entries must be > 0",
        ));
    }

    blueprint.checked_dedup_ttl()?;
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &IngestBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }

        let required = match sink.sink_type {
            SinkType::Log => None,
            SinkType::File => Some("path"),
            SinkType::Http | SinkType::Influxdb => Some("url"),
        };
        if let Some(param) = required {
            if !sink.params.contains_key(param) {
                return Err(ContractError::config_validation(
                    format!("sinks[{}].params.{param}", sink.name),
                    format!("'{param}' is required for {:?} sinks", sink.sink_type),
                ));
            }
        }

        let role_mismatch = matches!(
            (sink.sink_type, sink.role),
            (SinkType::Http, SinkRole::TimeSeries) | (SinkType::Influxdb, SinkRole::MessageBus)
        );
        if role_mismatch {
            return Err(ContractError::config_validation(
                format!("sinks[{}].role", sink.name),
                format!(
                    "sink_type {:?} cannot serve role {:?}",
                    sink.sink_type, sink.role
                ),
            ));
        }
    }
    Ok(())
}
