//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacity > 0, ordered sleep bounds, probabilities)
//! - Check that endpoints and addresses are well-formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Reachability of endpoints is not checked; export failures are runtime errors
//! - The OTLP endpoint is checked when exporters are built, where a bad value
//!   disables export instead of aborting

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::AppConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: `{value}` is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: `{value}` is not a valid URL")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("workload.hello_failure_rate must be within [0, 1], got {0}")]
    FailureRate(f64),

    #[error("generator.min_sleep_ms ({min}) exceeds generator.max_sleep_ms ({max})")]
    SleepRange { min: u64, max: u64 },

    #[error("workload.cpu_default_ms ({default}) exceeds workload.cpu_max_ms ({max})")]
    CpuRange { default: u64, max: u64 },

    #[error("telemetry.service_name must not be empty")]
    EmptyServiceName,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.profiling.enabled {
        check_url(
            &mut errors,
            "profiling.server_address",
            &config.profiling.server_address,
        );
    }
    if let (true, Some(target)) = (
        config.generator.enabled,
        &config.generator.target_base_url,
    ) {
        check_url(&mut errors, "generator.target_base_url", target);
    }

    if config.telemetry.service_name.trim().is_empty() {
        errors.push(ValidationError::EmptyServiceName);
    }

    let workload = &config.workload;
    if !(0.0..=1.0).contains(&workload.hello_failure_rate) {
        errors.push(ValidationError::FailureRate(workload.hello_failure_rate));
    }
    for (field, value) in [
        ("workload.retention_capacity", workload.retention_capacity),
        ("workload.alloc_chunk_size", workload.alloc_chunk_size),
        ("workload.alloc_chunk_count", workload.alloc_chunk_count),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }
    if workload.cpu_max_ms == 0 {
        errors.push(ValidationError::Zero { field: "workload.cpu_max_ms" });
    }
    if workload.cpu_default_ms > workload.cpu_max_ms {
        errors.push(ValidationError::CpuRange {
            default: workload.cpu_default_ms,
            max: workload.cpu_max_ms,
        });
    }

    let generator = &config.generator;
    if generator.min_sleep_ms > generator.max_sleep_ms {
        errors.push(ValidationError::SleepRange {
            min: generator.min_sleep_ms,
            max: generator.max_sleep_ms,
        });
    }
    if generator.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "generator.request_timeout_secs" });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    let well_formed = Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false);
    if !well_formed {
        errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        });
    }
}
