//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the demo
//! service. All types derive Serde traits for deserialization from config
//! files, and every field has a default so an empty file is a valid config.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Root configuration for the demo service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// OTLP export and resource identity.
    pub telemetry: TelemetryConfig,

    /// Continuous profiling client.
    pub profiling: ProfilingConfig,

    /// Fault-injection workload tuning.
    pub workload: WorkloadConfig,

    /// Background traffic generator.
    pub generator: GeneratorConfig,

    /// Process diagnostics (logging, local metrics).
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// OTLP export configuration and the static resource attributes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Collector base URL. Per-signal paths are appended to it.
    pub otlp_endpoint: String,

    /// Timeout for a single export call in seconds.
    pub export_timeout_secs: u64,

    /// Upper bound on the final flush during shutdown in seconds.
    pub shutdown_timeout_secs: u64,

    /// `service.name` resource attribute.
    pub service_name: String,

    /// `service.version` resource attribute.
    pub service_version: String,

    /// `job` label, aligned with the log and metrics stores.
    pub job: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: "http://localhost:4318".to_string(),
            export_timeout_secs: 10,
            shutdown_timeout_secs: 5,
            service_name: "demo-app".to_string(),
            service_version: "1.0.0".to_string(),
            job: "demo-app".to_string(),
        }
    }
}

/// Signals exported over OTLP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    fn path(self) -> &'static str {
        match self {
            Signal::Traces => "v1/traces",
            Signal::Metrics => "v1/metrics",
            Signal::Logs => "v1/logs",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        })
    }
}

impl TelemetryConfig {
    /// Full OTLP/HTTP URL for one signal.
    pub fn signal_endpoint(&self, signal: Signal) -> String {
        format!("{}/{}", self.otlp_endpoint.trim_end_matches('/'), signal.path())
    }
}

/// Continuous profiling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// Start the profiling agent.
    pub enabled: bool,

    /// Profiling server address.
    pub server_address: String,

    /// Application name shown by the profiling UI.
    pub application_name: String,

    /// Sampling frequency in Hz.
    pub sample_rate: u32,

    /// Static tags attached to every profile.
    pub tags: BTreeMap<String, String>,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_address: "http://localhost:4040".to_string(),
            application_name: "demo-app".to_string(),
            sample_rate: 100,
            tags: BTreeMap::from([("env".to_string(), "dev".to_string())]),
        }
    }
}

/// Workload tuning for the fault-injection handlers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Upper bound (exclusive) of the `/hello` sleep in milliseconds.
    pub hello_max_delay_ms: u64,

    /// Probability that `/hello` answers 500.
    pub hello_failure_rate: f64,

    /// Regex iterations for `/slow` when no `loops` parameter is given.
    pub slow_iterations: u32,

    /// Default burn duration for `/cpu` in milliseconds.
    pub cpu_default_ms: u64,

    /// Largest burn duration `/cpu` accepts in milliseconds.
    pub cpu_max_ms: u64,

    /// Size of one chunk allocated by `/alloc`, in bytes.
    pub alloc_chunk_size: usize,

    /// Chunks per `/alloc` call.
    pub alloc_chunk_count: usize,

    /// Maximum number of blocks kept by the retention buffer.
    pub retention_capacity: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            hello_max_delay_ms: 50,
            hello_failure_rate: 0.05,
            slow_iterations: 5000,
            cpu_default_ms: 3000,
            cpu_max_ms: 30_000,
            alloc_chunk_size: 256 * 1024,
            alloc_chunk_count: 200,
            retention_capacity: 20,
        }
    }
}

impl WorkloadConfig {
    /// Bytes allocated by one `/alloc` call.
    pub fn alloc_block_size(&self) -> usize {
        self.alloc_chunk_size.saturating_mul(self.alloc_chunk_count)
    }

    /// Nominal ceiling of retained memory.
    pub fn retained_bytes_bound(&self) -> usize {
        self.alloc_block_size().saturating_mul(self.retention_capacity)
    }
}

/// Background traffic generator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Run the generator loop.
    pub enabled: bool,

    /// Base URL the generator calls (the `/slow` route is appended). Unset
    /// means this process's own listener, reached over loopback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_base_url: Option<String>,

    /// Regex iterations run inside the generator's own span.
    pub local_iterations: u32,

    /// Lower bound of the pause between iterations in milliseconds.
    pub min_sleep_ms: u64,

    /// Upper bound (exclusive) of the pause between iterations in milliseconds.
    pub max_sleep_ms: u64,

    /// Deadline for the downstream call in seconds.
    pub request_timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_base_url: None,
            local_iterations: 5000,
            min_sleep_ms: 100,
            max_sleep_ms: 600,
            request_timeout_secs: 30,
        }
    }
}

impl GeneratorConfig {
    /// Base URL to call given the address the listener actually bound.
    pub fn target_for(&self, listen_addr: SocketAddr) -> String {
        if let Some(url) = &self.target_base_url {
            return url.clone();
        }
        let ip = match listen_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        format!("http://{}", SocketAddr::new(ip, listen_addr.port()))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration for process diagnostics.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
