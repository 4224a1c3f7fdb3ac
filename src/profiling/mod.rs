//! Continuous profiling and trace correlation.
//!
//! # Data Flow
//! ```text
//! ProfiledTracer (correlator.rs)
//!     → span built → `pyroscope.profile.id` attribute
//!     → scope entered → labels.rs pushes `span_id` label for this thread
//!     → ProfileTagSink → agent.rs (pyroscope thread tags)
//!
//! Sampler (agent.rs, feature `pyroscope`)
//!     → samples every thread at `sample_rate` Hz
//!     → samples inherit the thread's active label
//! ```
//!
//! # Design Decisions
//! - Labels are thread-scoped because the sampler is
//! - Futures re-attach their label on every poll
//! - A failed agent start is not fatal; correlation still runs locally

#[cfg(feature = "pyroscope")]
pub mod agent;
pub mod correlator;
pub mod labels;

use thiserror::Error;

pub use correlator::{Profiled, ProfiledTracer, PROFILE_ID_ATTRIBUTE};
pub use labels::{
    current_correlation, CorrelationId, LabelGuard, NoopSink, ProfileLabels, ProfileTagSink,
    PROFILE_LABEL_KEY,
};

use crate::config::ProfilingConfig;

#[derive(Debug, Error)]
pub enum ProfilingError {
    #[error("profiling agent error: {0}")]
    Agent(String),
}

/// Handle to whatever profiling backend is running.
pub struct Profiling {
    labels: ProfileLabels,
    #[cfg(feature = "pyroscope")]
    agent: Option<agent::ProfilingAgent>,
}

impl Profiling {
    /// Start the profiling agent when enabled. Failures are logged and
    /// leave a label-only setup behind.
    pub fn start(config: &ProfilingConfig) -> Self {
        if !config.enabled {
            tracing::info!("Profiling disabled");
            return Self::disabled();
        }

        Self::start_agent(config)
    }

    #[cfg(feature = "pyroscope")]
    fn start_agent(config: &ProfilingConfig) -> Self {
        match agent::ProfilingAgent::start(config) {
            Ok((agent, sink)) => Self {
                labels: ProfileLabels::new(sink),
                agent: Some(agent),
            },
            Err(err) => {
                tracing::error!(error = %err, "Failed to start profiling agent");
                Self::disabled()
            }
        }
    }

    #[cfg(not(feature = "pyroscope"))]
    fn start_agent(_config: &ProfilingConfig) -> Self {
        tracing::warn!("Built without the `pyroscope` feature; profiles are not pushed");
        Self::disabled()
    }

    /// A handle that attaches no labels and pushes nothing.
    pub fn disabled() -> Self {
        Self {
            labels: ProfileLabels::disabled(),
            #[cfg(feature = "pyroscope")]
            agent: None,
        }
    }

    /// Label sink shared with the tracer.
    pub fn labels(&self) -> ProfileLabels {
        self.labels.clone()
    }

    /// Stop the agent if one is running, flushing its last profile.
    pub fn stop(self) {
        #[cfg(feature = "pyroscope")]
        if let Some(agent) = self.agent {
            agent.stop();
        }
    }
}
