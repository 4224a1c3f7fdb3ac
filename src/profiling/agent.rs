//! Pyroscope agent: pushes CPU profiles and receives thread tags.

use std::sync::Arc;

use pyroscope::pyroscope::PyroscopeAgentRunning;
use pyroscope::{PyroscopeAgent, PyroscopeError};
use pyroscope_pprofrs::{pprof_backend, PprofConfig};

use crate::config::ProfilingConfig;
use crate::profiling::labels::ProfileTagSink;
use crate::profiling::ProfilingError;

type TagFn = Box<dyn Fn(String, String) -> Result<(), PyroscopeError> + Send + Sync>;

/// Running profiling agent. Stop it last, after the telemetry flush.
pub struct ProfilingAgent {
    running: PyroscopeAgent<PyroscopeAgentRunning>,
}

impl ProfilingAgent {
    /// Start sampling and return the sink feeding thread tags to the agent.
    pub fn start(
        config: &ProfilingConfig,
    ) -> Result<(Self, Arc<dyn ProfileTagSink>), ProfilingError> {
        let tags: Vec<(&str, &str)> = config
            .tags
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();

        let backend = pprof_backend(PprofConfig::new().sample_rate(config.sample_rate));
        let agent = PyroscopeAgent::builder(
            config.server_address.as_str(),
            config.application_name.as_str(),
        )
        .backend(backend)
        .tags(tags)
        .build()
        .map_err(|err| ProfilingError::Agent(err.to_string()))?;

        let running = agent
            .start()
            .map_err(|err| ProfilingError::Agent(err.to_string()))?;
        let (add, remove) = running.tag_wrapper();
        let sink = PyroscopeTags {
            add: Box::new(add),
            remove: Box::new(remove),
        };

        tracing::info!(
            server = %config.server_address,
            application = %config.application_name,
            sample_rate = config.sample_rate,
            "Profiling agent started"
        );
        Ok((Self { running }, Arc::new(sink)))
    }

    /// Stop sampling and flush the last profile.
    pub fn stop(self) {
        match self.running.stop() {
            Ok(ready) => {
                ready.shutdown();
                tracing::info!("Profiling agent stopped");
            }
            Err(err) => tracing::warn!(error = %err, "Failed to stop profiling agent"),
        }
    }
}

struct PyroscopeTags {
    add: TagFn,
    remove: TagFn,
}

impl ProfileTagSink for PyroscopeTags {
    fn add_thread_tag(&self, key: &'static str, value: &str) {
        if let Err(err) = (self.add)(key.to_string(), value.to_string()) {
            tracing::debug!(error = %err, "Failed to add profiling tag");
        }
    }

    fn remove_thread_tag(&self, key: &'static str, value: &str) {
        if let Err(err) = (self.remove)(key.to_string(), value.to_string()) {
            tracing::debug!(error = %err, "Failed to remove profiling tag");
        }
    }
}
