//! Components compiled into the inspector itself.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pipeline_registry::{builtin_component, Component, RegistryResult, SharedComponent};

/// Event hub placeholder; the inspector never routes events.
pub struct EventHub;

impl Component for EventHub {
    fn kind(&self) -> &str {
        "EventHub"
    }

    fn info(&self) -> &str {
        "routes events between components"
    }
}

/// Wall clock the pipeline's timestamps are taken from.
pub struct ExecutionClock {
    started: Instant,
}

impl ExecutionClock {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Component for ExecutionClock {
    fn kind(&self) -> &str {
        "ExecutionClock"
    }

    fn info(&self) -> &str {
        "pipeline execution clock"
    }
}

fn event_hub(_: Option<&Path>) -> RegistryResult<SharedComponent> {
    Ok(Arc::new(EventHub))
}

fn execution_clock(_: Option<&Path>) -> RegistryResult<SharedComponent> {
    Ok(Arc::new(ExecutionClock {
        started: Instant::now(),
    }))
}

builtin_component!("EventHub", event_hub);
builtin_component!("ExecutionClock", execution_clock);
