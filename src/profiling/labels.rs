//! Per-thread profiling labels.
//!
//! The profiling client samples threads, so the active correlation id is
//! tracked per thread. Attaching a label pushes it onto the thread's stack and
//! forwards it to the [`ProfileTagSink`]; dropping the guard restores the
//! previous label. Guards are `!Send` so they cannot outlive the thread they
//! were attached on.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt};
use opentelemetry::Context;

/// Label key carried by profiling samples.
pub const PROFILE_LABEL_KEY: &str = "span_id";

/// Join key between a span and the profiling samples taken while it was
/// active: the span id as 16 lower-case hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(SpanId);

impl CorrelationId {
    /// `None` for invalid (non-recording, no-op) span contexts.
    pub fn from_span_context(span_context: &SpanContext) -> Option<Self> {
        span_context
            .is_valid()
            .then(|| Self(span_context.span_id()))
    }

    /// Correlation id of the span active in `cx`, if any.
    pub fn from_context(cx: &Context) -> Option<Self> {
        Self::from_span_context(cx.span().span_context())
    }

    /// Span whose id is used as the profile label value.
    pub fn span_id(&self) -> SpanId {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiver of thread-scoped profiling tags.
pub trait ProfileTagSink: Send + Sync {
    /// Tag samples taken on the calling thread.
    fn add_thread_tag(&self, key: &'static str, value: &str);

    /// Stop tagging samples taken on the calling thread.
    fn remove_thread_tag(&self, key: &'static str, value: &str);
}

/// Sink used when no profiling agent is running.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProfileTagSink for NoopSink {
    fn add_thread_tag(&self, _key: &'static str, _value: &str) {}

    fn remove_thread_tag(&self, _key: &'static str, _value: &str) {}
}

thread_local! {
    static ACTIVE: RefCell<Vec<CorrelationId>> = const { RefCell::new(Vec::new()) };
}

/// Correlation id that a sample taken on this thread right now would carry.
pub fn current_correlation() -> Option<CorrelationId> {
    ACTIVE.with(|stack| stack.borrow().last().copied())
}

/// Handle used to publish correlation ids to the profiling client.
#[derive(Clone)]
pub struct ProfileLabels {
    sink: Arc<dyn ProfileTagSink>,
}

impl fmt::Debug for ProfileLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileLabels").finish_non_exhaustive()
    }
}

impl Default for ProfileLabels {
    fn default() -> Self {
        Self::disabled()
    }
}

impl ProfileLabels {
    pub fn new(sink: Arc<dyn ProfileTagSink>) -> Self {
        Self { sink }
    }

    /// Labels are still tracked per thread, but nothing is forwarded.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopSink))
    }

    /// Make `id` the active label of the calling thread until the guard drops.
    pub fn attach(&self, id: CorrelationId) -> LabelGuard {
        let shadowed = ACTIVE.with(|stack| {
            let mut stack = stack.borrow_mut();
            let shadowed = stack.last().copied();
            stack.push(id);
            shadowed
        });
        if let Some(shadowed) = shadowed {
            self.sink
                .remove_thread_tag(PROFILE_LABEL_KEY, &shadowed.to_string());
        }
        self.sink.add_thread_tag(PROFILE_LABEL_KEY, &id.to_string());

        LabelGuard {
            sink: Arc::clone(&self.sink),
            id,
            _thread_bound: PhantomData,
        }
    }
}

/// Restores the previous label of the thread on drop.
#[must_use = "the label is detached as soon as the guard is dropped"]
pub struct LabelGuard {
    sink: Arc<dyn ProfileTagSink>,
    id: CorrelationId,
    _thread_bound: PhantomData<*const ()>,
}

impl fmt::Debug for LabelGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelGuard").field("id", &self.id).finish()
    }
}

impl Drop for LabelGuard {
    fn drop(&mut self) {
        let restored = ACTIVE.with(|stack| {
            let mut stack = stack.borrow_mut();
            let was_top = stack.last() == Some(&self.id);
            if let Some(position) = stack.iter().rposition(|id| *id == self.id) {
                stack.remove(position);
            }
            if was_top {
                stack.last().copied()
            } else {
                None
            }
        });

        self.sink
            .remove_thread_tag(PROFILE_LABEL_KEY, &self.id.to_string());
        if let Some(restored) = restored {
            self.sink
                .add_thread_tag(PROFILE_LABEL_KEY, &restored.to_string());
        }
    }
}
