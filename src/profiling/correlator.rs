//! Tracer decorator that makes spans and profiles joinable.
//!
//! [`ProfiledTracer`] implements [`Tracer`] on top of another tracer:
//! - every span it builds carries the [`PROFILE_ID_ATTRIBUTE`] attribute;
//! - `in_span` scopes publish the span's correlation id to the profiling
//!   labels for the duration of the closure;
//! - `in_span_async` does the same for a future, re-attaching on every poll so
//!   the label follows the task across worker threads.

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use opentelemetry::trace::{Span, SpanBuilder, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use pin_project_lite::pin_project;

use crate::profiling::labels::{CorrelationId, ProfileLabels};

/// Span attribute holding the correlation id.
pub const PROFILE_ID_ATTRIBUTE: &str = "pyroscope.profile.id";

/// Tracer wrapper injecting the profiling correlation id.
#[derive(Debug, Clone)]
pub struct ProfiledTracer<T> {
    inner: T,
    labels: ProfileLabels,
}

impl<T> ProfiledTracer<T> {
    /// Wrap `inner` so every span it starts is tagged for profiling.
    pub fn new(inner: T, labels: ProfileLabels) -> Self {
        Self { inner, labels }
    }
}

impl<T> Tracer for ProfiledTracer<T>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    type Span = T::Span;

    fn build_with_context(&self, builder: SpanBuilder, parent_cx: &Context) -> Self::Span {
        let mut span = self.inner.build_with_context(builder, parent_cx);
        if let Some(id) = CorrelationId::from_span_context(span.span_context()) {
            span.set_attribute(KeyValue::new(PROFILE_ID_ATTRIBUTE, id.to_string()));
        }
        span
    }

    fn in_span<R, F, N>(&self, name: N, f: F) -> R
    where
        F: FnOnce(Context) -> R,
        N: Into<Cow<'static, str>>,
        Self::Span: Send + Sync + 'static,
    {
        let span = self.start(name);
        let cx = Context::current_with_span(span);
        let _cx_guard = cx.clone().attach();
        let _label_guard = CorrelationId::from_context(&cx).map(|id| self.labels.attach(id));
        f(cx)
    }
}

impl<T> ProfiledTracer<T>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    /// Run the future built by `f` inside a new child span of `parent_cx`.
    ///
    /// The span ends when the future completes. Pass `&Context::new()` to
    /// start a fresh trace.
    pub fn in_span_async<N, F, Fut>(&self, name: N, parent_cx: &Context, f: F) -> Profiled<Fut>
    where
        N: Into<Cow<'static, str>>,
        F: FnOnce(Context) -> Fut,
        Fut: Future,
    {
        let span = self.start_with_context(name, parent_cx);
        let cx = parent_cx.with_span(span);
        Profiled::new(f(cx.clone()), cx, self.labels.clone())
    }
}

pin_project! {
    /// Future running inside a span with its profiling label attached.
    #[must_use = "futures do nothing unless polled"]
    pub struct Profiled<F> {
        #[pin]
        inner: F,
        cx: Context,
        id: Option<CorrelationId>,
        labels: ProfileLabels,
    }
}

impl<F> Profiled<F> {
    pub fn new(inner: F, cx: Context, labels: ProfileLabels) -> Self {
        let id = CorrelationId::from_context(&cx);
        Self {
            inner,
            cx,
            id,
            labels,
        }
    }
}

impl<F: Future> Future for Profiled<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, task: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _cx_guard = this.cx.clone().attach();
        let _label_guard = this.id.map(|id| this.labels.attach(id));

        let poll = this.inner.poll(task);
        if poll.is_ready() {
            this.cx.span().end();
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::Value;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracer, SdkTracerProvider};

    use super::*;
    use crate::profiling::labels::current_correlation;
    use crate::profiling::labels::testing::{RecordingSink, TagEvent};

    fn tracer_with_exporter(
        labels: ProfileLabels,
    ) -> (ProfiledTracer<SdkTracer>, SdkTracerProvider, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = ProfiledTracer::new(provider.tracer("test"), labels);
        (tracer, provider, exporter)
    }

    fn profile_id(span: &opentelemetry_sdk::trace::SpanData) -> Option<String> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == PROFILE_ID_ATTRIBUTE)
            .map(|kv| match &kv.value {
                Value::String(s) => s.as_str().to_string(),
                other => other.to_string(),
            })
    }

    #[test]
    fn span_attribute_matches_sampled_label() {
        let (tracer, _provider, exporter) = tracer_with_exporter(ProfileLabels::disabled());

        let (sampled, span_id) = tracer.in_span("work", |cx| {
            (current_correlation(), cx.span().span_context().span_id())
        });
        assert_eq!(current_correlation(), None);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let expected = span_id.to_string();
        assert_eq!(profile_id(&spans[0]).as_deref(), Some(expected.as_str()));
        assert_eq!(sampled.map(|id| id.to_string()), Some(expected));
    }

    #[test]
    fn child_scope_shares_trace_and_restores_parent_label() {
        let (tracer, _provider, exporter) = tracer_with_exporter(ProfileLabels::disabled());

        tracer.in_span("parent", |parent_cx| {
            let parent = CorrelationId::from_context(&parent_cx);
            tracer.in_span("child", |child_cx| {
                assert_eq!(
                    child_cx.span().span_context().trace_id(),
                    parent_cx.span().span_context().trace_id()
                );
                assert_eq!(current_correlation(), CorrelationId::from_context(&child_cx));
            });
            assert_eq!(current_correlation(), parent);
        });

        let spans = exporter.get_finished_spans().unwrap();
        let child = spans.iter().find(|s| s.name == "child").unwrap();
        let parent = spans.iter().find(|s| s.name == "parent").unwrap();
        assert_eq!(child.parent_span_id, parent.span_context.span_id());
    }

    #[test]
    fn concurrent_scopes_do_not_share_labels() {
        let (tracer, _provider, exporter) = tracer_with_exporter(ProfileLabels::disabled());
        let tracer = Arc::new(tracer);
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let tracer = Arc::clone(&tracer);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    tracer.in_span(format!("worker-{i}"), |cx| {
                        barrier.wait();
                        let sampled = current_correlation().map(|id| id.to_string());
                        barrier.wait();
                        (cx.span().span_context().span_id().to_string(), sampled)
                    })
                })
            })
            .collect();

        for handle in handles {
            let (span_id, sampled) = handle.join().unwrap();
            assert_eq!(sampled, Some(span_id));
        }

        for span in exporter.get_finished_spans().unwrap() {
            assert_eq!(
                profile_id(&span),
                Some(span.span_context.span_id().to_string())
            );
        }
    }

    #[test]
    fn sink_sees_balanced_tags() {
        let sink = Arc::new(RecordingSink::default());
        let (tracer, _provider, _exporter) = tracer_with_exporter(ProfileLabels::new(sink.clone()));

        let id = tracer.in_span("work", |cx| cx.span().span_context().span_id().to_string());

        assert_eq!(
            sink.events_for(std::thread::current().id()),
            vec![TagEvent::Add(id.clone()), TagEvent::Remove(id)]
        );
    }

    #[tokio::test]
    async fn async_scope_labels_each_poll_and_ends_span() {
        let (tracer, _provider, exporter) = tracer_with_exporter(ProfileLabels::disabled());

        let (before, after, span_id) = tracer
            .in_span_async("async-work", &Context::new(), |cx| async move {
                let before = current_correlation();
                tokio::task::yield_now().await;
                let after = current_correlation();
                (before, after, CorrelationId::from_context(&cx))
            })
            .await;

        assert!(span_id.is_some());
        assert_eq!(before, span_id);
        assert_eq!(after, span_id);
        assert_eq!(current_correlation(), None);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "async-work");
        assert_eq!(spans[0].parent_span_id, opentelemetry::trace::SpanId::INVALID);
    }
}
