//! Tracing shims that cost nothing when the `tracing` feature is off.
//!
//! Kernel entry points open a span and emit a summary event through these
//! macros. With the feature disabled both macros compile away, so the hot
//! paths carry no instrumentation overhead.

/// Opens an info-level span around a kernel invocation.
///
/// Expands to `tracing::info_span!` under the `tracing` feature; otherwise
/// yields a [`NoopSpan`] so `let _span = trace_span!(...).entered();` works
/// unchanged at every call site.
#[cfg(feature = "tracing")]
macro_rules! trace_span {
    ($name:expr $(, $($field:tt)*)?) => {
        tracing::info_span!($name $(, $($field)*)?)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_span {
    ($name:expr $(, $($field:tt)*)?) => {
        $crate::trace::NoopSpan
    };
}

/// Emits an info-level event carrying kernel result counts.
///
/// Without the `tracing` feature the field expressions are still evaluated
/// (then discarded) so call sites never trip unused-variable lints.
#[cfg(feature = "tracing")]
macro_rules! trace_event {
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::info!(name: $name, $($key = $value),+)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_event {
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        let _ = ($($value,)+);
    };
}

pub(crate) use trace_event;
pub(crate) use trace_span;

/// Stand-in span guard used when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub struct NoopSpan;

#[cfg(not(feature = "tracing"))]
impl NoopSpan {
    /// Mirrors `tracing::Span::entered` so call sites need no `cfg`.
    #[inline]
    pub fn entered(self) -> Self {
        self
    }
}
