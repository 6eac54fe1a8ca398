// crates.io
use tracing::{Instrument, Span, instrument::Instrumented, span::EnteredSpan};
// self
use crate::{_prelude::*, obs::OpKind};

/// Future wrapped in an [`OpSpan`].
pub type InstrumentedOp<F> = Instrumented<F>;

/// A span builder used by dispatches and refresh episodes.
#[derive(Clone, Debug)]
pub struct OpSpan {
	span: Span,
}
impl OpSpan {
	/// Creates a new span tagged with the provided operation kind + stage.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		Self { span: tracing::info_span!("session_dispatch.op", op = kind.as_str(), stage) }
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> OpSpanGuard {
		OpSpanGuard { _guard: self.span.entered() }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		fut.instrument(self.span.clone())
	}
}

/// RAII guard returned by [`OpSpan::entered`].
pub struct OpSpanGuard {
	_guard: EnteredSpan,
}
impl Debug for OpSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("OpSpanGuard(..)")
	}
}
