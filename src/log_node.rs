use std::fmt;

use tracing::Span;

/// Node of a hierarchical diagnostic log, backed by nested `tracing` spans.
///
/// Functions that accept `Option<&LogNode>` treat `None` as a silent sink.
#[derive(Clone, Debug)]
pub struct LogNode {
    span: Span,
}

impl LogNode {
    pub fn root(message: impl fmt::Display) -> Self {
        let span = tracing::debug_span!("classpath_scope", message = %message);
        tracing::debug!(parent: &span, "{message}");
        Self { span }
    }

    /// Log a message and return a node for entries nested below it.
    pub fn child(&self, message: impl fmt::Display) -> LogNode {
        let span = tracing::debug_span!(parent: &self.span, "log", message = %message);
        tracing::debug!(parent: &span, "{message}");
        LogNode { span }
    }

    pub fn log(&self, message: impl fmt::Display) {
        tracing::debug!(parent: &self.span, "{message}");
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// `log.child(message)` on an optional log.
pub fn child(log: Option<&LogNode>, message: impl fmt::Display) -> Option<LogNode> {
    log.map(|log| log.child(message))
}
