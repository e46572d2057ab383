//! Runtime error types.
//!
//! Errors travel through the interpreter as the private [`RunError`] and are
//! converted to the public [`Fault`] at the API boundary, where the activation
//! trace is attached. User code can intercept most faults with `on:do:`; the
//! handler receives an `Exception` instance carrying the message and trace.

use std::fmt;

use strum::{Display, IntoStaticStr};

/// Result type alias for operations that can produce a runtime fault.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// Category of a fault, mirroring the error taxonomy of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum FaultKind {
    /// Produced by the ingest layer; surfaced verbatim.
    #[strum(serialize = "parse")]
    Parse,
    /// Method not found after the `doesNotUnderstand:` chain, or wrong arity
    /// on a block or method call.
    #[strum(serialize = "dispatch")]
    Dispatch,
    /// Type mismatch in a native routine, or division by zero.
    #[strum(serialize = "value")]
    Value,
    /// Slot-name or selector conflict, or a cycle in the parent graph.
    #[strum(serialize = "class-construction")]
    ClassConstruction,
    /// Non-local return whose home activation has already been popped.
    #[strum(serialize = "return-to-dead-activation")]
    DeadReturn,
    /// Deadlock: every live process is blocked with no possible wake-up.
    #[strum(serialize = "scheduler")]
    Scheduler,
    /// Raised by user code via `error:` or `Exception signal:`.
    #[strum(serialize = "user")]
    User,
    /// VM invariant violated (work queue or eval stack underflow).
    #[strum(serialize = "internal")]
    Internal,
}

/// An in-flight runtime error, before the activation trace is attached.
///
/// `payload` carries a pre-built exception instance for errors raised from
/// user code (`Exception signal:`), so `on:do:` handlers observe the class
/// the user signalled rather than the generic kernel `Exception`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RunError {
    pub kind: FaultKind,
    pub message: String,
    pub payload: Option<crate::value::Value>,
}

impl RunError {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: crate::value::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Parse, message)
    }

    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Dispatch, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Value, message)
    }

    pub fn class_construction(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ClassConstruction, message)
    }

    pub fn dead_return(message: impl Into<String>) -> Self {
        Self::new(FaultKind::DeadReturn, message)
    }

    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Scheduler, message)
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::new(FaultKind::User, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Internal, message)
    }

    /// Attaches an activation trace, producing the public fault type.
    pub fn into_fault(self, trace: Vec<String>) -> Fault {
        Fault {
            kind: self.kind,
            message: self.message,
            trace,
        }
    }
}

/// A fault as reported to the embedding host.
///
/// Carries the category, a human-readable message, and the activation chain
/// rendered as selector names, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    pub trace: Vec<String>,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)?;
        for frame in &self.trace {
            write!(f, "\n  in {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_display_includes_kind_and_trace() {
        let fault = RunError::dispatch("message not understood: #frob")
            .into_fault(vec!["frob".to_owned(), "doit".to_owned()]);
        let rendered = fault.to_string();
        assert!(rendered.starts_with("dispatch error: message not understood: #frob"));
        assert!(rendered.contains("\n  in frob\n  in doit"));
    }
}
