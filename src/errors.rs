//! # Error Taxonomy
//!
//! The typed error surface the core returns. `ConfigError`, `NotFound`,
//! `TransportError`, `PlanOutputMissing` and the `Pipeline*` family are all
//! core-fatal and step-scoped; `Warning`s are collected separately and
//! never abort a tick.

use std::fmt;

/// Composite validation failure. Carries every problem found, not just the
/// first — the loader runs validation to completion before returning.
#[derive(Debug, Clone, thiserror::Error)]
pub struct ConfigError {
    pub problems: Vec<String>,
}

impl ConfigError {
    pub fn new(problems: Vec<String>) -> Self {
        Self { problems }
    }

    pub fn single(problem: impl Into<String>) -> Self {
        Self {
            problems: vec![problem.into()],
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "config invalid ({} problem(s)):", self.problems.len())?;
        for p in &self.problems {
            writeln!(f, "  - {p}")?;
        }
        Ok(())
    }
}

/// What kind of thing was missing. Some lookups are benign (an
/// `output-optional` tag), some are fatal (a required step/module
/// reference) — callers decide which by matching on this.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotFoundKind {
    #[error("release {tag} not found for source {source}")]
    Release { source: String, tag: String },
    #[error("file {path} not found at {reference} in {source}")]
    File {
        source: String,
        reference: String,
        path: String,
    },
    #[error("parameter {name} not found")]
    Parameter { name: String },
}

/// A remote call exhausted its retry budget, or failed in a way the port
/// decided was not worth retrying.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Non-fatal problem. Logged and attached to the tick result; never
/// aborts the tick (delete-path failures, notifier failures, and the
/// like).
#[derive(Debug, Clone)]
pub struct Warning {
    pub step: Option<String>,
    pub message: String,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            step: None,
            message: message.into(),
        }
    }

    pub fn for_step(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: Some(step.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(f, "[{step}] {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// The core's top-level, step-scoped error type. Every tick-aborting
/// failure surfaces as one of these, carrying the step name where one
/// applies so the CLI can report "which step" without unwinding context.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    NotFound(#[from] NotFoundKind),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("plan output missing for step {step}")]
    PlanOutputMissing { step: String },

    #[error("step {step} was rejected")]
    PipelineRejected { step: String },

    #[error("step {step} failed: {cause}")]
    PipelineFailed { step: String, cause: String },

    #[error("step {step} pipeline stopped: {reason}")]
    PipelineStopped { step: String, reason: String },

    #[error("step {step} pipeline execution was superseded")]
    PipelineSuperseded { step: String },

    #[error("tick cancelled")]
    Cancelled,
}

impl CoreError {
    /// The step this error applies to, where one applies.
    pub fn step(&self) -> Option<&str> {
        match self {
            CoreError::PlanOutputMissing { step }
            | CoreError::PipelineRejected { step }
            | CoreError::PipelineFailed { step, .. }
            | CoreError::PipelineStopped { step, .. }
            | CoreError::PipelineSuperseded { step } => Some(step),
            _ => None,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
