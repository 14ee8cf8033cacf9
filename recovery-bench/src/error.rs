// Copyright (c) Recovery Bench Developers.
use thiserror::Error;

// A recovery attempt failed in a way worth retrying with the same
// configuration (a remote process died, the client timed out, logs were
// incomplete).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct TransientFailure {
    pub reason: String,
}

impl TransientFailure {
    pub fn new(reason: impl Into<anyhow::Error>) -> Self {
        Self {
            reason: format!("{:#}", reason.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum FatalFailure {
    #[error("{0}")]
    Error(String),
    #[error("gave up after {attempts} attempts, last failure: {last}")]
    Exhausted { attempts: u32, last: TransientFailure },
    #[error("interrupted after {attempts} attempts")]
    Interrupted { attempts: u32 },
}

impl FatalFailure {
    pub fn new(reason: impl Into<anyhow::Error>) -> Self {
        Self::Error(format!("{:#}", reason.into()))
    }
}

#[derive(Debug, Error)]
pub enum Failure {
    #[error("transient failure: {0}")]
    Transient(#[from] TransientFailure),
    #[error("fatal failure: {0}")]
    Fatal(#[from] FatalFailure),
}

impl Failure {
    pub fn transient(reason: impl Into<anyhow::Error>) -> Self {
        Self::Transient(TransientFailure::new(reason))
    }

    pub fn fatal(reason: impl Into<anyhow::Error>) -> Self {
        Self::Fatal(FatalFailure::new(reason))
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Fatal(_) => false,
        }
    }
}

pub type AttemptResult<T> = std::result::Result<T, Failure>;

// Classifies an ordinary error at the point where the attempt knows whether
// trying again could help.
pub trait OrFailure<T> {
    fn or_transient(self) -> AttemptResult<T>;
    fn or_fatal(self) -> AttemptResult<T>;
}

impl<T, E> OrFailure<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn or_transient(self) -> AttemptResult<T> {
        self.map_err(Failure::transient)
    }

    fn or_fatal(self) -> AttemptResult<T> {
        self.map_err(Failure::fatal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReduceError {
    #[error("no {0} to reduce")]
    EmptyCollection(String),
    #[error("{0} has zero clock frequency")]
    ZeroClock(String),
    #[error("{0}: division by zero")]
    ZeroDivisor(String),
    #[error("{name}: length mismatch ({left} vs {right})")]
    LengthMismatch {
        name: String,
        left: usize,
        right: usize,
    },
}
