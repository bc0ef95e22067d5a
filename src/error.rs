// src/error.rs
//! Request-validation failures. These fail fast, before any adapter is
//! dispatched, and map to HTTP 400 at the API edge. Everything else in the
//! system (source, LLM, storage, delivery failures) is scoped to its own
//! module and contained instead of propagated.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("at least one keyword is required")]
    NoKeywords,

    #[error("at least one source is required")]
    NoSources,

    #[error("unknown source `{0}`")]
    UnknownSource(String),

    #[error("invalid date range: start {start} is after end {end}")]
    DateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("invalid notification time `{0}`, expected HH:MM")]
    NotifyTime(String),

    #[error("invalid email address `{0}`")]
    Email(String),
}
