// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod agents;
pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod notify;
pub mod process;
pub mod query;
pub mod subscribe;

// ---- Re-exports for stable public API ----
pub use crate::agents::{AdapterRegistry, Crawl, RawResult, SourceAdapter, SourceUnavailable};
pub use crate::api::{create_router, AppState};
pub use crate::config::ScoutConfig;
pub use crate::controller::{Bundle, Controller, ControllerCfg, FetchStatus, SourceFetch};
pub use crate::error::RequestError;
pub use crate::llm::{DisabledLlm, FallbackLlm, LlmClient, LlmError};
pub use crate::notify::{EmailSender, LogNotifier, Notifier};
pub use crate::process::{FilteredResult, PipelineCfg, ResultProcessor, ScoredResult};
pub use crate::query::{DateRange, Query, QueryDraft};
pub use crate::subscribe::{
    JsonFileStore, MemoryStore, NotifyTime, Scheduler, SchedulerCfg, SchedulerHandle, StoreError,
    Subscription, SubscriptionStore,
};
