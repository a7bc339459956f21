//! Publishing orchestration for coursepress.
//!
//! This crate walks an outline (book → chapters → topics → lessons), enriches
//! each node through the service traits in [`services`], and mirrors the tree
//! into a remote store. Entry point: [`publish::publish`].

pub mod cancel;
pub mod compose;
pub mod fallback;
pub mod preflight;
pub mod progress;
pub mod publish;
pub mod research;
pub mod resolve;
pub mod services;

#[cfg(test)]
mod testing;

pub use cancel::CancelToken;
pub use progress::{ProgressReporter, ProgressState, PublishStep, SilentProgress, WatchProgress};
pub use publish::{
    FailureStage, NodeFailure, ProviderKeys, PublishOutcome, PublishSettings, PublishStatus,
    Services, publish,
};
