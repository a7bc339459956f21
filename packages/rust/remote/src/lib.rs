//! HTTP implementations of the collaborators the publisher drives.
//!
//! - [`HttpRemoteStore`]: REST object store with basic auth and a link webhook
//! - [`ChatProvider`]: OpenAI-compatible primary text provider
//! - [`SearchProvider`]: search-capable provider for web context and references

mod chat;
mod http;
mod prompts;
mod search;
mod store;

pub use chat::ChatProvider;
pub use http::USER_AGENT;
pub use search::SearchProvider;
pub use store::HttpRemoteStore;
