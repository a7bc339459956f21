//! Shared types, error model, and configuration for coursepress.
//!
//! This crate is the foundation depended on by all other coursepress crates.
//! It provides:
//! - [`PublishError`]: the unified error type
//! - Domain types ([`Outline`], [`NodeKey`], [`KnowledgeLibraries`], [`PublishedStructure`])
//! - Configuration ([`AppConfig`], credential resolution, config loading)
//! - Generation options ([`GenerationOptions`]) and their defaults

pub mod config;
pub mod error;
pub mod options;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiKey, AppConfig, CollectionsConfig, CredentialPair, Credentials, LibraryInheritance,
    ProviderConfig, PublishConfig, RemoteConfig, RemoteCredentials, config_dir, config_file_path,
    init_config, load_config, load_config_from, provider_keys, resolve_credentials,
    resolve_credentials_with, resolve_remote_credentials,
};
pub use error::{PreflightCheck, PublishError, Result};
pub use options::{GenerationOptions, ResolvedOptions, SearchContextSize, SearchRecency};
pub use types::{
    Chapter, ContentGenerationMethod, EnrichmentFlags, KnowledgeLibraries, Lesson,
    LessonWebContext, LibraryId, NodeKey, NodeKind, Outline, PublishedChapter, PublishedLesson,
    PublishedStructure, PublishedTopic, RemoteObject, RunId, Topic, TopicWebContext,
    WebReference,
};
