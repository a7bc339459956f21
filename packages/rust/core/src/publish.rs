//! The publishing orchestrator: walks the outline and mirrors it into the
//! remote store, one node at a time.
//!
//! 1. Entry contract: outline is valid, required provider keys are present
//! 2. Preflight: reachability → API surface → credentials
//! 3. Root object
//! 4. For each chapter → topic → lesson: enrich, create, link, advance
//!
//! Node creation and link failures degrade the result (the node, or the link,
//! is skipped) but never stop the run. Cancellation always does, and is
//! checked before any recovery logic sees an error.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use coursepress_shared::{
    AppConfig, Chapter, ContentGenerationMethod, CredentialPair, Credentials, EnrichmentFlags,
    GenerationOptions, KnowledgeLibraries, Lesson, LibraryInheritance, NodeKey, NodeKind, Outline,
    PublishError, PublishedChapter, PublishedLesson, PublishedStructure, PublishedTopic,
    RemoteObject, Result, RunId, Topic, TopicWebContext, WebReference,
};

use crate::cancel::CancelToken;
use crate::compose;
use crate::fallback::{GenerationSource, Generated, with_fallback};
use crate::preflight::run_preflight;
use crate::progress::{ProgressReporter, ProgressState, ProgressTracker, PublishStep};
use crate::resolve;
use crate::services::{
    ContentGenerator, LessonContentRequest, LessonStub, RemoteStore, TopicIntroRequest,
    TopicWebContextRequest, UpstreamContext, WebReferencesRequest, WebResearcher,
};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// The collaborators a run drives.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn RemoteStore>,
    pub generator: Arc<dyn ContentGenerator>,
    /// Required for hybrid generation; optional otherwise.
    pub web: Option<Arc<dyn WebResearcher>>,
}

/// Provider keys for a run. The remote store carries its own credentials.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub primary: CredentialPair,
    pub web: Option<CredentialPair>,
}

impl From<&Credentials> for ProviderKeys {
    fn from(credentials: &Credentials) -> Self {
        Self {
            primary: credentials.primary.clone(),
            web: credentials.web.clone(),
        }
    }
}

/// Behaviour knobs, resolved from config with outline overrides applied.
#[derive(Debug, Clone, Default)]
pub struct PublishSettings {
    pub method: ContentGenerationMethod,
    pub include_web_references: bool,
    pub library_inheritance: LibraryInheritance,
    pub primary_options: GenerationOptions,
    pub web_options: GenerationOptions,
}

impl PublishSettings {
    /// Config defaults, overridden by whatever the outline states.
    pub fn resolve(config: &AppConfig, outline: &Outline) -> Self {
        Self {
            method: outline
                .content_generation_method
                .unwrap_or(config.publish.content_generation_method),
            include_web_references: outline
                .include_web_references
                .unwrap_or(config.publish.include_web_references),
            library_inheritance: config.publish.library_inheritance,
            primary_options: config.primary_provider.options.clone(),
            web_options: config.web_provider.options.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Terminal success states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    /// Every node was created and linked.
    Complete,
    /// The traversal finished but some nodes or links are missing.
    CompletedWithErrors,
}

/// Which remote operation failed for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Create,
    Link,
}

/// A node that was skipped or left unlinked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeFailure {
    pub key: NodeKey,
    pub title: String,
    pub stage: FailureStage,
    pub message: String,
}

/// Per-lesson enrichment record for the report payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonReport {
    pub key: NodeKey,
    pub title: String,
    pub created: bool,
    pub flags: EnrichmentFlags,
}

/// Result of a run that reached the end of its traversal.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub run_id: RunId,
    pub status: PublishStatus,
    pub root: RemoteObject,
    pub structure: PublishedStructure,
    pub failures: Vec<NodeFailure>,
    pub lessons: Vec<LessonReport>,
    pub progress: ProgressState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u128,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Publish `outline` to the remote store.
///
/// Returns the outcome on a finished traversal (see [`PublishStatus`]). Returns
/// `Err` on configuration, preflight, root-creation or unexpected failures
/// (a panicking collaborator becomes [`PublishError::Unexpected`]), and
/// `Err(PublishError::Aborted)` when `cancel` fires; the reporter sees the
/// matching terminal step in every case.
#[instrument(skip_all, fields(title = %outline.title, method = ?settings.method))]
pub async fn publish(
    services: &Services,
    keys: &ProviderKeys,
    outline: &Outline,
    libraries: &KnowledgeLibraries,
    settings: &PublishSettings,
    cancel: &CancelToken,
    reporter: &dyn ProgressReporter,
) -> Result<PublishOutcome> {
    let mut tracker = ProgressTracker::new(reporter);
    tracker.set_step(PublishStep::Preparing, "Validating outline and credentials");

    let mut run = Run {
        services,
        keys,
        outline,
        libraries,
        settings,
        cancel,
        tracker,
        run_id: RunId::new(),
        failures: Vec::new(),
        lessons: Vec::new(),
        web_contexts: HashMap::new(),
    };

    let started_at = Utc::now();
    let start = Instant::now();

    let executed = match AssertUnwindSafe(run.execute()).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(PublishError::Unexpected(panic_message(panic.as_ref()))),
    };

    match executed {
        Ok((root, chapters)) => {
            let status = if run.failures.is_empty() {
                PublishStatus::Complete
            } else {
                PublishStatus::CompletedWithErrors
            };
            let message = match status {
                PublishStatus::Complete => "Publishing complete".to_string(),
                PublishStatus::CompletedWithErrors => format!(
                    "Publishing complete with {} failed node operation(s)",
                    run.failures.len()
                ),
            };
            run.tracker.finish(PublishStep::Complete, message);

            let outcome = PublishOutcome {
                run_id: run.run_id.clone(),
                status,
                structure: PublishedStructure {
                    run_id: run.run_id.clone(),
                    title: outline.title.clone(),
                    root: root.clone(),
                    chapters,
                },
                root,
                failures: run.failures,
                lessons: run.lessons,
                progress: run.tracker.state().clone(),
                started_at,
                finished_at: Utc::now(),
                elapsed_ms: start.elapsed().as_millis(),
            };

            info!(
                run_id = %outcome.run_id,
                root_id = %outcome.root.id,
                nodes = outcome.structure.node_count(),
                failures = outcome.failures.len(),
                elapsed_ms = outcome.elapsed_ms,
                "publish run finished"
            );
            Ok(outcome)
        }
        Err(e) if e.is_abort() => {
            run.tracker.begin_abort("Cancellation requested");
            run.tracker.finish(PublishStep::Aborted, "Publishing aborted");
            warn!(
                processed = run.tracker.state().processed_items,
                total = run.tracker.state().total_items,
                "publish run aborted"
            );
            Err(e)
        }
        Err(e) => {
            let message = match e.hint() {
                Some(hint) => format!("{e} ({hint})"),
                None => e.to_string(),
            };
            run.tracker.finish(PublishStep::Error, message);
            tracing::error!(error = %e, "publish run failed");
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

struct Run<'a> {
    services: &'a Services,
    keys: &'a ProviderKeys,
    outline: &'a Outline,
    libraries: &'a KnowledgeLibraries,
    settings: &'a PublishSettings,
    cancel: &'a CancelToken,
    tracker: ProgressTracker<'a>,
    run_id: RunId,
    failures: Vec<NodeFailure>,
    lessons: Vec<LessonReport>,
    /// Shared topic web context, fetched at most once per (chapter, topic).
    web_contexts: HashMap<(usize, usize), Option<TopicWebContext>>,
}

impl<'a> Run<'a> {
    fn check_entry_contract(&self) -> Result<()> {
        self.outline.validate()?;

        if self.keys.primary.is_empty() {
            return Err(PublishError::config(
                "no primary provider credential configured",
            ));
        }

        if self.settings.method.uses_web_context() {
            if self.services.web.is_none() {
                return Err(PublishError::config(
                    "hybrid generation needs a web research provider",
                ));
            }
            if self.keys.web.as_ref().is_none_or(CredentialPair::is_empty) {
                return Err(PublishError::config(
                    "hybrid generation needs a web provider credential",
                ));
            }
        }
        Ok(())
    }

    async fn execute(&mut self) -> Result<(RemoteObject, Vec<PublishedChapter>)> {
        self.check_entry_contract()?;

        let total = self.outline.total_items();
        self.tracker.start(total);
        info!(run_id = %self.run_id, total_items = total, "starting publish run");

        self.tracker
            .set_step(PublishStep::Preflight, "Checking remote store");
        let preflight = run_preflight(self.services.store.as_ref(), self.cancel).await;
        self.observe(preflight)?;

        let root = self.create_root().await?;

        let outline = self.outline;
        let mut chapters = Vec::new();
        for (ci, chapter) in outline.chapters.iter().enumerate() {
            if let Some(published) = self.publish_chapter(&root, ci, chapter).await? {
                chapters.push(published);
            }
        }

        Ok((root, chapters))
    }

    async fn create_root(&mut self) -> Result<RemoteObject> {
        self.tracker
            .set_step(PublishStep::CreatingRoot, "Creating book");
        let outline = self.outline;
        let title = outline.title.as_str();
        let body = compose::root_body(outline);

        let created = self
            .cancel
            .guard(self.services.store.create_root(title, &body))
            .await;
        let root = self
            .observe(created)
            .map_err(|e| match e {
                e if e.is_fatal() => e,
                other => PublishError::Remote(format!("root object was not created: {other}")),
            })?;
        if root.id.trim().is_empty() {
            return Err(PublishError::Remote(
                "root object was not created: remote store returned no id".into(),
            ));
        }

        info!(root_id = %root.id, url = %root.url, "root object created");
        self.tracker.advance(PublishStep::CreatingRoot, title);
        Ok(root)
    }

    // -----------------------------------------------------------------------
    // Chapters
    // -----------------------------------------------------------------------

    async fn publish_chapter(
        &mut self,
        root: &RemoteObject,
        ci: usize,
        chapter: &'a Chapter,
    ) -> Result<Option<PublishedChapter>> {
        self.checkpoint()?;

        let key = NodeKey::chapter(ci);
        let label = format!("Chapter {}: {}", ci + 1, chapter.title);
        let user_context = resolve::user_context(self.outline, key);
        let body = compose::chapter_body(chapter, user_context);

        let Some(remote) = self
            .create_node(key, NodeKind::Chapter, &chapter.title, &body, &root.id)
            .await?
        else {
            self.skip_subtree(PublishStep::CreatingChapters, &label, chapter_descendants(chapter));
            return Ok(None);
        };

        let linked = self.link(key, &chapter.title, &root.id, &remote.id).await?;
        self.tracker.advance(PublishStep::CreatingChapters, &label);

        let mut topics = Vec::new();
        for (ti, topic) in chapter.topics.iter().enumerate() {
            if let Some(published) = self.publish_topic(&remote, ci, chapter, ti, topic).await? {
                topics.push(published);
            }
        }

        Ok(Some(PublishedChapter {
            index: ci,
            title: chapter.title.clone(),
            remote,
            linked,
            flags: EnrichmentFlags {
                user_context: user_context.is_some(),
                ..Default::default()
            },
            topics,
        }))
    }

    // -----------------------------------------------------------------------
    // Topics
    // -----------------------------------------------------------------------

    async fn publish_topic(
        &mut self,
        chapter_remote: &RemoteObject,
        ci: usize,
        chapter: &'a Chapter,
        ti: usize,
        topic: &'a Topic,
    ) -> Result<Option<PublishedTopic>> {
        self.checkpoint()?;

        let key = NodeKey::topic(ci, ti);
        let label = format!("Topic {}.{}: {}", ci + 1, ti + 1, topic.title);
        let mut flags = EnrichmentFlags::default();

        // Fetched before the introduction so the lessons below can reuse it.
        let web_context = self.topic_web_context(ci, chapter, ti, topic).await?;
        flags.web_context = web_context.is_some();

        let (introduction, source) = self.topic_introduction(chapter, topic).await?;
        self.note_source(source, &mut flags);

        let references = self.web_references(topic).await?;
        flags.web_references = !references.is_empty();

        let user_context = resolve::user_context(self.outline, key);
        flags.user_context = user_context.is_some();

        let body = compose::topic_body(
            &topic.learning_objective,
            &introduction,
            user_context,
            &references,
        );

        let Some(remote) = self
            .create_node(key, NodeKind::Topic, &topic.title, &body, &chapter_remote.id)
            .await?
        else {
            self.skip_subtree(PublishStep::CreatingTopics, &label, topic.lessons.len());
            return Ok(None);
        };

        let linked = self
            .link(key, &topic.title, &chapter_remote.id, &remote.id)
            .await?;
        self.tracker.advance(PublishStep::CreatingTopics, &label);

        let mut lessons = Vec::new();
        for (li, lesson) in topic.lessons.iter().enumerate() {
            if let Some(published) = self
                .publish_lesson(&remote, (ci, ti, li), chapter, topic, lesson)
                .await?
            {
                lessons.push(published);
            }
        }

        Ok(Some(PublishedTopic {
            index: ti,
            title: topic.title.clone(),
            remote,
            linked,
            flags,
            lessons,
        }))
    }

    /// Shared web context for every lesson of a topic, cached per (chapter, topic).
    async fn topic_web_context(
        &mut self,
        ci: usize,
        chapter: &Chapter,
        ti: usize,
        topic: &Topic,
    ) -> Result<Option<TopicWebContext>> {
        if !self.settings.method.uses_web_context() || topic.lessons.is_empty() {
            return Ok(None);
        }
        if let Some(cached) = self.web_contexts.get(&(ci, ti)) {
            return Ok(cached.clone());
        }
        let (Some(web), Some(keys)) = (self.services.web.as_deref(), self.keys.web.as_ref())
        else {
            return Ok(None);
        };

        let request = TopicWebContextRequest {
            book_title: self.outline.title.clone(),
            chapter_title: chapter.title.clone(),
            topic_title: topic.title.clone(),
            lessons: lesson_stubs(topic),
        };
        let options = &self.settings.web_options;

        let request = &request;
        let generated = with_fallback(self.cancel, keys, "topic web context", move |key| async move {
            web.topic_web_context(request, options, &key).await
        })
        .await;
        let generated = self.observe(generated)?;

        if generated.used_fallback() {
            self.tracker.record_fallback();
        }
        let context = match generated {
            Generated::Exhausted { errors } => {
                debug!(chapter = ci, topic = ti, ?errors, "proceeding without topic web context");
                None
            }
            other => other.into_value().flatten(),
        };

        self.web_contexts.insert((ci, ti), context.clone());
        Ok(context)
    }

    async fn topic_introduction(
        &mut self,
        chapter: &Chapter,
        topic: &Topic,
    ) -> Result<(String, GenerationSource)> {
        let request = TopicIntroRequest {
            upstream: self.upstream(chapter, topic),
            lessons: lesson_stubs(topic),
        };
        let generator = self.services.generator.as_ref();
        let options = &self.settings.primary_options;

        let request = &request;
        let generated = with_fallback(self.cancel, &self.keys.primary, "topic introduction", move |key| async move {
            generator.topic_introduction(request, options, &key).await
        })
        .await;
        let generated = self.observe(generated)?;

        Ok(generated.or_placeholder(|| {
            compose::topic_introduction_placeholder(&topic.title, &chapter.title)
        }))
    }

    /// Reference links for a topic. Every failure here is absorbed.
    async fn web_references(&mut self, topic: &Topic) -> Result<Vec<WebReference>> {
        if !self.settings.include_web_references {
            return Ok(Vec::new());
        }
        let (Some(web), Some(keys)) = (self.services.web.as_deref(), self.keys.web.as_ref())
        else {
            debug!(topic = %topic.title, "web references requested but no web provider configured");
            return Ok(Vec::new());
        };

        let request = WebReferencesRequest {
            book_title: self.outline.title.clone(),
            topic_title: topic.title.clone(),
        };
        let options = &self.settings.web_options;

        let request = &request;
        let generated = with_fallback(self.cancel, keys, "web references", move |key| async move {
            web.web_references(request, options, &key).await
        })
        .await;
        let generated = self.observe(generated)?;

        if generated.used_fallback() {
            self.tracker.record_fallback();
        }
        Ok(generated.into_value().flatten().unwrap_or_default())
    }

    // -----------------------------------------------------------------------
    // Lessons
    // -----------------------------------------------------------------------

    async fn publish_lesson(
        &mut self,
        topic_remote: &RemoteObject,
        (ci, ti, li): (usize, usize, usize),
        chapter: &Chapter,
        topic: &Topic,
        lesson: &Lesson,
    ) -> Result<Option<PublishedLesson>> {
        self.checkpoint()?;

        let key = NodeKey::lesson(ci, ti, li);
        let label = format!("Lesson {}.{}.{}: {}", ci + 1, ti + 1, li + 1, lesson.title);

        let library = resolve::resolve_library_with(
            self.libraries,
            self.settings.library_inheritance,
            ci,
            ti,
            li,
        )
        .cloned();

        let web_context = self
            .web_contexts
            .get(&(ci, ti))
            .and_then(Option::as_ref)
            .and_then(|ctx| resolve::extract_lesson_slice(ctx, &lesson.title));

        let user_context = resolve::user_context(self.outline, key);

        let mut flags = EnrichmentFlags {
            user_context: user_context.is_some(),
            retrieval_library: library.clone(),
            web_context: web_context.is_some(),
            ..Default::default()
        };

        let request = LessonContentRequest {
            upstream: self.upstream(chapter, topic),
            lesson_title: lesson.title.clone(),
            lesson_description: lesson.description.clone(),
            style: compose::INSTRUCTIONAL_STYLE.to_string(),
            user_context: user_context.map(str::to_string),
            library,
            web_context,
        };
        let generator = self.services.generator.as_ref();
        let options = &self.settings.primary_options;

        let request = &request;
        let generated = with_fallback(self.cancel, &self.keys.primary, "lesson content", move |key| async move {
            generator.lesson_content(request, options, &key).await
        })
        .await;
        let generated = self.observe(generated)?;
        let (content, source) = generated.or_placeholder(|| {
            compose::lesson_content_placeholder(&lesson.title, &lesson.description)
        });
        self.note_source(source, &mut flags);

        let body = compose::lesson_body(&lesson.description, &content, user_context);

        let created = self
            .create_node(key, NodeKind::Lesson, &lesson.title, &body, &topic_remote.id)
            .await?;

        let published = match created {
            Some(remote) => {
                let linked = self
                    .link(key, &lesson.title, &topic_remote.id, &remote.id)
                    .await?;
                Some(PublishedLesson {
                    index: li,
                    title: lesson.title.clone(),
                    remote,
                    linked,
                    flags: flags.clone(),
                })
            }
            None => None,
        };

        self.tracker.advance(PublishStep::CreatingLessons, &label);
        self.lessons.push(LessonReport {
            key,
            title: lesson.title.clone(),
            created: published.is_some(),
            flags,
        });

        Ok(published)
    }

    // -----------------------------------------------------------------------
    // Shared node operations
    // -----------------------------------------------------------------------

    /// Create one node. `Ok(None)` means it failed and was recorded; only
    /// fatal errors (abort included) come back as `Err`.
    async fn create_node(
        &mut self,
        key: NodeKey,
        kind: NodeKind,
        title: &str,
        body: &str,
        parent_id: &str,
    ) -> Result<Option<RemoteObject>> {
        let store = self.services.store.as_ref();
        match self
            .cancel
            .guard(store.create_child(kind, title, body, parent_id))
            .await
        {
            Ok(remote) if !remote.id.trim().is_empty() => {
                info!(%key, id = %remote.id, kind = kind.as_str(), "node created");
                Ok(Some(remote))
            }
            Ok(_) => {
                self.record_failure(key, title, FailureStage::Create, "remote store returned no id");
                Ok(None)
            }
            Err(e) if e.is_fatal() => self.observe(Err(e)),
            Err(e) => {
                self.record_failure(key, title, FailureStage::Create, e.to_string());
                Ok(None)
            }
        }
    }

    /// Link parent → child. Failure is recorded and otherwise ignored.
    async fn link(
        &mut self,
        key: NodeKey,
        title: &str,
        parent_id: &str,
        child_id: &str,
    ) -> Result<bool> {
        let store = self.services.store.as_ref();
        let linked = self
            .cancel
            .guard_infallible(store.link_parent_child(parent_id, child_id))
            .await;
        let outcome = self.observe(linked)?;
        if !outcome.success {
            let message = outcome
                .error
                .unwrap_or_else(|| "link call reported failure".to_string());
            self.record_failure(key, title, FailureStage::Link, message);
        }
        Ok(outcome.success)
    }

    fn checkpoint(&mut self) -> Result<()> {
        let checked = self.cancel.checkpoint();
        self.observe(checked)
    }

    /// Pass `result` through, entering `Aborting` if it carries the abort.
    fn observe<T>(&mut self, result: Result<T>) -> Result<T> {
        if matches!(result, Err(PublishError::Aborted)) {
            self.tracker
                .begin_abort("Cancellation requested, stopping before the next remote call");
        }
        result
    }

    fn record_failure(
        &mut self,
        key: NodeKey,
        title: &str,
        stage: FailureStage,
        message: impl Into<String>,
    ) {
        let message = message.into();
        warn!(%key, ?stage, error = %message, "node operation failed, continuing");
        match stage {
            FailureStage::Create => self.tracker.record_node_failure(format!("{key}: {message}")),
            FailureStage::Link => self.tracker.record_link_failure(format!("{key}: {message}")),
        }
        self.failures.push(NodeFailure {
            key,
            title: title.to_string(),
            stage,
            message,
        });
    }

    /// Count a node that failed to create plus every descendant it takes with it.
    fn skip_subtree(&mut self, step: PublishStep, label: &str, descendants: usize) {
        for _ in 0..=descendants {
            self.tracker.advance(step, format!("Skipped {label}"));
        }
    }

    fn note_source(&mut self, source: GenerationSource, flags: &mut EnrichmentFlags) {
        match source {
            GenerationSource::Primary => {}
            GenerationSource::Fallback => {
                flags.fallback_credential = true;
                self.tracker.record_fallback();
            }
            GenerationSource::Placeholder => {
                flags.placeholder = true;
                self.tracker.record_placeholder();
            }
        }
    }

    fn upstream(&self, chapter: &Chapter, topic: &Topic) -> UpstreamContext {
        UpstreamContext {
            book_title: self.outline.title.clone(),
            research_brief: self.outline.research_brief.clone(),
            chapter_title: chapter.title.clone(),
            chapter_description: chapter.description.clone(),
            topic_title: topic.title.clone(),
            learning_objective: topic.learning_objective.clone(),
        }
    }
}

fn lesson_stubs(topic: &Topic) -> Vec<LessonStub> {
    topic
        .lessons
        .iter()
        .map(|l| LessonStub {
            title: l.title.clone(),
            description: l.description.clone(),
        })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("publish run panicked: {detail}")
}

/// Topics + lessons under a chapter.
fn chapter_descendants(chapter: &Chapter) -> usize {
    chapter.topics.iter().map(|t| 1 + t.lessons.len()).sum()
}
