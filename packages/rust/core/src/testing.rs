//! In-memory collaborators for orchestrator tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use coursepress_shared::{
    ApiKey, Chapter, CredentialPair, GenerationOptions, Lesson, LessonWebContext, NodeKind,
    Outline, PublishError, RemoteObject, Result, Topic, TopicWebContext, WebReference,
};

use crate::cancel::CancelToken;
use crate::progress::{ProgressReporter, ProgressState};
use crate::services::{
    ContentGenerator, LessonContentRequest, LinkOutcome, CheckResult, RemoteStore,
    ResearchBriefRequest, TopicIntroRequest, TopicWebContextRequest, WebReferencesRequest,
    WebResearcher,
};

pub const PRIMARY_KEY: &str = "primary-key";
pub const FALLBACK_KEY: &str = "fallback-key";

pub fn both_keys() -> CredentialPair {
    CredentialPair::new(Some(ApiKey::new(PRIMARY_KEY)), Some(ApiKey::new(FALLBACK_KEY)))
}

/// Two chapters; the first has one topic with two lessons, the second is empty.
pub fn sample_outline() -> Outline {
    Outline {
        title: "Practical Rust".into(),
        preface: "<p>Preface</p>".into(),
        introduction: "<p>Introduction</p>".into(),
        research_brief: "<p>Brief</p>".into(),
        chapters: vec![
            Chapter {
                ordinal_number: 1,
                title: "Ownership".into(),
                description: "Who owns what.".into(),
                topics: vec![Topic {
                    title: "Moves and Borrows".into(),
                    learning_objective: "Explain moves".into(),
                    lessons: vec![
                        Lesson {
                            title: "Moves".into(),
                            description: "Transferring ownership".into(),
                            ..Default::default()
                        },
                        Lesson {
                            title: "Borrowing".into(),
                            description: "Shared and exclusive references".into(),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                }],
                ..Default::default()
            },
            Chapter {
                ordinal_number: 2,
                title: "Traits".into(),
                description: "Shared behaviour.".into(),
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Remote store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateCall {
    pub kind: Option<NodeKind>,
    pub title: String,
    pub body: String,
    pub parent_id: Option<String>,
    pub id: String,
}

#[derive(Default)]
pub struct FakeStore {
    failing_check: Option<(usize, String)>,
    failing_titles: HashSet<String>,
    unlinkable_titles: HashSet<String>,
    hanging_title: Option<String>,
    cancel_after: Option<(usize, CancelToken)>,
    check_calls: AtomicUsize,
    next_id: AtomicUsize,
    creates: Mutex<Vec<CreateCall>>,
    links: Mutex<Vec<(String, String)>>,
    titles_by_id: Mutex<HashMap<String, String>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `index` (0 reachability, 1 surface, 2 credentials) fails.
    pub fn with_failing_check(mut self, index: usize, message: &str) -> Self {
        self.failing_check = Some((index, message.to_string()));
        self
    }

    /// Creating a node with this title returns a remote error.
    pub fn failing_on(mut self, title: &str) -> Self {
        self.failing_titles.insert(title.to_string());
        self
    }

    /// Linking the node with this title reports failure.
    pub fn unlinkable(mut self, title: &str) -> Self {
        self.unlinkable_titles.insert(title.to_string());
        self
    }

    /// Creating a node with this title never completes.
    pub fn hanging_on(mut self, title: &str) -> Self {
        self.hanging_title = Some(title.to_string());
        self
    }

    /// Fire `token` once `count` objects have been created.
    pub fn cancel_after(mut self, count: usize, token: CancelToken) -> Self {
        self.cancel_after = Some((count, token));
        self
    }

    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> Vec<CreateCall> {
        self.creates.lock().unwrap().clone()
    }

    pub fn created_titles(&self) -> Vec<String> {
        self.creates().into_iter().map(|c| c.title).collect()
    }

    pub fn links(&self) -> Vec<(String, String)> {
        self.links.lock().unwrap().clone()
    }

    fn run_check(&self) -> CheckResult {
        let index = self.check_calls.fetch_add(1, Ordering::SeqCst);
        match &self.failing_check {
            Some((failing, message)) if *failing == index => CheckResult::failed(message.clone()),
            _ => CheckResult::ok(),
        }
    }

    async fn create(
        &self,
        kind: Option<NodeKind>,
        title: &str,
        body: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteObject> {
        if self.hanging_title.as_deref() == Some(title) {
            std::future::pending::<()>().await;
        }
        if self.failing_titles.contains(title) {
            return Err(PublishError::Remote(format!("HTTP 500 creating {title}")));
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("obj-{n}");
        self.creates.lock().unwrap().push(CreateCall {
            kind,
            title: title.to_string(),
            body: body.to_string(),
            parent_id: parent_id.map(str::to_string),
            id: id.clone(),
        });
        self.titles_by_id
            .lock()
            .unwrap()
            .insert(id.clone(), title.to_string());

        if let Some((count, token)) = &self.cancel_after {
            if n >= *count {
                token.cancel();
            }
        }

        Ok(RemoteObject {
            url: format!("https://cms.test/{id}"),
            id,
        })
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn validate_connection(&self) -> CheckResult {
        self.run_check()
    }

    async fn check_api_surface(&self) -> CheckResult {
        self.run_check()
    }

    async fn verify_credentials(&self) -> CheckResult {
        self.run_check()
    }

    async fn create_root(&self, title: &str, body_html: &str) -> Result<RemoteObject> {
        self.create(None, title, body_html, None).await
    }

    async fn create_child(
        &self,
        kind: NodeKind,
        title: &str,
        body_html: &str,
        parent_id: &str,
    ) -> Result<RemoteObject> {
        self.create(Some(kind), title, body_html, Some(parent_id)).await
    }

    async fn link_parent_child(&self, parent_id: &str, child_id: &str) -> LinkOutcome {
        let title = self
            .titles_by_id
            .lock()
            .unwrap()
            .get(child_id)
            .cloned()
            .unwrap_or_default();
        if self.unlinkable_titles.contains(&title) {
            return LinkOutcome::failed(format!("relationship rejected for {title}"));
        }
        self.links
            .lock()
            .unwrap()
            .push((parent_id.to_string(), child_id.to_string()));
        LinkOutcome::linked()
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum IntroFault {
    Unexpected,
    Panic,
}

/// Primary provider whose behaviour is keyed on the credential used.
#[derive(Default)]
pub struct FakeGenerator {
    failing_keys: HashSet<String>,
    intro_fault: Option<IntroFault>,
    hanging_lesson: Option<String>,
    intro_calls: AtomicUsize,
    lesson_calls: AtomicUsize,
    lesson_requests: Mutex<Vec<LessonContentRequest>>,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call made with this key fails.
    pub fn failing_with(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    /// Topic introductions fail with an error the traversal cannot recover from.
    pub fn unexpected_on_intro(mut self) -> Self {
        self.intro_fault = Some(IntroFault::Unexpected);
        self
    }

    /// Topic introductions panic.
    pub fn panicking_on_intro(mut self) -> Self {
        self.intro_fault = Some(IntroFault::Panic);
        self
    }

    /// Generating content for this lesson never completes.
    pub fn hanging_on_lesson(mut self, title: &str) -> Self {
        self.hanging_lesson = Some(title.to_string());
        self
    }

    pub fn intro_calls(&self) -> usize {
        self.intro_calls.load(Ordering::SeqCst)
    }

    pub fn lesson_calls(&self) -> usize {
        self.lesson_calls.load(Ordering::SeqCst)
    }

    pub fn lesson_requests(&self) -> Vec<LessonContentRequest> {
        self.lesson_requests.lock().unwrap().clone()
    }

    fn check(&self, key: &ApiKey) -> Result<()> {
        if self.failing_keys.contains(key.expose()) {
            return Err(PublishError::Enrichment(format!(
                "provider rejected {}",
                key.expose()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn research_brief(
        &self,
        request: &ResearchBriefRequest,
        _options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<String> {
        self.check(key)?;
        Ok(format!("<p>Brief on {}</p>", request.topic))
    }

    async fn topic_introduction(
        &self,
        request: &TopicIntroRequest,
        _options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<String> {
        self.intro_calls.fetch_add(1, Ordering::SeqCst);
        match self.intro_fault {
            Some(IntroFault::Unexpected) => {
                return Err(PublishError::Unexpected("invariant broken".into()));
            }
            Some(IntroFault::Panic) => panic!("intro template missing"),
            None => {}
        }
        self.check(key)?;
        Ok(format!("Welcome to {}.", request.upstream.topic_title))
    }

    async fn lesson_content(
        &self,
        request: &LessonContentRequest,
        _options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<String> {
        self.lesson_calls.fetch_add(1, Ordering::SeqCst);
        self.lesson_requests.lock().unwrap().push(request.clone());
        if self.hanging_lesson.as_deref() == Some(request.lesson_title.as_str()) {
            std::future::pending::<()>().await;
        }
        self.check(key)?;
        Ok(format!(
            "<h2>{}</h2><p>Generated with {}</p>",
            request.lesson_title,
            key.expose()
        ))
    }
}

#[derive(Default)]
pub struct FakeWeb {
    failing_keys: HashSet<String>,
    context_calls: AtomicUsize,
    reference_calls: AtomicUsize,
}

impl FakeWeb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Topic web context requests made with this key fail.
    pub fn failing_with(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    pub fn context_calls(&self) -> usize {
        self.context_calls.load(Ordering::SeqCst)
    }

    pub fn reference_calls(&self) -> usize {
        self.reference_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebResearcher for FakeWeb {
    async fn topic_web_context(
        &self,
        request: &TopicWebContextRequest,
        _options: &GenerationOptions,
        key: &ApiKey,
    ) -> Result<Option<TopicWebContext>> {
        self.context_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_keys.contains(key.expose()) {
            return Err(PublishError::Enrichment(format!(
                "search rejected {}",
                key.expose()
            )));
        }
        Ok(Some(TopicWebContext {
            summary: format!("Current state of {}", request.topic_title),
            lessons: request
                .lessons
                .iter()
                .map(|l| LessonWebContext {
                    lesson_title: l.title.clone(),
                    context: format!("Recent facts about {}", l.title),
                })
                .collect(),
            sources: Vec::new(),
        }))
    }

    async fn web_references(
        &self,
        request: &WebReferencesRequest,
        _options: &GenerationOptions,
        _key: &ApiKey,
    ) -> Result<Option<Vec<WebReference>>> {
        self.reference_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(vec![WebReference {
            title: format!("{} reference", request.topic_title),
            url: "https://example.org/ref".into(),
        }]))
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Keeps every snapshot it is handed.
#[derive(Default)]
pub struct RecordingProgress {
    states: Mutex<Vec<ProgressState>>,
}

impl RecordingProgress {
    pub fn states(&self) -> Vec<ProgressState> {
        self.states.lock().unwrap().clone()
    }

    pub fn last(&self) -> ProgressState {
        self.states().last().cloned().unwrap_or_default()
    }
}

impl ProgressReporter for RecordingProgress {
    fn update(&self, state: &ProgressState) {
        self.states.lock().unwrap().push(state.clone());
    }
}
