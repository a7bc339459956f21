//! Core domain types: the outline tree going in, the published tree coming out.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::PublishError;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one publish run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Outline (input tree)
// ---------------------------------------------------------------------------

/// How section content is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentGenerationMethod {
    /// Single-provider generation.
    #[default]
    #[serde(alias = "primaryProvider")]
    Primary,
    /// Web context from the search provider, synthesis by the primary provider.
    #[serde(alias = "hybridProvider")]
    Hybrid,
}

impl ContentGenerationMethod {
    pub fn uses_web_context(&self) -> bool {
        matches!(self, Self::Hybrid)
    }
}

/// The outline document produced by the outline stage. Read-only while publishing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outline {
    pub title: String,
    #[serde(default)]
    pub preface: String,
    #[serde(default)]
    pub introduction: String,
    #[serde(default)]
    pub research_brief: String,
    /// Overrides `[publish].content_generation_method` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_generation_method: Option<ContentGenerationMethod>,
    /// Overrides `[publish].include_web_references` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_web_references: Option<bool>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    #[serde(default)]
    pub ordinal_number: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_added_context: Option<String>,
    #[serde(default)]
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub title: String,
    #[serde(default)]
    pub learning_objective: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_added_context: Option<String>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_added_context: Option<String>,
}

impl Outline {
    /// Root + every chapter, topic and lesson. Independent of later failures.
    pub fn total_items(&self) -> usize {
        1 + self
            .chapters
            .iter()
            .map(|c| 1 + c.topics.iter().map(|t| 1 + t.lessons.len()).sum::<usize>())
            .sum::<usize>()
    }

    /// Reject outlines the publisher cannot do anything sensible with.
    pub fn validate(&self) -> Result<(), PublishError> {
        if self.title.trim().is_empty() {
            return Err(PublishError::validation("outline has no title"));
        }
        for (ci, chapter) in self.chapters.iter().enumerate() {
            if chapter.title.trim().is_empty() {
                return Err(PublishError::validation(format!(
                    "chapter {ci} has no title"
                )));
            }
        }
        Ok(())
    }

    /// Parse an outline document from JSON.
    pub fn from_json(json: &str) -> Result<Self, PublishError> {
        serde_json::from_str(json)
            .map_err(|e| PublishError::validation(format!("invalid outline JSON: {e}")))
    }
}

// ---------------------------------------------------------------------------
// NodeKey
// ---------------------------------------------------------------------------

static NODE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(chapter|topic|lesson)-(\d+)(?:-(\d+))?(?:-(\d+))?$").expect("valid regex")
});

/// Structured address of a node in the outline tree.
///
/// Renders as `chapter-{i}`, `topic-{i}-{j}` or `lesson-{i}-{j}-{k}` at the
/// serde boundary so existing library/context maps keep loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub chapter: usize,
    pub topic: Option<usize>,
    pub lesson: Option<usize>,
}

impl NodeKey {
    pub fn chapter(chapter: usize) -> Self {
        Self {
            chapter,
            topic: None,
            lesson: None,
        }
    }

    pub fn topic(chapter: usize, topic: usize) -> Self {
        Self {
            chapter,
            topic: Some(topic),
            lesson: None,
        }
    }

    pub fn lesson(chapter: usize, topic: usize, lesson: usize) -> Self {
        Self {
            chapter,
            topic: Some(topic),
            lesson: Some(lesson),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match (self.topic, self.lesson) {
            (None, _) => NodeKind::Chapter,
            (Some(_), None) => NodeKind::Topic,
            (Some(_), Some(_)) => NodeKind::Lesson,
        }
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.topic, self.lesson) {
            (Some(t), Some(l)) => write!(f, "lesson-{}-{t}-{l}", self.chapter),
            (Some(t), None) => write!(f, "topic-{}-{t}", self.chapter),
            _ => write!(f, "chapter-{}", self.chapter),
        }
    }
}

impl std::str::FromStr for NodeKey {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PublishError::validation(format!("invalid node key '{s}'"));
        let caps = NODE_KEY_RE.captures(s).ok_or_else(invalid)?;
        let index = |i: usize| -> Result<Option<usize>, PublishError> {
            caps.get(i)
                .map(|m| m.as_str().parse::<usize>().map_err(|_| invalid()))
                .transpose()
        };
        let chapter = index(2)?.ok_or_else(invalid)?;
        let (a, b) = (index(3)?, index(4)?);
        match (&caps[1], a, b) {
            ("chapter", None, None) => Ok(Self::chapter(chapter)),
            ("topic", Some(t), None) => Ok(Self::topic(chapter, t)),
            ("lesson", Some(t), Some(l)) => Ok(Self::lesson(chapter, t, l)),
            _ => Err(invalid()),
        }
    }
}

impl Serialize for NodeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Knowledge libraries
// ---------------------------------------------------------------------------

/// Identifier of an indexed document collection used for retrieval augmentation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(pub String);

impl LibraryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LibraryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-node library assignments. Any level may be written; see the resolver
/// for which levels are consulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeLibraries(BTreeMap<NodeKey, LibraryId>);

impl KnowledgeLibraries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, key: NodeKey, library: LibraryId) {
        self.0.insert(key, library);
    }

    pub fn with(mut self, key: NodeKey, library: impl Into<String>) -> Self {
        self.assign(key, LibraryId::new(library));
        self
    }

    pub fn get(&self, key: &NodeKey) -> Option<&LibraryId> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self, PublishError> {
        serde_json::from_str(json)
            .map_err(|e| PublishError::validation(format!("invalid library map JSON: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Remote objects
// ---------------------------------------------------------------------------

/// Level of a remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    Chapter,
    Topic,
    Lesson,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Chapter => "chapter",
            Self::Topic => "topic",
            Self::Lesson => "lesson",
        }
    }
}

/// Opaque id + reference URL returned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub id: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Web context
// ---------------------------------------------------------------------------

/// Research snippet for one lesson inside a shared topic context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonWebContext {
    pub lesson_title: String,
    pub context: String,
}

/// One web-context object covering every lesson under a topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicWebContext {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub lessons: Vec<LessonWebContext>,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// A citation link attached to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebReference {
    pub title: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Published structure (output tree)
// ---------------------------------------------------------------------------

/// What enrichment actually went into a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentFlags {
    /// The node body carries a user-supplied context block.
    pub user_context: bool,
    /// Library used for retrieval augmentation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_library: Option<LibraryId>,
    /// Generation was grounded on fetched web context.
    pub web_context: bool,
    /// A reference block was attached.
    pub web_references: bool,
    /// Generated text came from the fallback credential.
    pub fallback_credential: bool,
    /// All generation attempts failed and templated text was used.
    pub placeholder: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedLesson {
    pub index: usize,
    pub title: String,
    pub remote: RemoteObject,
    pub linked: bool,
    pub flags: EnrichmentFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedTopic {
    pub index: usize,
    pub title: String,
    pub remote: RemoteObject,
    pub linked: bool,
    pub flags: EnrichmentFlags,
    pub lessons: Vec<PublishedLesson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedChapter {
    pub index: usize,
    pub title: String,
    pub remote: RemoteObject,
    pub linked: bool,
    pub flags: EnrichmentFlags,
    pub topics: Vec<PublishedTopic>,
}

/// Ordered mirror of the outline holding only nodes that were created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedStructure {
    pub run_id: RunId,
    pub title: String,
    pub root: RemoteObject,
    pub chapters: Vec<PublishedChapter>,
}

impl PublishedStructure {
    /// Number of remote objects recorded, root included.
    pub fn node_count(&self) -> usize {
        1 + self
            .chapters
            .iter()
            .map(|c| 1 + c.topics.iter().map(|t| 1 + t.lessons.len()).sum::<usize>())
            .sum::<usize>()
    }
}
