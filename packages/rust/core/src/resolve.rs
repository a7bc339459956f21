//! Pure lookups over the outline: effective knowledge library, user-supplied
//! context, and the lesson slice of a shared topic web context.

use std::sync::LazyLock;

use regex::Regex;

use coursepress_shared::{
    KnowledgeLibraries, LibraryId, LibraryInheritance, NodeKey, Outline, TopicWebContext,
};

/// Effective library for a lesson: lesson key, then chapter key.
///
/// Topic keys are not consulted here; see [`resolve_library_with`].
pub fn resolve_library(
    libraries: &KnowledgeLibraries,
    chapter: usize,
    topic: usize,
    lesson: usize,
) -> Option<&LibraryId> {
    resolve_library_with(
        libraries,
        LibraryInheritance::LessonChapter,
        chapter,
        topic,
        lesson,
    )
}

/// Effective library for a lesson under the given inheritance chain. First hit wins.
pub fn resolve_library_with(
    libraries: &KnowledgeLibraries,
    inheritance: LibraryInheritance,
    chapter: usize,
    topic: usize,
    lesson: usize,
) -> Option<&LibraryId> {
    let topic_key = match inheritance {
        LibraryInheritance::LessonChapter => None,
        LibraryInheritance::LessonTopicChapter => Some(NodeKey::topic(chapter, topic)),
    };

    [
        Some(NodeKey::lesson(chapter, topic, lesson)),
        topic_key,
        Some(NodeKey::chapter(chapter)),
    ]
    .into_iter()
    .flatten()
    .find_map(|key| libraries.get(&key))
}

/// User-supplied free text for a node, if the outline carries any.
///
/// Blank strings count as absent. Out-of-range keys resolve to `None`.
pub fn user_context(outline: &Outline, key: NodeKey) -> Option<&str> {
    let chapter = outline.chapters.get(key.chapter)?;
    let raw = match (key.topic, key.lesson) {
        (None, _) => chapter.user_added_context.as_deref(),
        (Some(t), None) => chapter.topics.get(t)?.user_added_context.as_deref(),
        (Some(t), Some(l)) => chapter
            .topics
            .get(t)?
            .lessons
            .get(l)?
            .user_added_context
            .as_deref(),
    };
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// One lesson with the library it will be generated against.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonPlan {
    pub key: NodeKey,
    pub title: String,
    pub library: Option<LibraryId>,
    pub has_user_context: bool,
}

/// Every lesson in traversal order, with its effective library.
pub fn lesson_plan(
    outline: &Outline,
    libraries: &KnowledgeLibraries,
    inheritance: LibraryInheritance,
) -> Vec<LessonPlan> {
    let mut plan = Vec::new();
    for (ci, chapter) in outline.chapters.iter().enumerate() {
        for (ti, topic) in chapter.topics.iter().enumerate() {
            for (li, lesson) in topic.lessons.iter().enumerate() {
                let key = NodeKey::lesson(ci, ti, li);
                plan.push(LessonPlan {
                    key,
                    title: lesson.title.clone(),
                    library: resolve_library_with(libraries, inheritance, ci, ti, li).cloned(),
                    has_user_context: user_context(outline, key).is_some(),
                });
            }
        }
    }
    plan
}

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

fn normalize_title(title: &str) -> String {
    NON_ALNUM
        .replace_all(&title.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Pick the part of a shared topic context that belongs to `lesson_title`.
///
/// Exact (normalized) title match first, then containment either way.
/// No match is not an error: the lesson simply goes without web context.
pub fn extract_lesson_slice(context: &TopicWebContext, lesson_title: &str) -> Option<String> {
    let wanted = normalize_title(lesson_title);
    if wanted.is_empty() {
        return None;
    }

    let candidates: Vec<(String, &str)> = context
        .lessons
        .iter()
        .filter(|l| !l.context.trim().is_empty())
        .map(|l| (normalize_title(&l.lesson_title), l.context.as_str()))
        .collect();

    candidates
        .iter()
        .find(|(title, _)| *title == wanted)
        .or_else(|| {
            candidates.iter().find(|(title, _)| {
                !title.is_empty() && (title.contains(&wanted) || wanted.contains(title.as_str()))
            })
        })
        .map(|(_, ctx)| ctx.trim().to_string())
}
