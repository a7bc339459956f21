//! Prompt text for every generation call.
//!
//! Each builder returns `(system, user)`. Pure, so the exact wording is
//! testable without a server.

use coursepress_core::services::{
    LessonContentRequest, LessonStub, ResearchBriefRequest, TopicIntroRequest,
    TopicWebContextRequest, UpstreamContext, WebReferencesRequest,
};

const WRITER_SYSTEM: &str = "You are an expert instructional writer producing a structured \
ebook. Stay consistent with the book's research brief and the chapter framing you are given.";

const RESEARCHER_SYSTEM: &str = "You are a research assistant with live web access. Report \
only current, verifiable information and answer in the exact JSON shape requested.";

fn upstream_block(upstream: &UpstreamContext) -> String {
    let mut out = format!("Book: {}\n", upstream.book_title);
    if !upstream.research_brief.trim().is_empty() {
        out.push_str(&format!("Research brief:\n{}\n", upstream.research_brief.trim()));
    }
    out.push_str(&format!("Chapter: {}\n", upstream.chapter_title));
    if !upstream.chapter_description.trim().is_empty() {
        out.push_str(&format!("Chapter description: {}\n", upstream.chapter_description.trim()));
    }
    if !upstream.topic_title.is_empty() {
        out.push_str(&format!("Topic: {}\n", upstream.topic_title));
    }
    if !upstream.learning_objective.trim().is_empty() {
        out.push_str(&format!("Learning objective: {}\n", upstream.learning_objective.trim()));
    }
    out
}

fn lesson_list(lessons: &[LessonStub]) -> String {
    lessons
        .iter()
        .enumerate()
        .map(|(i, l)| {
            if l.description.trim().is_empty() {
                format!("{}. {}", i + 1, l.title)
            } else {
                format!("{}. {}: {}", i + 1, l.title, l.description.trim())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn research_brief(request: &ResearchBriefRequest) -> (String, String) {
    let mut user = format!(
        "Write a research brief for an ebook about: {}\n\
         Cover the audience, their current knowledge gaps, and the market for this subject.",
        request.topic.trim()
    );
    if !request.must_haves.trim().is_empty() {
        user.push_str(&format!("\nMust include: {}", request.must_haves.trim()));
    }
    if !request.other_considerations.trim().is_empty() {
        user.push_str(&format!(
            "\nOther considerations: {}",
            request.other_considerations.trim()
        ));
    }
    user.push_str("\nReturn HTML paragraphs only.");
    (WRITER_SYSTEM.to_string(), user)
}

pub fn topic_introduction(request: &TopicIntroRequest) -> (String, String) {
    let user = format!(
        "{}\nLessons in this topic:\n{}\n\n\
         Write a two-paragraph introduction to this topic that motivates the lessons above. \
         Plain text, no headings.",
        upstream_block(&request.upstream),
        lesson_list(&request.lessons)
    );
    (WRITER_SYSTEM.to_string(), user)
}

pub fn lesson_content(request: &LessonContentRequest) -> (String, String) {
    let mut user = format!(
        "{}\nLesson: {}\n",
        upstream_block(&request.upstream),
        request.lesson_title
    );
    if !request.lesson_description.trim().is_empty() {
        user.push_str(&format!("Lesson description: {}\n", request.lesson_description.trim()));
    }
    user.push_str(&format!("\nStyle: {}\n", request.style));
    if let Some(context) = &request.user_context {
        user.push_str(&format!("\nAuthor notes to honour:\n{context}\n"));
    }
    if let Some(web) = &request.web_context {
        user.push_str(&format!(
            "\nCurrent information from the web (cite where relevant):\n{web}\n"
        ));
    }
    if request.library.is_some() {
        user.push_str("\nGround the lesson in the attached knowledge library where it applies.\n");
    }
    user.push_str("\nWrite the full lesson as HTML (h2/h3, p, ul, pre). No surrounding <html> or <body>.");
    (WRITER_SYSTEM.to_string(), user)
}

pub fn topic_web_context(request: &TopicWebContextRequest) -> (String, String) {
    let user = format!(
        "Book: {}\nChapter: {}\nTopic: {}\nLessons:\n{}\n\n\
         Research what is current and relevant for each lesson. Respond with one JSON object:\n\
         {{\"summary\": string, \"lessons\": [{{\"lessonTitle\": string, \"context\": string}}], \
         \"sources\": [string]}}\n\
         Use the lesson titles exactly as given.",
        request.book_title,
        request.chapter_title,
        request.topic_title,
        lesson_list(&request.lessons)
    );
    (RESEARCHER_SYSTEM.to_string(), user)
}

pub fn web_references(request: &WebReferencesRequest) -> (String, String) {
    let user = format!(
        "Book: {}\nTopic: {}\n\n\
         List up to five authoritative, currently available web references for this topic. \
         Respond with a JSON array: [{{\"title\": string, \"url\": string}}]",
        request.book_title, request.topic_title
    );
    (RESEARCHER_SYSTEM.to_string(), user)
}
