//! HTML body composition for each node level, plus the deterministic
//! placeholder text used when generation is exhausted.

use coursepress_shared::{Chapter, Outline, WebReference};

/// Instructional voice every lesson is written in.
pub const INSTRUCTIONAL_STYLE: &str = "Clear, practical instruction addressed to the reader. \
Explain each concept, then show a worked example, then summarize the key takeaways.";

/// Minimal HTML escaping for user- and provider-supplied plain text.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wrap plain text in `<p>` per blank-line-separated paragraph.
fn paragraphs(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", escape_html(p)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Join non-empty parts with blank lines.
fn join_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Block carrying the author's own notes for a node.
pub fn user_context_block(context: &str) -> String {
    format!(
        "<div class=\"user-context\">\n<h3>Additional Context</h3>\n{}\n</div>",
        paragraphs(context)
    )
}

/// Reference list for a topic. Empty input yields an empty string.
pub fn references_block(references: &[WebReference]) -> String {
    if references.is_empty() {
        return String::new();
    }
    let items = references
        .iter()
        .map(|r| {
            format!(
                "<li><a href=\"{}\">{}</a></li>",
                escape_html(&r.url),
                escape_html(&r.title)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("<div class=\"references\">\n<h3>References</h3>\n<ul>\n{items}\n</ul>\n</div>")
}

/// Root body: preface, introduction, research brief. These are already HTML.
pub fn root_body(outline: &Outline) -> String {
    join_parts([
        outline.preface.as_str(),
        outline.introduction.as_str(),
        outline.research_brief.as_str(),
    ])
}

pub fn chapter_body(chapter: &Chapter, user_context: Option<&str>) -> String {
    let description = paragraphs(&chapter.description);
    let context = user_context.map(user_context_block).unwrap_or_default();
    join_parts([description.as_str(), context.as_str()])
}

pub fn topic_body(
    learning_objective: &str,
    introduction: &str,
    user_context: Option<&str>,
    references: &[WebReference],
) -> String {
    let objective = if learning_objective.trim().is_empty() {
        String::new()
    } else {
        format!(
            "<p class=\"learning-objective\"><strong>Learning objective:</strong> {}</p>",
            escape_html(learning_objective.trim())
        )
    };
    let introduction = paragraphs(introduction);
    let context = user_context.map(user_context_block).unwrap_or_default();
    let references = references_block(references);
    join_parts([
        objective.as_str(),
        introduction.as_str(),
        context.as_str(),
        references.as_str(),
    ])
}

/// Lesson body. `content_html` is provider HTML and is not escaped.
pub fn lesson_body(description: &str, content_html: &str, user_context: Option<&str>) -> String {
    let description = paragraphs(description);
    let context = user_context.map(user_context_block).unwrap_or_default();
    join_parts([description.as_str(), content_html, context.as_str()])
}

/// Deterministic topic introduction used when every attempt failed.
pub fn topic_introduction_placeholder(topic_title: &str, chapter_title: &str) -> String {
    format!(
        "This topic explores {topic_title} as part of {chapter_title}. \
         The lessons that follow build on each other, so work through them in order."
    )
}

/// Deterministic lesson body used when every attempt failed. Never empty.
pub fn lesson_content_placeholder(lesson_title: &str, lesson_description: &str) -> String {
    let mut html = format!(
        "<h2>{}</h2>\n<p>Detailed content for this lesson is being prepared.</p>",
        escape_html(lesson_title)
    );
    if !lesson_description.trim().is_empty() {
        html.push_str(&format!(
            "\n<p>In this lesson: {}</p>",
            escape_html(lesson_description.trim())
        ));
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html_covers_markup() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn root_body_skips_empty_parts() {
        let outline = Outline {
            title: "B".into(),
            preface: "<p>Preface</p>".into(),
            introduction: "  ".into(),
            research_brief: "<p>Brief</p>".into(),
            ..Default::default()
        };
        assert_eq!(root_body(&outline), "<p>Preface</p>\n\n<p>Brief</p>");
    }

    #[test]
    fn chapter_body_appends_context_block() {
        let chapter = Chapter {
            title: "C".into(),
            description: "First para.\n\nSecond para.".into(),
            ..Default::default()
        };
        let body = chapter_body(&chapter, Some("Use <local> data"));
        assert!(body.starts_with("<p>First para.</p>\n<p>Second para.</p>"));
        assert!(body.contains("Additional Context"));
        assert!(body.contains("Use &lt;local&gt; data"));

        let plain = chapter_body(&chapter, None);
        assert!(!plain.contains("user-context"));
    }

    #[test]
    fn topic_body_orders_sections() {
        let refs = vec![WebReference {
            title: "Rust Book".into(),
            url: "https://doc.rust-lang.org/book/".into(),
        }];
        let body = topic_body("Understand moves", "Intro text", Some("ctx"), &refs);
        let objective = body.find("Learning objective").unwrap();
        let intro = body.find("Intro text").unwrap();
        let context = body.find("Additional Context").unwrap();
        let references = body.find("References").unwrap();
        assert!(objective < intro && intro < context && context < references);
    }

    #[test]
    fn references_block_empty_when_no_refs() {
        assert_eq!(references_block(&[]), "");
    }

    #[test]
    fn lesson_body_keeps_provider_html() {
        let body = lesson_body("Desc", "<h2>Generated</h2>", None);
        assert_eq!(body, "<p>Desc</p>\n\n<h2>Generated</h2>");
    }

    #[test]
    fn placeholders_are_deterministic_and_non_empty() {
        let a = lesson_content_placeholder("Moves", "What a move is");
        let b = lesson_content_placeholder("Moves", "What a move is");
        assert_eq!(a, b);
        assert!(a.contains("Moves"));
        assert!(!lesson_content_placeholder("X", "").is_empty());
        assert!(topic_introduction_placeholder("Ownership", "Basics").contains("Ownership"));
    }
}
