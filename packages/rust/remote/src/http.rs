//! Client construction and response handling shared by every HTTP collaborator.

use std::time::Duration;

use reqwest::{Client, Response};
use url::Url;

use coursepress_shared::{PublishError, Result};

/// User-Agent string for every outbound request.
pub const USER_AGENT: &str = concat!("coursepress/", env!("CARGO_PKG_VERSION"));

/// Maximum number of characters of an error body kept in messages.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Build a reqwest client. Requests only time out when `timeout_secs` is set.
pub fn build_client(timeout_secs: Option<u64>) -> Result<Client> {
    let mut builder = Client::builder().user_agent(USER_AGENT);
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder
        .build()
        .map_err(|e| PublishError::Network(format!("failed to build HTTP client: {e}")))
}

/// Parse and normalize a base URL (no trailing slash).
pub fn parse_base_url(raw: &str, what: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    Url::parse(trimmed)
        .map_err(|e| PublishError::config(format!("invalid {what} URL '{raw}': {e}")))?;
    Ok(trimmed.to_string())
}

/// Join path segments onto a base, ignoring stray slashes.
pub fn join(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if !segment.is_empty() {
            url.push('/');
            url.push_str(segment);
        }
    }
    url
}

/// Read a non-2xx response into a short `HTTP <status>: <body>` message.
pub async fn status_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", truncate(body, MAX_ERROR_BODY_CHARS))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_normalizes_slashes() {
        assert_eq!(
            join("https://cms.test/wp-json/", &["/wp/v2/", "chapters"]),
            "https://cms.test/wp-json/wp/v2/chapters"
        );
        assert_eq!(join("https://cms.test", &["", "users/me"]), "https://cms.test/users/me");
    }

    #[test]
    fn base_url_is_validated() {
        assert_eq!(
            parse_base_url("https://cms.test/wp-json/", "remote").unwrap(),
            "https://cms.test/wp-json"
        );
        assert!(matches!(
            parse_base_url("not a url", "remote"),
            Err(PublishError::Config { .. })
        ));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let long = "x".repeat(500);
        let short = truncate(&long, 10);
        assert_eq!(short.chars().count(), 11);
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn user_agent_names_the_tool() {
        assert!(USER_AGENT.starts_with("coursepress/"));
    }
}
