//! Standalone research-brief generation.

use tracing::{info, instrument};

use coursepress_shared::{CredentialPair, GenerationOptions, PublishError, Result};

use crate::cancel::CancelToken;
use crate::fallback::{Generated, with_fallback};
use crate::services::{ContentGenerator, ResearchBriefRequest};

/// Generate a research brief with primary → fallback credentials.
///
/// Unlike in-tree enrichment there is no placeholder: exhausting both keys
/// is an [`PublishError::Enrichment`] error.
#[instrument(skip_all, fields(topic = %request.topic))]
pub async fn generate_research_brief(
    generator: &dyn ContentGenerator,
    keys: &CredentialPair,
    request: &ResearchBriefRequest,
    options: &GenerationOptions,
    cancel: &CancelToken,
) -> Result<String> {
    if request.topic.trim().is_empty() {
        return Err(PublishError::validation("research topic is empty"));
    }
    if keys.is_empty() {
        return Err(PublishError::config(
            "no primary provider credential configured",
        ));
    }

    let generated = with_fallback(cancel, keys, "research brief", move |key| async move {
        generator.research_brief(request, options, &key).await
    })
    .await?;

    match generated {
        Generated::Exhausted { errors } => Err(PublishError::Enrichment(format!(
            "research brief could not be generated: {}",
            errors.join("; ")
        ))),
        other => {
            let used_fallback = other.used_fallback();
            let brief = other.into_value().unwrap_or_default();
            info!(chars = brief.len(), used_fallback, "research brief generated");
            Ok(brief)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FALLBACK_KEY, FakeGenerator, PRIMARY_KEY, both_keys};

    fn request() -> ResearchBriefRequest {
        ResearchBriefRequest {
            topic: "Rust for embedded teams".into(),
            must_haves: "no_std".into(),
            other_considerations: String::new(),
        }
    }

    #[tokio::test]
    async fn brief_from_primary() {
        let generator = FakeGenerator::new();
        let brief = generate_research_brief(
            &generator,
            &both_keys(),
            &request(),
            &GenerationOptions::default(),
            &CancelToken::new(),
        )
        .await
        .unwrap();
        assert!(brief.contains("Rust for embedded teams"));
    }

    #[tokio::test]
    async fn exhausted_keys_are_an_error() {
        let generator = FakeGenerator::new()
            .failing_with(PRIMARY_KEY)
            .failing_with(FALLBACK_KEY);
        let err = generate_research_brief(
            &generator,
            &both_keys(),
            &request(),
            &GenerationOptions::default(),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PublishError::Enrichment(_)));
        assert!(err.to_string().contains(PRIMARY_KEY));
    }

    #[tokio::test]
    async fn empty_topic_is_rejected() {
        let err = generate_research_brief(
            &FakeGenerator::new(),
            &both_keys(),
            &ResearchBriefRequest::default(),
            &GenerationOptions::default(),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PublishError::Validation { .. }));
    }
}
