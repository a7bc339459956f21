//! Per-call generation options and their defaults.

use serde::{Deserialize, Serialize};

/// How far back a search-capable provider may look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchRecency {
    Day,
    Week,
    Month,
    Year,
}

impl SearchRecency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

/// How much retrieved web content a search-capable provider should pull in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchContextSize {
    Low,
    Medium,
    High,
}

impl SearchContextSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Caller-supplied options. Every field is optional and defaults independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_recency: Option<SearchRecency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_context_size: Option<SearchContextSize>,
}

/// Fully-populated options, as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOptions {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub search_recency: SearchRecency,
    pub search_context_size: SearchContextSize,
}

impl ResolvedOptions {
    /// Defaults for the primary text provider.
    pub fn primary_defaults() -> Self {
        Self {
            model: "gpt-4o".into(),
            temperature: 0.7,
            max_output_tokens: 4_000,
            search_recency: SearchRecency::Month,
            search_context_size: SearchContextSize::Medium,
        }
    }

    /// Defaults for the search-capable web provider.
    pub fn web_defaults() -> Self {
        Self {
            model: "sonar".into(),
            temperature: 0.2,
            max_output_tokens: 1_500,
            search_recency: SearchRecency::Month,
            search_context_size: SearchContextSize::Medium,
        }
    }
}

impl GenerationOptions {
    /// Fill every unset field from `defaults`. Pure.
    pub fn merge(&self, defaults: &ResolvedOptions) -> ResolvedOptions {
        ResolvedOptions {
            model: self.model.clone().unwrap_or_else(|| defaults.model.clone()),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_output_tokens: self.max_output_tokens.unwrap_or(defaults.max_output_tokens),
            search_recency: self.search_recency.unwrap_or(defaults.search_recency),
            search_context_size: self
                .search_context_size
                .unwrap_or(defaults.search_context_size),
        }
    }

    /// Layer `self` over `base`: fields set here win, the rest come from `base`.
    pub fn overlay(&self, base: &GenerationOptions) -> GenerationOptions {
        GenerationOptions {
            model: self.model.clone().or_else(|| base.model.clone()),
            temperature: self.temperature.or(base.temperature),
            max_output_tokens: self.max_output_tokens.or(base.max_output_tokens),
            search_recency: self.search_recency.or(base.search_recency),
            search_context_size: self.search_context_size.or(base.search_context_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_options_take_all_defaults() {
        let resolved = GenerationOptions::default().merge(&ResolvedOptions::web_defaults());
        assert_eq!(resolved, ResolvedOptions::web_defaults());
    }

    #[test]
    fn each_field_defaults_independently() {
        let opts = GenerationOptions {
            temperature: Some(0.1),
            search_recency: Some(SearchRecency::Week),
            ..Default::default()
        };
        let resolved = opts.merge(&ResolvedOptions::primary_defaults());
        assert_eq!(resolved.model, "gpt-4o");
        assert_eq!(resolved.temperature, 0.1);
        assert_eq!(resolved.max_output_tokens, 4_000);
        assert_eq!(resolved.search_recency, SearchRecency::Week);
        assert_eq!(resolved.search_context_size, SearchContextSize::Medium);
    }

    #[test]
    fn overlay_prefers_top_layer() {
        let base = GenerationOptions {
            model: Some("base-model".into()),
            max_output_tokens: Some(100),
            ..Default::default()
        };
        let top = GenerationOptions {
            model: Some("top-model".into()),
            ..Default::default()
        };
        let merged = top.overlay(&base);
        assert_eq!(merged.model.as_deref(), Some("top-model"));
        assert_eq!(merged.max_output_tokens, Some(100));
        assert!(merged.temperature.is_none());
    }

    #[test]
    fn options_deserialize_from_partial_toml() {
        let opts: GenerationOptions =
            toml::from_str("model = \"sonar-pro\"\nsearch_context_size = \"high\"").unwrap();
        assert_eq!(opts.model.as_deref(), Some("sonar-pro"));
        assert_eq!(opts.search_context_size, Some(SearchContextSize::High));
    }
}
