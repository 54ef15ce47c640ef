//! Chat request domain model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse a wire role name. Returns `None` for roles the gateway does
    /// not relay (e.g., tool messages).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters forwarded to the provider as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatParams {
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Stop sequences.
    pub stop: Vec<String>,
}

/// How the caller picked a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSelector {
    /// Use the first model the provider reports as available.
    Auto,
    /// Use exactly this model id.
    Named(String),
}

impl ModelSelector {
    /// Parse a wire model field. An empty string or the literal `"auto"`
    /// selects the first available model.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            Self::Auto
        } else {
            Self::Named(trimmed.to_string())
        }
    }
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// A model the provider can serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Stable identifier used in requests.
    pub id: String,
    /// Human-readable name for listings and logs.
    pub display_name: String,
    /// Model family/vendor when the provider reports one.
    pub family: Option<String>,
    /// Maximum context length in tokens, when known.
    pub context_length: Option<u64>,
}

impl ModelDescriptor {
    /// Descriptor with only an id, for providers that report nothing else.
    pub fn named(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            family: None,
            context_length: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_wire_name() {
        for role in [ChatRole::System, ChatRole::User, ChatRole::Assistant] {
            assert_eq!(ChatRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(ChatRole::parse("tool"), None);
    }

    #[test]
    fn selector_parses_auto_forms() {
        assert_eq!(ModelSelector::parse(""), ModelSelector::Auto);
        assert_eq!(ModelSelector::parse("auto"), ModelSelector::Auto);
        assert_eq!(ModelSelector::parse("AUTO"), ModelSelector::Auto);
        assert_eq!(
            ModelSelector::parse(" gpt-4o "),
            ModelSelector::Named("gpt-4o".to_string())
        );
    }

    #[test]
    fn descriptor_named_mirrors_id() {
        let model = ModelDescriptor::named("llama-3-8b");
        assert_eq!(model.display_name, "llama-3-8b");
        assert!(model.family.is_none());
    }
}
