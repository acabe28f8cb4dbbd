//! Model name normalization and capability lookup.
//!
//! Callers name legacy vendor models; the gateway only ever dispatches
//! canonical `vendor/model` identifiers understood by the unified
//! upstream. The alias table and capability rules are immutable,
//! compiled-in data.

/// Fallback when the requested model is neither a known alias nor an
/// already-canonical identifier. Balanced tier.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Vendor prefixes the unified gateway accepts directly.
const SUPPORTED_PREFIXES: &[&str] = &["google/", "openai/"];

/// Legacy/external model names, matched case-insensitively.
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("claude-3-5-sonnet", "google/gemini-2.5-flash"),
    ("claude-3-sonnet", "google/gemini-2.5-flash"),
    ("claude-3-5-haiku", "google/gemini-2.5-flash-lite"),
    ("claude-3-haiku", "google/gemini-2.5-flash-lite"),
    ("claude-3-opus", "google/gemini-2.5-pro"),
    ("gpt-4", "openai/gpt-5"),
    ("gpt-4-turbo", "openai/gpt-5"),
    ("gpt-4o", "openai/gpt-5"),
    ("gpt-4o-mini", "openai/gpt-5-mini"),
    ("gpt-3.5-turbo", "openai/gpt-5-nano"),
    ("gemini-pro", "google/gemini-2.5-pro"),
    ("gemini-1.5-pro", "google/gemini-2.5-pro"),
    ("gemini-1.5-flash", "google/gemini-2.5-flash"),
];

/// Map a caller-supplied model string to a canonical gateway identifier.
///
/// Alias hits win; already-canonical identifiers for supported vendors
/// pass through unchanged; everything else falls back to [`DEFAULT_MODEL`].
pub fn normalize_model(requested: &str) -> String {
    let trimmed = requested.trim();
    let lowered = trimmed.to_ascii_lowercase();

    for (alias, canonical) in MODEL_ALIASES {
        if lowered == *alias {
            return (*canonical).to_string();
        }
    }

    if SUPPORTED_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
    {
        return trimmed.to_string();
    }

    DEFAULT_MODEL.to_string()
}

/// Vendor segment of a canonical `vendor/model` identifier.
pub fn vendor_of(model: &str) -> &str {
    model.split('/').next().unwrap_or(model)
}

/// What the gateway wire format supports for a given model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// Parameter name carrying the token bound
    pub token_param: &'static str,
    /// Whether `temperature` is honored at all
    pub supports_temperature: bool,
}

const DEFAULT_CAPABILITIES: ModelCapabilities = ModelCapabilities {
    token_param: "max_tokens",
    supports_temperature: true,
};

/// Newer families take `max_completion_tokens` and ignore `temperature`.
/// Keyed by model-name substring, first match wins.
const CAPABILITY_RULES: &[(&str, ModelCapabilities)] = &[
    (
        "gpt-5",
        ModelCapabilities {
            token_param: "max_completion_tokens",
            supports_temperature: false,
        },
    ),
    (
        "/o3",
        ModelCapabilities {
            token_param: "max_completion_tokens",
            supports_temperature: false,
        },
    ),
    (
        "/o4",
        ModelCapabilities {
            token_param: "max_completion_tokens",
            supports_temperature: false,
        },
    ),
];

pub fn capabilities_for(model: &str) -> ModelCapabilities {
    CAPABILITY_RULES
        .iter()
        .find(|(needle, _)| model.contains(needle))
        .map(|(_, caps)| *caps)
        .unwrap_or(DEFAULT_CAPABILITIES)
}
