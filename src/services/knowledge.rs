//! Knowledge-base retrieval for prompt augmentation.
//!
//! Retrieval is best-effort by contract: any failure here degrades to
//! "no augmentation" and must never abort the request being served.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::PgPool;

/// Cap on the sanitized search phrase length.
pub const MAX_SEARCH_PHRASE_CHARS: usize = 120;

/// Cap on entries concatenated into one context block.
pub const MAX_CONTEXT_ENTRIES: i64 = 3;

/// Cap on suggested follow-up topics for deployment chat.
pub const MAX_SUGGESTED_TOPICS: i64 = 5;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("URL pattern must compile"));

/// One knowledge-base entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KnowledgeEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    pub content: String,
}

/// Retrieval boundary for knowledge-base lookups.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Entries whose name or description fuzzy-matches the phrase.
    async fn search(&self, phrase: &str, limit: i64) -> Result<Vec<KnowledgeEntry>, sqlx::Error>;

    /// Entry names for follow-up topic suggestions.
    async fn entry_names(&self, limit: i64) -> Result<Vec<String>, sqlx::Error>;
}

/// Postgres-backed knowledge source over `knowledge_entries`.
pub struct PgKnowledgeSource {
    pool: PgPool,
}

impl PgKnowledgeSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KnowledgeSource for PgKnowledgeSource {
    async fn search(&self, phrase: &str, limit: i64) -> Result<Vec<KnowledgeEntry>, sqlx::Error> {
        let pattern = format!("%{}%", phrase);
        sqlx::query_as::<_, KnowledgeEntry>(
            r#"
            SELECT id, name, description, content
            FROM knowledge_entries
            WHERE is_enabled = true AND (name ILIKE $1 OR description ILIKE $1)
            ORDER BY name
            LIMIT $2
            "#,
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn entry_names(&self, limit: i64) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT name FROM knowledge_entries
            WHERE is_enabled = true
            ORDER BY updated_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

/// Reduce a raw prompt to a short, safe search phrase.
///
/// Strips URLs, replaces non-alphanumeric characters with spaces,
/// collapses whitespace, and truncates to [`MAX_SEARCH_PHRASE_CHARS`].
pub fn sanitize_search_phrase(prompt: &str) -> String {
    let without_urls = URL_PATTERN.replace_all(prompt, " ");

    let cleaned: String = without_urls
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_SEARCH_PHRASE_CHARS).collect();
    truncated.trim_end().to_string()
}

/// Concatenate matched entries into one context block.
pub fn build_knowledge_block(entries: &[KnowledgeEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }

    let block = entries
        .iter()
        .map(|entry| {
            let body = if entry.content.is_empty() {
                &entry.description
            } else {
                &entry.content
            };
            format!("- {}: {}", entry.name, body)
        })
        .collect::<Vec<_>>()
        .join("\n");

    Some(block)
}
