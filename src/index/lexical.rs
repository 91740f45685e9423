//! Lexical index gateway and in-memory BM25 reference implementation.
//!
//! The trait mirrors what a hosted inverted index (OpenSearch, Tantivy
//! server) exposes; the in-memory implementation keeps per-tenant postings
//! and scores with Okapi BM25:
//!
//! ```text
//! BM25(q, d) = Σ IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * |d|/avgdl))
//! ```
//!
//! with `IDF(t) = ln(1 + (N - df + 0.5) / (df + 0.5))`, which keeps scores
//! non-negative for very common terms.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::LexicalConfig;
use crate::core::{CancelToken, DocumentChunk, TenantId};
use crate::error::{Error, ExternalError, Result};
use crate::textutil::tokenize;
use unicode_segmentation::UnicodeSegmentation;

/// A raw lexical search hit.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    /// Matching chunk.
    pub chunk_id: Uuid,
    /// Document the chunk belongs to.
    pub document_id: Uuid,
    /// Chunk text.
    pub text: String,
    /// Raw BM25 score (un-normalized).
    pub raw_score: f32,
    /// Fragment around the matched terms, bounded by the configured
    /// fragment size, with matches wrapped in `<em>` tags.
    pub highlight: Option<String>,
}

/// Lexical index collaborator contract.
///
/// Every operation is tenant-scoped; implementations must never return a
/// chunk from another tenant.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Creates the tenant's index if it does not exist. Idempotent.
    async fn ensure_index(&self, tenant: &TenantId) -> Result<()>;

    /// Inserts or replaces one chunk.
    async fn upsert_chunk(&self, chunk: &DocumentChunk) -> Result<()>;

    /// Inserts or replaces a batch of chunks.
    async fn bulk_upsert(&self, chunks: &[DocumentChunk]) -> Result<()>;

    /// Searches the tenant's index, returning up to `top_k` hits in
    /// descending raw-score order.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        tenant: &TenantId,
        cancel: &CancelToken,
    ) -> Result<Vec<LexicalHit>>;

    /// Removes one chunk.
    async fn delete_chunk(&self, id: Uuid, tenant: &TenantId) -> Result<()>;

    /// Removes every chunk of a document.
    async fn delete_document(&self, document_id: Uuid, tenant: &TenantId) -> Result<()>;
}

#[derive(Debug, Clone)]
struct ChunkEntry {
    document_id: Uuid,
    text: String,
    term_counts: HashMap<String, u32>,
    token_len: usize,
}

#[derive(Debug, Default)]
struct TenantIndex {
    chunks: HashMap<Uuid, ChunkEntry>,
    postings: HashMap<String, HashSet<Uuid>>,
    total_tokens: usize,
}

impl TenantIndex {
    fn remove_chunk(&mut self, id: &Uuid) {
        if let Some(entry) = self.chunks.remove(id) {
            self.total_tokens -= entry.token_len;
            for term in entry.term_counts.keys() {
                if let Some(ids) = self.postings.get_mut(term) {
                    ids.remove(id);
                    if ids.is_empty() {
                        self.postings.remove(term);
                    }
                }
            }
        }
    }

    fn insert_chunk(&mut self, chunk: &DocumentChunk) {
        self.remove_chunk(&chunk.id);

        let tokens = tokenize(&chunk.text);
        let mut term_counts: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *term_counts.entry(token.clone()).or_insert(0) += 1;
        }
        for term in term_counts.keys() {
            self.postings.entry(term.clone()).or_default().insert(chunk.id);
        }
        self.total_tokens += tokens.len();
        self.chunks.insert(
            chunk.id,
            ChunkEntry {
                document_id: chunk.document_id,
                text: chunk.text.clone(),
                term_counts,
                token_len: tokens.len(),
            },
        );
    }
}

/// In-memory per-tenant BM25 index.
pub struct MemoryLexicalIndex {
    config: LexicalConfig,
    tenants: RwLock<HashMap<TenantId, TenantIndex>>,
}

impl MemoryLexicalIndex {
    /// Creates an empty index with the given BM25 parameters.
    #[must_use]
    pub fn new(config: LexicalConfig) -> Self {
        Self {
            config,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    /// Number of chunks indexed for a tenant.
    #[must_use]
    pub fn chunk_count(&self, tenant: &TenantId) -> usize {
        self.tenants
            .read()
            .map(|tenants| tenants.get(tenant).map_or(0, |idx| idx.chunks.len()))
            .unwrap_or(0)
    }

    #[allow(clippy::cast_precision_loss)]
    fn score_tenant(
        &self,
        index: &TenantIndex,
        query_terms: &[String],
        top_k: usize,
    ) -> Vec<LexicalHit> {
        let doc_count = index.chunks.len();
        if doc_count == 0 || query_terms.is_empty() {
            return Vec::new();
        }
        let avgdl = index.total_tokens as f32 / doc_count as f32;

        // Candidates: any chunk containing at least one query term.
        let mut candidates: HashSet<Uuid> = HashSet::new();
        for term in query_terms {
            if let Some(ids) = index.postings.get(term) {
                candidates.extend(ids.iter().copied());
            }
        }

        let k1 = self.config.k1;
        let b = self.config.b;
        let mut scored: Vec<(Uuid, f32)> = candidates
            .into_iter()
            .filter_map(|id| index.chunks.get(&id).map(|entry| (id, entry)))
            .map(|(id, entry)| {
                let mut score = 0.0f32;
                for term in query_terms {
                    let tf = entry.term_counts.get(term).copied().unwrap_or(0) as f32;
                    if tf == 0.0 {
                        continue;
                    }
                    let df = index.postings.get(term).map_or(0, HashSet::len) as f32;
                    let idf = (1.0 + (doc_count as f32 - df + 0.5) / (df + 0.5)).ln();
                    let norm = k1 * (1.0 - b + b * entry.token_len as f32 / avgdl);
                    score += idf * (tf * (k1 + 1.0)) / (tf + norm);
                }
                (id, score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        scored
            .into_iter()
            .filter_map(|(id, raw_score)| {
                index.chunks.get(&id).map(|entry| LexicalHit {
                    chunk_id: id,
                    document_id: entry.document_id,
                    text: entry.text.clone(),
                    raw_score,
                    highlight: extract_highlight(
                        &entry.text,
                        query_terms,
                        self.config.fragment_size,
                    ),
                })
            })
            .collect()
    }

    fn read_lock(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<TenantId, TenantIndex>>> {
        self.tenants.read().map_err(|_| {
            ExternalError::LexicalUnavailable {
                reason: "index lock poisoned".to_string(),
            }
            .into()
        })
    }

    fn write_lock(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<TenantId, TenantIndex>>> {
        self.tenants.write().map_err(|_| {
            ExternalError::LexicalUnavailable {
                reason: "index lock poisoned".to_string(),
            }
            .into()
        })
    }
}

/// Extracts the best fragment of `fragment_size` characters around the
/// first matched term, wrapping matched words in `<em>` tags.
fn extract_highlight(text: &str, query_terms: &[String], fragment_size: usize) -> Option<String> {
    let lower = text.to_lowercase();
    let first_match = query_terms
        .iter()
        .filter_map(|term| lower.find(term.as_str()))
        .min()?;

    // Center the fragment on the first match, clamped to char boundaries.
    let half = fragment_size / 2;
    let mut start = first_match.saturating_sub(half);
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (start + fragment_size).min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    let fragment = &text[start..end];

    // Wrap matched words. Rebuilding word-by-word keeps tags on token
    // boundaries rather than mid-word substring hits.
    let mut highlighted = String::with_capacity(fragment.len() + 16);
    let mut last = 0;
    for (word_start, word) in fragment
        .split_word_bound_indices()
    {
        let lower_word = word.to_lowercase();
        if query_terms.iter().any(|t| *t == lower_word) {
            highlighted.push_str(&fragment[last..word_start]);
            highlighted.push_str("<em>");
            highlighted.push_str(word);
            highlighted.push_str("</em>");
            last = word_start + word.len();
        }
    }
    highlighted.push_str(&fragment[last..]);
    Some(highlighted)
}

#[async_trait]
impl LexicalIndex for MemoryLexicalIndex {
    async fn ensure_index(&self, tenant: &TenantId) -> Result<()> {
        self.write_lock()?.entry(tenant.clone()).or_default();
        Ok(())
    }

    async fn upsert_chunk(&self, chunk: &DocumentChunk) -> Result<()> {
        self.write_lock()?
            .entry(chunk.tenant.clone())
            .or_default()
            .insert_chunk(chunk);
        Ok(())
    }

    async fn bulk_upsert(&self, chunks: &[DocumentChunk]) -> Result<()> {
        let mut tenants = self.write_lock()?;
        for chunk in chunks {
            tenants
                .entry(chunk.tenant.clone())
                .or_default()
                .insert_chunk(chunk);
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        tenant: &TenantId,
        cancel: &CancelToken,
    ) -> Result<Vec<LexicalHit>> {
        if query.trim().is_empty() {
            return Err(Error::invalid_input("query must not be empty"));
        }
        cancel.check()?;
        let query_terms = tokenize(query);
        let tenants = self.read_lock()?;
        Ok(tenants
            .get(tenant)
            .map(|index| self.score_tenant(index, &query_terms, top_k))
            .unwrap_or_default())
    }

    async fn delete_chunk(&self, id: Uuid, tenant: &TenantId) -> Result<()> {
        if let Some(index) = self.write_lock()?.get_mut(tenant) {
            index.remove_chunk(&id);
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: Uuid, tenant: &TenantId) -> Result<()> {
        if let Some(index) = self.write_lock()?.get_mut(tenant) {
            let doomed: Vec<Uuid> = index
                .chunks
                .iter()
                .filter(|(_, entry)| entry.document_id == document_id)
                .map(|(id, _)| *id)
                .collect();
            for id in doomed {
                index.remove_chunk(&id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::new("t1").unwrap()
    }

    fn chunk(doc: Uuid, ordinal: usize, text: &str) -> DocumentChunk {
        DocumentChunk::new(doc, tenant(), ordinal, text, 0, text.len())
    }

    async fn index_with_corpus() -> (MemoryLexicalIndex, Uuid) {
        let index = MemoryLexicalIndex::new(LexicalConfig::default());
        let doc = Uuid::new_v4();
        let chunks = vec![
            chunk(doc, 0, "Paris is the capital of France."),
            chunk(doc, 1, "Berlin is the capital of Germany."),
            chunk(doc, 2, "The Seine flows through Paris."),
        ];
        index.bulk_upsert(&chunks).await.unwrap();
        (index, doc)
    }

    #[tokio::test]
    async fn test_search_ranks_matching_chunks() {
        let index = MemoryLexicalIndex::new(LexicalConfig::default());
        let doc = Uuid::new_v4();
        index
            .bulk_upsert(&[
                chunk(doc, 0, "Paris is the capital of France."),
                chunk(doc, 1, "Berlin is the capital of Germany."),
                chunk(doc, 2, "The Seine flows through Paris."),
            ])
            .await
            .unwrap();

        let hits = index
            .search("capital of France", 10, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert!(hits[0].text.contains("France"));
        // Scores descend.
        for pair in hits.windows(2) {
            assert!(pair[0].raw_score >= pair[1].raw_score);
        }
    }

    #[tokio::test]
    async fn test_search_respects_top_k() {
        let (index, _) = index_with_corpus().await;
        let hits = index
            .search("capital", 1, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_search_empty_query_rejected() {
        let (index, _) = index_with_corpus().await;
        let result = index
            .search("   ", 5, &tenant(), &CancelToken::new())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_search_unknown_tenant_is_empty() {
        let (index, _) = index_with_corpus().await;
        let other = TenantId::new("t2").unwrap();
        let hits = index
            .search("capital", 5, &other, &CancelToken::new())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_chunk() {
        let index = MemoryLexicalIndex::new(LexicalConfig::default());
        let doc = Uuid::new_v4();
        let mut c = chunk(doc, 0, "old text about ships");
        index.upsert_chunk(&c).await.unwrap();
        c.text = "new text about trains".to_string();
        index.upsert_chunk(&c).await.unwrap();

        assert_eq!(index.chunk_count(&tenant()), 1);
        let hits = index
            .search("ships", 5, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        assert!(hits.is_empty());
        let hits = index
            .search("trains", 5, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_document_removes_all_chunks() {
        let (index, doc) = index_with_corpus().await;
        index.delete_document(doc, &tenant()).await.unwrap();
        assert_eq!(index.chunk_count(&tenant()), 0);
    }

    #[tokio::test]
    async fn test_delete_chunk() {
        let index = MemoryLexicalIndex::new(LexicalConfig::default());
        let doc = Uuid::new_v4();
        let c = chunk(doc, 0, "solitary chunk");
        index.upsert_chunk(&c).await.unwrap();
        index.delete_chunk(c.id, &tenant()).await.unwrap();
        assert_eq!(index.chunk_count(&tenant()), 0);
    }

    #[tokio::test]
    async fn test_highlight_wraps_matches() {
        let (index, _) = index_with_corpus().await;
        let hits = index
            .search("capital France", 1, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        let highlight = hits[0].highlight.as_deref().unwrap();
        assert!(highlight.contains("<em>capital</em>"));
        assert!(highlight.contains("<em>France</em>"));
    }

    #[tokio::test]
    async fn test_highlight_bounded_by_fragment_size() {
        let config = LexicalConfig {
            fragment_size: 40,
            ..LexicalConfig::default()
        };
        let index = MemoryLexicalIndex::new(config);
        let doc = Uuid::new_v4();
        let long_text = format!("{} capital {}", "x".repeat(300), "y".repeat(300));
        index.upsert_chunk(&chunk(doc, 0, &long_text)).await.unwrap();
        let hits = index
            .search("capital", 1, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        let highlight = hits[0].highlight.as_deref().unwrap();
        // Fragment plus em tags stays well under the raw text length.
        assert!(highlight.len() < 80);
    }

    #[tokio::test]
    async fn test_idf_prefers_rare_terms() {
        let index = MemoryLexicalIndex::new(LexicalConfig::default());
        let doc = Uuid::new_v4();
        index
            .bulk_upsert(&[
                chunk(doc, 0, "common common common rare"),
                chunk(doc, 1, "common words everywhere"),
                chunk(doc, 2, "common filler text"),
            ])
            .await
            .unwrap();
        let hits = index
            .search("rare", 3, &tenant(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].raw_score > 0.0);
    }

    #[tokio::test]
    async fn test_ensure_index_idempotent() {
        let index = MemoryLexicalIndex::new(LexicalConfig::default());
        index.ensure_index(&tenant()).await.unwrap();
        index.ensure_index(&tenant()).await.unwrap();
        assert_eq!(index.chunk_count(&tenant()), 0);
    }

    #[tokio::test]
    async fn test_search_cancelled() {
        let (index, _) = index_with_corpus().await;
        let token = CancelToken::new();
        token.cancel();
        assert!(index.search("capital", 5, &tenant(), &token).await.is_err());
    }
}
