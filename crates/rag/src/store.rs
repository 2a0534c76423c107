//! The embedded vector store.
//!
//! Collections of embedded chunks held in memory behind an `RwLock`, with a
//! JSON snapshot on disk so the index survives restarts. Concurrent search
//! and ingest are safe; writes take the lock briefly and persist after
//! mutation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agentgw_core::error::Error;

use crate::chunker::{chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::embedding::Embedder;

/// The default collection name.
pub const DEFAULT_COLLECTION: &str = "default";

/// Metadata attached to every chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Logical source this chunk came from
    pub source: String,

    /// Position of this chunk within its document
    pub chunk_index: usize,

    /// How many chunks the document produced
    pub total_chunks: usize,

    /// Skills allowed to retrieve this chunk. Empty = available to all.
    pub skills: Vec<String>,

    /// Free-form tags
    pub tags: Vec<String>,
}

/// An embedded unit of indexed text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A search result with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// A chunk preview returned by listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPreview {
    pub id: String,
    pub preview: String,
    pub metadata: ChunkMetadata,
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths, empty, or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    (dot / denom) as f32
}

/// The embedded vector store.
pub struct VectorStore {
    embedder: Arc<dyn Embedder>,
    collections: RwLock<HashMap<String, Vec<Chunk>>>,
    snapshot_path: Option<PathBuf>,
}

impl VectorStore {
    /// Open a store backed by a JSON snapshot file. An absent or unreadable
    /// snapshot starts empty.
    pub fn open(snapshot_path: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        let path = snapshot_path.into();
        let collections = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HashMap<String, Vec<Chunk>>>(&content) {
                Ok(map) => {
                    let total: usize = map.values().map(Vec::len).sum();
                    info!(chunks = total, path = %path.display(), "Vector index loaded");
                    map
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupt vector index snapshot");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            embedder,
            collections: RwLock::new(collections),
            snapshot_path: Some(path),
        }
    }

    /// A purely in-memory store (tests, ephemeral runs).
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
            snapshot_path: None,
        }
    }

    /// Split `text`, embed the chunks, and insert them into `collection`.
    /// Returns the number of chunks inserted. Re-ingesting the same source
    /// produces fresh chunk ids.
    pub async fn ingest(
        &self,
        source: &str,
        text: &str,
        skills: Vec<String>,
        tags: Vec<String>,
        collection: &str,
    ) -> Result<usize, Error> {
        let pieces = chunk_text(text, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP);
        if pieces.is_empty() {
            return Ok(0);
        }

        let embeddings = self.embedder.embed(&pieces).await?;
        let total = pieces.len();

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| Chunk {
                id: Uuid::new_v4().to_string(),
                text,
                embedding,
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    chunk_index: i,
                    total_chunks: total,
                    skills: skills.clone(),
                    tags: tags.clone(),
                },
            })
            .collect();

        {
            let mut collections = self.collections.write().await;
            collections
                .entry(collection.to_string())
                .or_default()
                .extend(chunks);
        }

        self.persist().await;
        info!(source, collection, chunks = total, "Ingested document");
        Ok(total)
    }

    /// Nearest-neighbour search with skill/tag post-filtering.
    ///
    /// When a filter is active the underlying similarity pass over-fetches
    /// 3·k candidates; the first k survivors are returned in similarity
    /// order, ties broken by insertion order.
    pub async fn search(
        &self,
        query: &str,
        collection: &str,
        skills: &[String],
        tags: &[String],
        k: usize,
    ) -> Result<Vec<SearchHit>, Error> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_texts = vec![query.to_string()];
        let query_embedding = self
            .embedder
            .embed(&query_texts)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let collections = self.collections.read().await;
        let Some(chunks) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let filters_active = !skills.is_empty() || !tags.is_empty();
        let fetch_count = if filters_active { k * 3 } else { k };

        let mut scored: Vec<(f32, &Chunk)> = chunks
            .iter()
            .map(|c| (cosine_similarity(&c.embedding, &query_embedding), c))
            .collect();
        // Stable sort keeps insertion order for equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(fetch_count);

        let hits: Vec<SearchHit> = scored
            .into_iter()
            .filter(|(_, c)| passes_skill_filter(&c.metadata.skills, skills))
            .filter(|(_, c)| passes_tag_filter(&c.metadata.tags, tags))
            .take(k)
            .map(|(score, c)| SearchHit {
                id: c.id.clone(),
                text: c.text.clone(),
                score,
                metadata: c.metadata.clone(),
            })
            .collect();

        debug!(query_len = query.len(), collection, hits = hits.len(), "Vector search");
        Ok(hits)
    }

    /// Unranked chunk previews with optional skill and source filters.
    pub async fn list(
        &self,
        collection: &str,
        skills: &[String],
        source_substring: Option<&str>,
        limit: usize,
    ) -> Vec<DocumentPreview> {
        let collections = self.collections.read().await;
        let Some(chunks) = collections.get(collection) else {
            return Vec::new();
        };

        chunks
            .iter()
            .filter(|c| passes_skill_filter(&c.metadata.skills, skills))
            .filter(|c| match source_substring {
                Some(needle) => c
                    .metadata
                    .source
                    .to_lowercase()
                    .contains(&needle.to_lowercase()),
                None => true,
            })
            .take(limit)
            .map(|c| DocumentPreview {
                id: c.id.clone(),
                preview: c.text.chars().take(200).collect(),
                metadata: c.metadata.clone(),
            })
            .collect()
    }

    /// Delete chunks by id. Returns the number removed.
    pub async fn delete(&self, collection: &str, ids: &[String]) -> usize {
        let removed = {
            let mut collections = self.collections.write().await;
            let Some(chunks) = collections.get_mut(collection) else {
                return 0;
            };
            let before = chunks.len();
            chunks.retain(|c| !ids.contains(&c.id));
            before - chunks.len()
        };

        if removed > 0 {
            self.persist().await;
            info!(collection, removed, "Deleted chunks by id");
        }
        removed
    }

    /// Delete every chunk whose source matches exactly. Returns the count.
    pub async fn delete_by_source(&self, collection: &str, source: &str) -> usize {
        let removed = {
            let mut collections = self.collections.write().await;
            let Some(chunks) = collections.get_mut(collection) else {
                return 0;
            };
            let before = chunks.len();
            chunks.retain(|c| c.metadata.source != source);
            before - chunks.len()
        };

        if removed > 0 {
            self.persist().await;
            info!(collection, source, removed, "Deleted chunks by source");
        }
        removed
    }

    /// Total chunks in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    async fn persist(&self) {
        let Some(path) = &self.snapshot_path else {
            return;
        };

        let collections = self.collections.read().await;
        match serde_json::to_string(&*collections) {
            Ok(json) => {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if let Err(e) = std::fs::write(path, json) {
                    warn!(path = %path.display(), error = %e, "Failed to persist vector index");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize vector index"),
        }
    }
}

/// A chunk passes when no filter is given, when it is unrestricted, or when
/// the sets intersect.
fn passes_skill_filter(chunk_skills: &[String], filter: &[String]) -> bool {
    filter.is_empty()
        || chunk_skills.is_empty()
        || chunk_skills.iter().any(|s| filter.contains(s))
}

/// A chunk passes when no filter is given or the sets intersect. A chunk
/// with no tags never matches an active tag filter.
fn passes_tag_filter(chunk_tags: &[String], filter: &[String]) -> bool {
    filter.is_empty() || chunk_tags.iter().any(|t| filter.contains(t))
}
