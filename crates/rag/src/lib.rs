//! Knowledge retrieval for agentgw.
//!
//! An embedded vector index over text chunks with per-skill access control:
//! a chunk whose `skills` metadata is empty is available to every skill,
//! otherwise only to the skills it names. Filtering happens after the
//! nearest-neighbour pass — the empty-set-matches-all predicate is a
//! disjunction over dynamic inputs and does not express as a stored-field
//! equality filter.

pub mod chunker;
pub mod embedding;
pub mod store;

pub use chunker::chunk_text;
pub use embedding::{Embedder, LocalEmbedder, ProviderEmbedder};
pub use store::{Chunk, ChunkMetadata, DocumentPreview, SearchHit, VectorStore};
