//! Semantic search over coffee reviews.
//!
//! Query vectors come from free text (embedded with fastembed-rs) or from
//! weighted concept-vector arithmetic, are ranked by cosine similarity and
//! hydrated into full review rows.
//!
//! # Architecture
//!
//! - `concepts`: Label -> concept vector table
//! - `embeddings`: Wraps fastembed for embedding generation
//! - `service`: Process-wide lazily loaded embedding model
//! - `arithmetic`: Formula folding and prompt augmentation
//! - `index`: In-memory embedding table with cosine similarity search
//! - `ranker`: Local and remote ranking strategies
//! - `hydrate`: Joins ranked ids to review rows
//! - `lexical`: Keyword fallback

pub mod arithmetic;
pub mod concepts;
pub mod embeddings;
pub mod hydrate;
pub mod index;
pub mod lexical;
pub mod ranker;
mod service;

pub use arithmetic::{compose_formula, FormulaStep, Operation};
pub use concepts::{ConceptError, ConceptStore};
pub use embeddings::{Embedder, EmbeddingError};
pub use index::{EmbeddingRecord, EmbeddingTable, IndexError, ScoredMatch};
pub use ranker::{LocalRanker, RankError, Ranker, RankerKind, RemoteRanker, SimilarityBackend};
pub use service::{EmbeddingService, EmbeddingState};

/// Default embedding model name (384 dimensions)
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Default minimum similarity for free-text search
pub const DEFAULT_THRESHOLD: f32 = 0.1;

/// Default minimum similarity for formula search
pub const DEFAULT_ALCHEMIST_THRESHOLD: f32 = 0.1;
