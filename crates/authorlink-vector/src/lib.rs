//! Authorlink Vector - Embedding similarity
//!
//! Provides the similarity service used to rank an entity's representative
//! works against the mention's paper.

pub mod embedding;
pub mod similarity;

pub use embedding::{create_embedding_client, EmbeddingClient, OllamaEmbedding, OpenAiEmbedding};
pub use similarity::{cosine_similarity, EmbeddingSimilarity};
