pub mod embedding_client;
pub mod llm_client;

pub use embedding_client::{Embedder, Embedding, EmbeddingClient};
pub use llm_client::{LanguageModel, LlmClient};
