pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod firestore;
pub mod recommend;
pub mod server;

// Re-export vision types for convenience
pub use shoecommend_vision::{Embedder, Embedding, FeatureExtractor, InputLayout};
