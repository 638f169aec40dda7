pub mod embedding;
pub mod extractor;
pub mod model;

// Re-export commonly used types
pub use embedding::{similarity, Embedding};
pub use extractor::{decode_image, Embedder, FeatureExtractor, InputLayout};
