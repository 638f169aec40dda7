use anyhow::{Context, Result};
use image::DynamicImage;
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::embedding::{self, Embedding};

/// Tensor layout the exported network expects.
///
/// Keras exports (tf2onnx) keep channels last; torchvision exports are
/// channels first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    #[default]
    Nhwc,
    Nchw,
}

/// Anything that can turn a decoded image into an embedding.
pub trait Embedder {
    fn embed(&mut self, img: &DynamicImage) -> Result<Embedding>;
}

/// Pretrained CNN with the classification head removed.
pub struct FeatureExtractor {
    pub session: Session,
    pub layout: InputLayout,
}

impl FeatureExtractor {
    pub fn load(model_path: &Path, layout: InputLayout) -> Result<Self> {
        let session = crate::model::extractor_session(model_path)?;
        log::debug!(
            "extractor loaded from {} ({:?} input)",
            model_path.display(),
            layout
        );
        Ok(Self { session, layout })
    }

    /// Resize, preprocess, run a forward pass and flatten the output.
    pub fn extract(&mut self, img: &DynamicImage) -> Result<Embedding> {
        let input = embedding::preprocess(img, self.layout);
        let input_tensor = Value::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .context("extractor forward pass")?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        if data.is_empty() {
            anyhow::bail!("extractor produced an empty output (shape {:?})", shape);
        }

        Ok(Embedding::new(data.to_vec()))
    }
}

impl Embedder for FeatureExtractor {
    fn embed(&mut self, img: &DynamicImage) -> Result<Embedding> {
        self.extract(img)
    }
}

/// Decode an image, sniffing the format from its content.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).context("decode image")
}
