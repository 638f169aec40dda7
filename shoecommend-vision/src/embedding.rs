use anyhow::Result;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array1, Array4};

use crate::extractor::InputLayout;
use crate::model::INPUT_SIZE;

/// ImageNet channel means in BGR order, as subtracted by the Keras
/// "caffe" preprocessing the ResNet50 weights were trained with.
pub const BGR_MEANS: [f32; 3] = [103.939, 116.779, 123.68];

/// Flattened network output for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Array1<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            vector: Array1::from(values),
        }
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn norm(&self) -> f32 {
        self.vector.dot(&self.vector).sqrt()
    }
}

/// Dot product of two embeddings.
///
/// Unlike a cosine match the vectors are not normalized, so the score is
/// unbounded. Embeddings of different lengths cannot be compared.
pub fn similarity(a: &Embedding, b: &Embedding) -> Result<f32> {
    if a.len() != b.len() {
        anyhow::bail!(
            "embedding length mismatch: {} vs {}",
            a.len(),
            b.len()
        );
    }
    Ok(a.vector.dot(&b.vector))
}

/// Resize to the network input and apply channel preprocessing.
///
/// Output values are BGR with the ImageNet means removed, laid out as
/// `[1, H, W, 3]` or `[1, 3, H, W]` depending on `layout`.
pub fn preprocess(img: &DynamicImage, layout: InputLayout) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    let rgb = img
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom)
        .to_rgb8();

    let mut input = match layout {
        InputLayout::Nhwc => Array4::<f32>::zeros((1, size, size, 3)),
        InputLayout::Nchw => Array4::<f32>::zeros((1, 3, size, size)),
    };

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        // RGB -> BGR
        let bgr = [pixel[2], pixel[1], pixel[0]];
        for (c, value) in bgr.iter().enumerate() {
            let v = *value as f32 - BGR_MEANS[c];
            match layout {
                InputLayout::Nhwc => input[[0, y, x, c]] = v,
                InputLayout::Nchw => input[[0, c, y, x]] = v,
            }
        }
    }

    input
}
