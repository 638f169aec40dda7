use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};
use shoecommend_vision::{similarity, FeatureExtractor, InputLayout};
use std::path::PathBuf;

fn model_path() -> PathBuf {
    std::env::var("SHOECOMMEND_MODEL")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("models/resnet50_notop.onnx"))
}

fn load() -> Result<Option<FeatureExtractor>> {
    env_logger::try_init().ok();
    let path = model_path();
    if !path.exists() {
        eprintln!("Skipping: {} not found", path.display());
        return Ok(None);
    }
    Ok(Some(FeatureExtractor::load(&path, InputLayout::Nhwc)?))
}

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

#[test]
fn test_extraction_is_deterministic() -> Result<()> {
    let Some(mut extractor) = load()? else {
        return Ok(());
    };

    let img = gradient(300, 200);
    let a = extractor.extract(&img)?;
    let b = extractor.extract(&img)?;

    assert_eq!(a, b);
    println!("embedding length: {}, norm: {:.4}", a.len(), a.norm());
    Ok(())
}

#[test]
fn test_embedding_length_is_fixed() -> Result<()> {
    let Some(mut extractor) = load()? else {
        return Ok(());
    };

    let small = extractor.extract(&gradient(32, 32))?;
    let large = extractor.extract(&gradient(1024, 640))?;

    assert_eq!(small.len(), large.len());
    assert!(similarity(&small, &large)?.is_finite());
    Ok(())
}
