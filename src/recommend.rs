use anyhow::{Context, Result};
use log::{info, warn};
use shoecommend_vision::{decode_image, similarity, Embedder, Embedding, FeatureExtractor};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::catalog::{Catalog, Recommendation, ShoeRecord, StaticCatalog};
use crate::config::Config;
use crate::error::RecommendError;
use crate::fetch::{HttpImageSource, ImageSource};
use crate::firestore::{FirestoreCatalog, ServiceAccount};

pub const DEFAULT_MAX_RESULTS: usize = 5;

/// A candidate paired with its similarity to the query.
#[derive(Debug, Clone)]
pub struct Scored {
    pub record: ShoeRecord,
    pub score: f32,
}

/// Score every candidate against `query` and keep the best `k`.
///
/// `embed_candidate` fetches and embeds one record. Any failure there, a
/// length mismatch, or a non-finite score drops that candidate with a
/// warning and the walk continues. An error from the stream itself is
/// returned immediately.
pub fn rank<I, E, F>(
    query: &Embedding,
    candidates: I,
    mut embed_candidate: F,
    k: usize,
) -> Result<Vec<Scored>, E>
where
    I: IntoIterator<Item = Result<ShoeRecord, E>>,
    F: FnMut(&ShoeRecord) -> Result<Embedding>,
{
    let mut scored = Vec::new();
    let mut seen = 0usize;

    for record in candidates {
        let record = record?;
        seen += 1;

        let score = embed_candidate(&record).and_then(|emb| similarity(query, &emb));
        match score {
            Ok(score) if score.is_finite() => scored.push(Scored { record, score }),
            Ok(score) => warn!("Skipping shoe {}: non-finite score {}", record.id, score),
            Err(e) => warn!("Skipping shoe {}: {:#}", record.id, e),
        }
    }

    info!("scored {} of {} candidates", scored.len(), seen);

    // stable, so equal scores keep catalog order
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    Ok(scored)
}

/// Owns the model, the candidate source and the image fetcher.
pub struct Recommender {
    embedder: Mutex<Box<dyn Embedder + Send>>,
    catalog: Box<dyn Catalog>,
    images: Box<dyn ImageSource>,
    max_results: usize,
}

impl Recommender {
    pub fn new(
        embedder: Box<dyn Embedder + Send>,
        catalog: Box<dyn Catalog>,
        images: Box<dyn ImageSource>,
    ) -> Self {
        Self {
            embedder: Mutex::new(embedder),
            catalog,
            images,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Wire up the production collaborators described by `cfg`.
    ///
    /// Must not be called from inside an async runtime: the HTTP clients
    /// are blocking.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let extractor = FeatureExtractor::load(&cfg.model_path, cfg.input_layout)
            .context("Failed to initialize feature extractor")?;

        let catalog: Box<dyn Catalog> = match &cfg.catalog_file {
            Some(path) => {
                info!("Using catalog file: {}", path.display());
                Box::new(
                    StaticCatalog::from_json_file(path)
                        .with_context(|| format!("loading catalog {}", path.display()))?,
                )
            }
            None => {
                let account = ServiceAccount::from_env(&cfg.credentials_env)
                    .context("Firebase credentials not found in environment variables")?;
                info!(
                    "Using Firestore project {} collection {}",
                    account.project_id, cfg.collection
                );
                let mut firestore = FirestoreCatalog::new(
                    account,
                    cfg.collection.clone(),
                    Duration::from_secs(cfg.fetch_timeout_secs),
                )?;
                if let Some(url) = &cfg.firestore_url {
                    info!("Using Firestore endpoint {}", url);
                    firestore = firestore.with_base_url(url.clone());
                }
                Box::new(firestore)
            }
        };

        let images = HttpImageSource::new(Duration::from_secs(cfg.fetch_timeout_secs))?;

        Ok(Self::new(Box::new(extractor), catalog, Box::new(images))
            .with_max_results(cfg.max_results))
    }

    /// Full pipeline for one uploaded image.
    ///
    /// The extractor lock is held throughout, so requests pass through the
    /// model one at a time and candidates are processed strictly in order.
    pub fn recommend(&self, image: &[u8]) -> Result<Vec<Recommendation>, RecommendError> {
        // the extractor keeps no per-call state, so a poisoned lock is reusable
        let mut embedder = self.embedder.lock().unwrap_or_else(PoisonError::into_inner);

        let query = embed_bytes(&mut **embedder, image)
            .map_err(|e| RecommendError::ImageProcessing(format!("{e:#}")))?;

        let images = self.images.as_ref();
        let ranked = rank(
            &query,
            self.catalog.shoes()?,
            |shoe| {
                let url = shoe
                    .image_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("no image_url"))?;
                let bytes = images.fetch(url)?;
                embed_bytes(&mut **embedder, &bytes)
            },
            self.max_results,
        )?;

        Ok(ranked
            .into_iter()
            .map(|s| Recommendation::from(s.record))
            .collect())
    }
}

/// Decode and embed, turning a panic in the decoder or the model into an
/// ordinary error.
fn embed_bytes(embedder: &mut dyn Embedder, bytes: &[u8]) -> Result<Embedding> {
    catch_unwind(AssertUnwindSafe(|| {
        let img = decode_image(bytes)?;
        embedder.embed(&img)
    }))
    .map_err(|payload| anyhow::anyhow!("embedding panicked: {}", panic_message(&*payload)))?
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn shoe(id: &str) -> ShoeRecord {
        ShoeRecord {
            id: id.to_string(),
            name: Value::String(id.to_string()),
            image_url: Some(format!("mem://{id}")),
            price: Value::Null,
            description: Value::Null,
        }
    }

    fn ids(scored: &[Scored]) -> Vec<&str> {
        scored.iter().map(|s| s.record.id.as_str()).collect()
    }

    #[test]
    fn test_rank_orders_by_descending_score() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let shoes = ["a", "b", "c"].map(|id| Ok::<_, ()>(shoe(id)));
        let ranked = rank(
            &query,
            shoes,
            |s| {
                Ok(match s.id.as_str() {
                    "a" => Embedding::new(vec![0.2, 9.0]),
                    "b" => Embedding::new(vec![3.0, 0.0]),
                    _ => Embedding::new(vec![-1.0, 0.0]),
                })
            },
            5,
        )
        .unwrap();

        assert_eq!(ids(&ranked), ["b", "a", "c"]);
        assert_eq!(ranked[0].score, 3.0);
    }

    #[test]
    fn test_rank_truncates_to_k() {
        let query = Embedding::new(vec![1.0]);
        let shoes: Vec<Result<ShoeRecord, ()>> =
            (0..8).map(|i| Ok(shoe(&i.to_string()))).collect();
        let ranked = rank(
            &query,
            shoes,
            |s| Ok(Embedding::new(vec![s.id.parse::<f32>().unwrap()])),
            5,
        )
        .unwrap();

        assert_eq!(ids(&ranked), ["7", "6", "5", "4", "3"]);
    }

    #[test]
    fn test_rank_excludes_failures() {
        let query = Embedding::new(vec![1.0, 1.0]);
        let shoes = ["ok", "timeout", "short", "nan"].map(|id| Ok::<_, ()>(shoe(id)));
        let ranked = rank(
            &query,
            shoes,
            |s| match s.id.as_str() {
                "ok" => Ok(Embedding::new(vec![0.0, 0.0])),
                "timeout" => anyhow::bail!("operation timed out"),
                "short" => Ok(Embedding::new(vec![1.0])),
                _ => Ok(Embedding::new(vec![f32::NAN, 0.0])),
            },
            5,
        )
        .unwrap();

        // a zero score is kept; failures are not scored as zero
        assert_eq!(ids(&ranked), ["ok"]);
        assert_eq!(ranked[0].score, 0.0);
    }

    #[test]
    fn test_rank_ties_keep_catalog_order() {
        let query = Embedding::new(vec![1.0]);
        let shoes = ["first", "second", "third"].map(|id| Ok::<_, ()>(shoe(id)));
        let ranked = rank(&query, shoes, |_| Ok(Embedding::new(vec![2.0])), 5).unwrap();
        assert_eq!(ids(&ranked), ["first", "second", "third"]);
    }

    #[test]
    fn test_rank_empty() {
        let query = Embedding::new(vec![1.0]);
        let shoes: Vec<Result<ShoeRecord, ()>> = vec![];
        let ranked = rank(&query, shoes, |_| unreachable!(), 5).unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_rank_stream_error_is_fatal() {
        let query = Embedding::new(vec![1.0]);
        let shoes = vec![Ok(shoe("a")), Err("page failed"), Ok(shoe("b"))];
        let mut calls = 0;
        let result = rank(
            &query,
            shoes,
            |_| {
                calls += 1;
                Ok(Embedding::new(vec![1.0]))
            },
            5,
        );
        assert_eq!(result.unwrap_err(), "page failed");
        assert_eq!(calls, 1);
    }
}
