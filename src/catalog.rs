use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// A stored shoe document. Everything except the image URL is echoed back
/// to the caller verbatim, so it is kept as untyped JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ShoeRecord {
    pub id: String,
    pub name: Value,
    pub image_url: Option<String>,
    pub price: Value,
    pub description: Value,
}

impl ShoeRecord {
    pub fn from_fields(id: impl Into<String>, fields: &Map<String, Value>) -> Self {
        let field = |key: &str| fields.get(key).cloned().unwrap_or(Value::Null);
        Self {
            id: id.into(),
            name: field("name"),
            image_url: fields
                .get("image_url")
                .and_then(Value::as_str)
                .map(str::to_string),
            price: field("price"),
            description: field("description"),
        }
    }
}

/// The projection of a record returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub name: Value,
    pub image_url: Option<String>,
    pub price: Value,
    pub description: Value,
}

impl From<ShoeRecord> for Recommendation {
    fn from(r: ShoeRecord) -> Self {
        Self {
            name: r.name,
            image_url: r.image_url,
            price: r.price,
            description: r.description,
        }
    }
}

pub type ShoeStream<'a> = Box<dyn Iterator<Item = Result<ShoeRecord, CatalogError>> + 'a>;

/// Source of candidate records.
///
/// Opening the stream and pulling from it may both fail; either failure
/// aborts the request.
pub trait Catalog: Send + Sync {
    fn shoes(&self) -> Result<ShoeStream<'_>, CatalogError>;
}

/// In-memory catalog, used for offline runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    pub records: Vec<ShoeRecord>,
}

impl StaticCatalog {
    pub fn new(records: Vec<ShoeRecord>) -> Self {
        Self { records }
    }

    /// Load a JSON array of shoe objects. An object without a string `id`
    /// is identified by its position.
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let docs: Vec<Map<String, Value>> = serde_json::from_str(raw)?;
        let records = docs
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let id = doc
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| i.to_string());
                ShoeRecord::from_fields(id, doc)
            })
            .collect();
        Ok(Self { records })
    }
}

impl Catalog for StaticCatalog {
    fn shoes(&self) -> Result<ShoeStream<'_>, CatalogError> {
        Ok(Box::new(
            self.records.iter().cloned().map(Ok::<_, CatalogError>),
        ))
    }
}
