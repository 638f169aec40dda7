use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use shoecommend_vision::InputLayout;
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(
        option_env!("SHOECOMMEND_CONFIG_PATH").unwrap_or("/usr/local/etc/shoecommend/config.toml"),
    )
});

pub static MODEL_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(
        option_env!("SHOECOMMEND_MODEL_PATH")
            .unwrap_or("/usr/local/share/shoecommend/resnet50_notop.onnx"),
    )
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub model_path: PathBuf,
    pub input_layout: InputLayout,
    /// Environment variable holding the service-account JSON.
    pub credentials_env: String,
    pub collection: String,
    /// Firestore REST root, e.g. an emulator's `http://localhost:8080/v1`.
    pub firestore_url: Option<String>,
    pub fetch_timeout_secs: u64,
    pub max_results: usize,
    pub max_upload_bytes: usize,
    /// Serve candidates from a local JSON file instead of Firestore.
    pub catalog_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            model_path: MODEL_PATH.to_path_buf(),
            input_layout: InputLayout::default(),
            credentials_env: "FIREBASE_CREDENTIALS".to_string(),
            collection: "shoes".to_string(),
            firestore_url: None,
            fetch_timeout_secs: 10,
            max_results: 5,
            max_upload_bytes: 20 * 1024 * 1024,
            catalog_file: None,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let cfg = load_config(Some(Path::new("/nonexistent/shoecommend.toml"))).unwrap();
        assert_eq!(cfg.collection, "shoes");
        assert_eq!(cfg.max_results, 5);
        assert_eq!(cfg.fetch_timeout_secs, 10);
        assert_eq!(cfg.credentials_env, "FIREBASE_CREDENTIALS");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            bind = "127.0.0.1:9000"
            input_layout = "nchw"
            catalog_file = "shoes.json"
            firestore_url = "http://localhost:8080/v1"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:9000");
        assert_eq!(cfg.input_layout, InputLayout::Nchw);
        assert_eq!(cfg.catalog_file, Some(PathBuf::from("shoes.json")));
        assert_eq!(cfg.firestore_url.as_deref(), Some("http://localhost:8080/v1"));
        assert_eq!(cfg.max_results, 5);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("shoecommend-{}.toml", std::process::id()));
        std::fs::write(&path, "max_results = 3\ncollection = \"sneakers\"\n").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(cfg.max_results, 3);
        assert_eq!(cfg.collection, "sneakers");
    }
}
