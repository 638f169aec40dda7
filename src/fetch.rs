use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::time::Duration;

/// Retrieves the raw bytes behind a candidate's image URL.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP GET with a fixed per-request timeout and no retry.
pub struct HttpImageSource {
    client: Client,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("build image http client")?;
        Ok(Self { client })
    }
}

impl ImageSource for HttpImageSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("GET {} returned HTTP {}", url, status.as_u16());
        }
        let bytes = resp.bytes().with_context(|| format!("reading body of {url}"))?;
        Ok(bytes.to_vec())
    }
}
