//! Page image retrieval and inline `data:` references.

use crate::config::CatalogConfig;
use crate::error::ColorizeError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

static DATA_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:([\w/+.-]+);base64,(.+)$").unwrap()
});

/// Mime type assumed when a response carries none.
const FALLBACK_MIME: &str = "image/png";

/// Path the relay serves images on.
pub const RELAY_PATH: &str = "/api/image-proxy";

/// An inline image: `data:<mime>;base64,<payload>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    mime_type: String,
    data: String,
}

impl DataUri {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: STANDARD.encode(bytes),
        }
    }

    /// Wraps an already base64-encoded payload.
    pub fn from_base64(mime_type: &str, data: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        }
    }

    /// Parses `data:<mime>;base64,<payload>`.
    pub fn parse(s: &str) -> Option<Self> {
        let caps = DATA_URI_RE.captures(s.trim())?;
        Some(Self {
            mime_type: caps[1].to_string(),
            data: caps[2].to_string(),
        })
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The base64 payload.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.data)
    }
}

/// A key header sent with requests for URLs under one base URL.
///
/// Page images served by the external catalog need the catalog's API key;
/// images anywhere else never see it.
#[derive(Debug, Clone)]
pub struct UpstreamAuth {
    base_url: Url,
    header: String,
    key: String,
}

impl UpstreamAuth {
    pub fn new(base_url: Url, header: &str, key: &str) -> Self {
        Self {
            base_url,
            header: header.to_string(),
            key: key.to_string(),
        }
    }

    /// The catalog's key, when an external catalog with a key is configured.
    pub fn from_catalog(config: &CatalogConfig) -> Option<Self> {
        if !config.is_configured() || config.api_key.is_empty() {
            return None;
        }
        let base_url = Url::parse(config.base_url.trim()).ok()?;
        Some(Self::new(base_url, &config.api_key_header, &config.api_key))
    }

    /// True when `target` is on the base URL's origin and under its path.
    pub fn covers(&self, target: &Url) -> bool {
        if target.origin() != self.base_url.origin() {
            return false;
        }
        let base = self.base_url.path().trim_end_matches('/');
        let path = target.path();
        path == base || path.starts_with(&format!("{}/", base))
    }

    /// Adds the key header when `target` is covered.
    pub fn apply(&self, request: reqwest::RequestBuilder, target: &Url) -> reqwest::RequestBuilder {
        if self.covers(target) {
            request.header(self.header.as_str(), self.key.as_str())
        } else {
            request
        }
    }
}

/// Something that turns a page image reference into inline bytes.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, image_url: &str) -> Result<DataUri, ColorizeError>;
}

/// Fetches page images, through the relay when one is configured.
pub struct ImageFetcher {
    client: reqwest::Client,
    relay_base: Option<Url>,
    auth: Option<UpstreamAuth>,
}

impl ImageFetcher {
    /// `relay_base_url` may be empty to fetch directly.
    pub fn new(relay_base_url: &str) -> Result<Self, reqwest::Error> {
        let relay_base = match relay_base_url.trim() {
            "" => None,
            raw => match Url::parse(raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(relay = raw, error = %e, "ignoring invalid relay URL");
                    None
                }
            },
        };

        let client = reqwest::Client::builder()
            .user_agent(concat!("eaders/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            relay_base,
            auth: None,
        })
    }

    /// Sends `auth`'s key with direct fetches it covers.
    pub fn with_auth(mut self, auth: Option<UpstreamAuth>) -> Self {
        self.auth = auth;
        self
    }

    /// `{relay}/api/image-proxy?url=<encoded image_url>`.
    pub fn relay_url(&self, image_url: &str) -> Option<Url> {
        let mut url = self.relay_base.as_ref()?.join(RELAY_PATH).ok()?;
        url.query_pairs_mut().append_pair("url", image_url);
        Some(url)
    }

    async fn fetch_from(&self, url: Url) -> Result<DataUri, String> {
        let mut request = self.client.get(url.clone());
        if let Some(auth) = &self.auth {
            request = auth.apply(request, &url);
        }
        let response = request.send().await.map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {} from {}", response.status(), url));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(image_mime)
            .unwrap_or_else(|| FALLBACK_MIME.to_string());

        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(DataUri::from_bytes(&mime_type, &bytes))
    }
}

/// Reduces a Content-Type header to a bare image mime type.
fn image_mime(header: &str) -> String {
    let essence = header.split(';').next().unwrap_or("").trim().to_lowercase();
    if essence.starts_with("image/") {
        essence
    } else {
        FALLBACK_MIME.to_string()
    }
}

#[async_trait]
impl ImageSource for ImageFetcher {
    async fn fetch(&self, image_url: &str) -> Result<DataUri, ColorizeError> {
        let direct = Url::parse(image_url)
            .map_err(|e| ColorizeError::Fetch(format!("{}: {}", image_url, e)))?;

        if let Some(relayed) = self.relay_url(image_url) {
            match self.fetch_from(relayed).await {
                Ok(image) => return Ok(image),
                Err(e) => {
                    tracing::warn!(error = %e, "image relay failed, fetching directly");
                }
            }
        }

        self.fetch_from(direct).await.map_err(ColorizeError::Fetch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_uri_from_bytes() {
        let uri = DataUri::from_bytes("image/png", b"hello");
        assert_eq!(uri.to_string(), "data:image/png;base64,aGVsbG8=");
        assert_eq!(uri.decode().unwrap(), b"hello");
    }

    #[test]
    fn test_data_uri_parse() {
        let uri = DataUri::parse("data:image/jpeg;base64,AAEC").unwrap();
        assert_eq!(uri.mime_type(), "image/jpeg");
        assert_eq!(uri.data(), "AAEC");

        assert!(DataUri::parse("https://example.com/a.png").is_none());
        assert!(DataUri::parse("data:image/png,raw").is_none());
    }

    #[test]
    fn test_image_mime() {
        assert_eq!(image_mime("image/webp"), "image/webp");
        assert_eq!(image_mime("Image/JPEG; charset=binary"), "image/jpeg");
        assert_eq!(image_mime("application/octet-stream"), "image/png");
    }

    #[test]
    fn test_relay_url_encodes_target() {
        let fetcher = ImageFetcher::new("http://127.0.0.1:9002").unwrap();
        let url = fetcher
            .relay_url("https://cdn.example.com/p 1.png?x=1&y=2")
            .unwrap();
        assert_eq!(url.path(), "/api/image-proxy");
        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!(key, "url");
        assert_eq!(value, "https://cdn.example.com/p 1.png?x=1&y=2");
    }

    #[test]
    fn test_upstream_auth_covers_catalog_paths_only() {
        let auth = UpstreamAuth::new(
            Url::parse("https://komga.local/api/v1/").unwrap(),
            "X-API-Key",
            "k",
        );
        let covered = |raw: &str| auth.covers(&Url::parse(raw).unwrap());

        assert!(covered("https://komga.local/api/v1/books/B1/pages/2"));
        assert!(covered("https://komga.local/api/v1"));
        assert!(!covered("https://komga.local/api/v10/books/B1/pages/2"));
        assert!(!covered("http://komga.local/api/v1/books/B1/pages/2"));
        assert!(!covered("https://komga.local:8443/api/v1/books/B1/pages/2"));
        assert!(!covered("https://placehold.co/800x1200.png"));
    }

    #[test]
    fn test_upstream_auth_from_catalog() {
        let mut config = CatalogConfig::default();
        assert!(UpstreamAuth::from_catalog(&config).is_none());

        config.base_url = "https://komga.local/api/v1".to_string();
        assert!(UpstreamAuth::from_catalog(&config).is_none());

        config.api_key = "secret".to_string();
        let auth = UpstreamAuth::from_catalog(&config).unwrap();
        assert_eq!(auth.header, "X-API-Key");
        assert_eq!(auth.key, "secret");
    }

    #[test]
    fn test_no_relay_when_unset() {
        let fetcher = ImageFetcher::new("").unwrap();
        assert!(fetcher.relay_url("https://cdn.example.com/a.png").is_none());
    }
}
