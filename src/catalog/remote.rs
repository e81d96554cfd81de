//! Client for an external Komga-compatible catalog.
//!
//! Every request carries the configured API key header. Successful,
//! well-formed responses are cached in memory for the configured TTL.
//! A 404 for an entity means the catalog does not have it; any other
//! failure means the catalog could not answer.

use super::{Author, Book, CatalogSource, Page, Series, SeriesFilter, SeriesMetadata};
use crate::config::CatalogConfig;
use crate::error::CatalogError;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use url::Url;

/// Paged listing envelope.
#[derive(Debug, Deserialize)]
struct KomgaPage<T> {
    content: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KomgaSeries {
    id: String,
    name: String,
    #[serde(default)]
    books_count: u32,
    #[serde(default)]
    metadata: KomgaSeriesMetadata,
    #[serde(default)]
    books_metadata: KomgaBooksMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KomgaSeriesMetadata {
    #[serde(default)]
    status: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    publisher: String,
    #[serde(default)]
    genres: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KomgaBooksMetadata {
    #[serde(default)]
    authors: Vec<Author>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KomgaBook {
    id: String,
    series_id: String,
    name: String,
    number: f64,
    #[serde(default)]
    media: KomgaMedia,
    #[serde(default)]
    metadata: KomgaBookMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KomgaMedia {
    #[serde(default)]
    pages_count: u32,
}

#[derive(Debug, Default, Deserialize)]
struct KomgaBookMetadata {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KomgaPageInfo {
    number: u32,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// Successful response bodies keyed by URL.
struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl ResponseCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((stored, body)) if stored.elapsed() < self.ttl => Some(body.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores a body, dropping every entry that has already expired.
    fn put(&self, key: String, body: String) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), body));
    }
}

/// Komga-compatible catalog client.
pub struct RemoteCatalog {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    api_key_header: String,
    featured_limit: usize,
    cache: ResponseCache,
}

impl RemoteCatalog {
    /// Creates a client for the configured endpoint.
    ///
    /// Fails with `NotConfigured` when no base URL is set.
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        if !config.is_configured() {
            return Err(CatalogError::NotConfigured);
        }
        let base_url = Url::parse(config.base_url.trim())
            .map_err(|e| CatalogError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("eaders/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            api_key_header: config.api_key_header.clone(),
            featured_limit: config.featured_limit,
            cache: ResponseCache::new(Duration::from_secs(config.cache_ttl_secs)),
        })
    }

    /// Builds `{base}/{segments...}[?unpaged=true]`.
    fn endpoint(&self, segments: &[&str], unpaged: bool) -> Result<Url, CatalogError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        if unpaged {
            url.query_pairs_mut().append_pair("unpaged", "true");
        }
        Ok(url)
    }

    /// Cover image reference of a series.
    pub fn thumbnail_url(&self, series_id: &str) -> String {
        self.endpoint(&["series", series_id, "thumbnail"], false)
            .map(|u| u.to_string())
            .unwrap_or_default()
    }

    /// Image reference of one page.
    pub fn page_url(&self, book_id: &str, number: u32) -> String {
        let number = number.to_string();
        self.endpoint(&["books", book_id, "pages", &number], false)
            .map(|u| u.to_string())
            .unwrap_or_default()
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        let key = url.to_string();
        if let Some(body) = self.cache.get(&key) {
            if let Ok(value) = serde_json::from_str(&body) {
                return Ok(value);
            }
        }

        let mut request = self.client.get(url.clone());
        if !self.api_key.is_empty() {
            request = request.header(self.api_key_header.as_str(), self.api_key.as_str());
        }
        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(url.path().to_string()));
        }
        if !response.status().is_success() {
            return Err(CatalogError::ApiError {
                status: response.status().as_u16(),
                path: url.path().to_string(),
            });
        }

        let body = response.text().await?;
        let value = serde_json::from_str(&body)
            .map_err(|e| CatalogError::ParseError(format!("{}: {}", url.path(), e)))?;
        self.cache.put(key, body);
        Ok(value)
    }

    fn convert_series(&self, raw: KomgaSeries) -> Series {
        let summary = if raw.metadata.summary.trim().is_empty() {
            raw.books_metadata.summary
        } else {
            raw.metadata.summary
        };
        let cover_image_url = self.thumbnail_url(&raw.id);
        Series {
            metadata: SeriesMetadata {
                title: raw.metadata.title,
                summary,
                status: raw.metadata.status.parse().unwrap_or_default(),
                authors: raw.books_metadata.authors,
                genres: raw.metadata.genres,
                publisher: Some(raw.metadata.publisher).filter(|p| !p.trim().is_empty()),
                release_date: raw.books_metadata.release_date,
            },
            id: raw.id,
            name: raw.name,
            books_count: raw.books_count,
            cover_image_url,
            featured: false,
            premium: false,
            average_rating: 0.0,
            rating_count: 0,
        }
    }
}

/// Orders books by their catalog number, fractional numbers included,
/// before converting.
fn sorted_books(mut raw: Vec<KomgaBook>) -> Vec<Book> {
    raw.sort_by(|a, b| a.number.total_cmp(&b.number));
    raw.into_iter().map(convert_book).collect()
}

/// Maps "no such entity" to `None`.
fn found<T>(result: Result<T, CatalogError>) -> Result<Option<T>, CatalogError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(CatalogError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn convert_book(raw: KomgaBook) -> Book {
    let name = if raw.metadata.title.trim().is_empty() {
        raw.name
    } else {
        raw.metadata.title
    };
    Book {
        id: raw.id,
        series_id: raw.series_id,
        name,
        number: raw.number.max(0.0).round() as u32,
        pages_count: raw.media.pages_count,
    }
}

#[async_trait]
impl CatalogSource for RemoteCatalog {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn list_series(&self, filter: &SeriesFilter) -> Result<Vec<Series>, CatalogError> {
        let url = self.endpoint(&["series"], true)?;
        let page: KomgaPage<KomgaSeries> = self.fetch_json(url).await?;
        let mut series: Vec<Series> = page
            .content
            .into_iter()
            .map(|raw| self.convert_series(raw))
            .collect();

        // The catalog has no notion of featured; the first few stand in.
        if filter.featured {
            series.truncate(self.featured_limit);
            for s in &mut series {
                s.featured = true;
            }
        }
        Ok(series)
    }

    async fn get_series(&self, id: &str) -> Result<Option<Series>, CatalogError> {
        let url = self.endpoint(&["series", id], false)?;
        let raw: Option<KomgaSeries> = found(self.fetch_json(url).await)?;
        Ok(raw.map(|raw| self.convert_series(raw)))
    }

    async fn list_books(&self, series_id: &str) -> Result<Vec<Book>, CatalogError> {
        let url = self.endpoint(&["series", series_id, "books"], true)?;
        let page: Option<KomgaPage<KomgaBook>> = found(self.fetch_json(url).await)?;
        Ok(page.map(|p| sorted_books(p.content)).unwrap_or_default())
    }

    async fn get_book(&self, id: &str) -> Result<Option<Book>, CatalogError> {
        let url = self.endpoint(&["books", id], false)?;
        let raw: Option<KomgaBook> = found(self.fetch_json(url).await)?;
        Ok(raw.map(convert_book))
    }

    async fn list_pages(&self, book_id: &str) -> Result<Vec<Page>, CatalogError> {
        let url = self.endpoint(&["books", book_id, "pages"], false)?;
        let raw: Vec<KomgaPageInfo> = found(self.fetch_json(url).await)?.unwrap_or_default();
        Ok(raw
            .into_iter()
            .map(|p| Page {
                url: self.page_url(book_id, p.number),
                number: p.number,
                media_type: p.media_type,
                width: p.width,
                height: p.height,
            })
            .collect())
    }
}
