mod stub;

use eaders::catalog::{Catalog, SeriesFilter, SeriesStatus};
use eaders::config::CatalogConfig;
use stub::{StubResponse, StubServer};

const SERIES_PAGE: &str = r#"{"content":[
  {"id":"0A","name":"alpha","booksCount":2,
   "metadata":{"status":"ENDED","title":"Alpha","summary":"First.","genres":["Drama"],"publisher":"Pub"},
   "booksMetadata":{"authors":[{"name":"Ann","role":"writer"}],"summary":""}},
  {"id":"0B","name":"beta","booksCount":1,
   "metadata":{"status":"ONGOING","title":"Beta","summary":"","genres":["Comedy"]},
   "booksMetadata":{"authors":[],"summary":"From books."}},
  {"id":"0C","name":"gamma","booksCount":0,"metadata":{"title":"Gamma"}}
]}"#;

const BOOKS_PAGE: &str = r#"{"content":[
  {"id":"B2","seriesId":"0A","name":"two.cbz","number":2,"media":{"pagesCount":20},"metadata":{"title":"Second"}},
  {"id":"B1","seriesId":"0A","name":"one.cbz","number":1,"media":{"pagesCount":18},"metadata":{"title":""}}
]}"#;

const PAGES: &str = r#"[
  {"number":1,"fileName":"001.jpg","mediaType":"image/jpeg","width":800,"height":1200},
  {"number":2,"fileName":"002.jpg","mediaType":"image/jpeg"}
]"#;

fn komga_stub() -> StubServer {
    StubServer::spawn(|req| match req.path() {
        "/api/v1/series" => StubResponse::json(SERIES_PAGE),
        "/api/v1/series/0A/books" => StubResponse::json(BOOKS_PAGE),
        "/api/v1/books/B1/pages" => StubResponse::json(PAGES),
        _ => StubResponse::status(404, "not found"),
    })
}

fn config_for(stub: &StubServer) -> CatalogConfig {
    CatalogConfig {
        base_url: format!("{}/api/v1", stub.base_url),
        api_key: "secret-key".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_lists_remote_series() {
    let stub = komga_stub();
    let catalog = Catalog::from_config(&config_for(&stub)).unwrap();
    assert!(catalog.is_remote());

    let series = catalog.list_series(&SeriesFilter::default()).await;
    let titles: Vec<&str> = series.iter().map(|s| s.title()).collect();
    assert_eq!(titles, ["Alpha", "Beta", "Gamma"]);

    let alpha = &series[0];
    assert_eq!(alpha.metadata.status, SeriesStatus::Ended);
    assert_eq!(alpha.author_names(), "Ann");
    assert_eq!(
        alpha.cover_image_url,
        format!("{}/api/v1/series/0A/thumbnail", stub.base_url)
    );
    assert_eq!(series[1].metadata.summary, "From books.");
    assert!(series.iter().all(|s| !s.premium));
}

#[tokio::test]
async fn test_sends_api_key_and_unpaged() {
    let stub = komga_stub();
    let catalog = Catalog::from_config(&config_for(&stub)).unwrap();
    catalog.list_series(&SeriesFilter::default()).await;

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].header("X-API-Key"), Some("secret-key"));
    assert!(requests[0].url.ends_with("?unpaged=true"));
}

#[tokio::test]
async fn test_custom_key_header() {
    let stub = komga_stub();
    let config = CatalogConfig {
        api_key_header: "Authorization".to_string(),
        api_key: "Bearer t0k".to_string(),
        ..config_for(&stub)
    };
    let catalog = Catalog::from_config(&config).unwrap();
    catalog.list_series(&SeriesFilter::default()).await;

    let requests = stub.requests();
    assert_eq!(requests[0].header("Authorization"), Some("Bearer t0k"));
    assert_eq!(requests[0].header("X-API-Key"), None);
}

#[tokio::test]
async fn test_responses_cached() {
    let stub = komga_stub();
    let catalog = Catalog::from_config(&config_for(&stub)).unwrap();

    catalog.list_series(&SeriesFilter::default()).await;
    catalog.list_series(&SeriesFilter::default()).await;
    assert_eq!(stub.requests().len(), 1);
}

#[tokio::test]
async fn test_cache_disabled_with_zero_ttl() {
    let stub = komga_stub();
    let config = CatalogConfig {
        cache_ttl_secs: 0,
        ..config_for(&stub)
    };
    let catalog = Catalog::from_config(&config).unwrap();

    catalog.list_series(&SeriesFilter::default()).await;
    catalog.list_series(&SeriesFilter::default()).await;
    assert_eq!(stub.requests().len(), 2);
}

#[tokio::test]
async fn test_featured_takes_prefix() {
    let stub = komga_stub();
    let config = CatalogConfig {
        featured_limit: 2,
        ..config_for(&stub)
    };
    let catalog = Catalog::from_config(&config).unwrap();

    let featured = catalog.list_series(&SeriesFilter::featured()).await;
    assert_eq!(featured.len(), 2);
    assert!(featured.iter().all(|s| s.featured));
}

#[tokio::test]
async fn test_books_sorted_and_pages_referenced() {
    let stub = komga_stub();
    let catalog = Catalog::from_config(&config_for(&stub)).unwrap();

    let books = catalog.list_books("0A").await;
    let numbers: Vec<u32> = books.iter().map(|b| b.number).collect();
    assert_eq!(numbers, [1, 2]);
    assert_eq!(books[0].name, "one.cbz");
    assert_eq!(books[1].name, "Second");

    let pages = catalog.list_pages("B1").await;
    assert_eq!(pages.len(), 2);
    assert_eq!(
        pages[1].url,
        format!("{}/api/v1/books/B1/pages/2", stub.base_url)
    );
    assert_eq!(pages[0].width, Some(800));
}

#[tokio::test]
async fn test_unknown_ids_not_served_from_fixtures() {
    let stub = komga_stub();
    let catalog = Catalog::from_config(&config_for(&stub)).unwrap();

    assert!(catalog.get_series("series-1").await.is_none());
    assert!(catalog.get_book("series-1-book-1").await.is_none());
    assert!(catalog.list_books("series-1").await.is_empty());
    assert!(catalog.list_pages("series-1-book-1").await.is_empty());

    let paths: Vec<String> = stub
        .requests()
        .iter()
        .map(|r| r.path().to_string())
        .collect();
    assert_eq!(
        paths,
        [
            "/api/v1/series/series-1",
            "/api/v1/books/series-1-book-1",
            "/api/v1/series/series-1/books",
            "/api/v1/books/series-1-book-1/pages",
        ]
    );
}

#[tokio::test]
async fn test_fractional_chapters_sorted() {
    let stub = StubServer::spawn(|req| match req.path() {
        "/api/v1/series/0A/books" => StubResponse::json(
            r#"{"content":[
              {"id":"C11","seriesId":"0A","name":"c11","number":11},
              {"id":"C10.5","seriesId":"0A","name":"c10.5","number":10.5},
              {"id":"C10","seriesId":"0A","name":"c10","number":10}
            ]}"#,
        ),
        _ => StubResponse::status(404, "not found"),
    });
    let catalog = Catalog::from_config(&config_for(&stub)).unwrap();

    let ids: Vec<String> = catalog
        .list_books("0A")
        .await
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(ids, ["C10", "C10.5", "C11"]);
}

#[tokio::test]
async fn test_server_error_falls_back_to_fixtures() {
    let stub = StubServer::spawn(|_| StubResponse::status(500, "boom"));
    let catalog = Catalog::from_config(&config_for(&stub)).unwrap();

    let series = catalog.list_series(&SeriesFilter::default()).await;
    assert_eq!(series.len(), 5);
    assert_eq!(series[0].id, "series-1");
}

#[tokio::test]
async fn test_malformed_payload_falls_back_to_fixtures() {
    let stub = StubServer::spawn(|_| StubResponse::json(r#"{"content": "nope"}"#));
    let catalog = Catalog::from_config(&config_for(&stub)).unwrap();

    let series = catalog.list_series(&SeriesFilter::featured()).await;
    assert!(!series.is_empty());
    assert!(series.iter().all(|s| s.id.starts_with("series-")));

    // Bad bodies are not cached.
    catalog.list_series(&SeriesFilter::featured()).await;
    assert_eq!(stub.requests().len(), 2);
}

#[tokio::test]
async fn test_unreachable_endpoint_falls_back() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = CatalogConfig {
        base_url: format!("http://{}/api/v1", addr),
        ..Default::default()
    };
    let catalog = Catalog::from_config(&config).unwrap();
    assert!(catalog.get_series("series-2").await.is_some());
    assert_eq!(catalog.list_books("series-3").await.len(), 5);
}
