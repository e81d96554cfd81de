//! Built-in catalog used when no external endpoint is configured or the
//! endpoint cannot answer.

use super::{Author, Book, CatalogSource, Page, Series, SeriesFilter, SeriesMetadata, SeriesStatus};
use crate::error::CatalogError;
use async_trait::async_trait;
use std::sync::LazyLock;

/// Cover used for every fixture series.
const FIXTURE_COVER: &str = "https://placehold.co/300x450.png";

static FIXTURE_SERIES: LazyLock<Vec<Series>> = LazyLock::new(|| {
    vec![
        fixture(
            "series-1",
            "Epic Quest Saga",
            "Join our hero on an epic quest to save the world from ancient darkness. This thrilling adventure is full of twists, turns, and unforgettable characters.",
            "Mangaka Sensei",
            &["Adventure", "Fantasy", "Action"],
            SeriesStatus::Ongoing,
            15,
            (true, false),
            (4.5, 120),
        ),
        fixture(
            "series-2",
            "Cybernetic Dreams",
            "In a futuristic city, a young hacker uncovers a conspiracy that could change humanity forever. A tale of technology, rebellion, and hope.",
            "Tech Noir",
            &["Sci-Fi", "Cyberpunk", "Mystery"],
            SeriesStatus::Completed,
            50,
            (true, false),
            (4.2, 95),
        ),
        fixture(
            "series-3",
            "School Life Funnies",
            "A hilarious slice-of-life comedy following the daily antics of a group of high school friends. Get ready for laughter and heartwarming moments!",
            "Comi K. Relif",
            &["Comedy", "Slice of Life", "School"],
            SeriesStatus::Ongoing,
            5,
            (false, false),
            (3.8, 30),
        ),
        fixture(
            "series-4",
            "The Last Spellbinder",
            "In a world where magic is fading, the last spellbinder must embark on a perilous journey to restore it. A story of courage, sacrifice, and the power of belief.",
            "Mysteria Weaver",
            &["Fantasy", "Magic", "Drama"],
            SeriesStatus::Completed,
            120,
            (false, true),
            (4.9, 250),
        ),
        fixture(
            "series-5",
            "Ninja Way",
            "A young ninja strives to become the strongest in his village, facing challenges and making friends along the way.",
            "Shinobi Storyteller",
            &["Action", "Adventure", "Martial Arts"],
            SeriesStatus::Ongoing,
            200,
            (true, false),
            (4.0, 150),
        ),
    ]
});

#[allow(clippy::too_many_arguments)]
fn fixture(
    id: &str,
    title: &str,
    summary: &str,
    author: &str,
    genres: &[&str],
    status: SeriesStatus,
    books_count: u32,
    (featured, premium): (bool, bool),
    (average_rating, rating_count): (f64, u32),
) -> Series {
    Series {
        id: id.to_string(),
        name: title.to_string(),
        books_count,
        metadata: SeriesMetadata {
            title: title.to_string(),
            summary: summary.to_string(),
            status,
            authors: vec![Author {
                name: author.to_string(),
                role: Some("writer".to_string()),
            }],
            genres: genres.iter().map(|g| g.to_string()).collect(),
            publisher: None,
            release_date: None,
        },
        cover_image_url: FIXTURE_COVER.to_string(),
        featured,
        premium,
        average_rating,
        rating_count,
    }
}

/// Page count of fixture book `number`, between 15 and 24.
fn fixture_pages_count(number: u32) -> u32 {
    15 + (number * 7) % 10
}

fn fixture_book(series_id: &str, number: u32) -> Book {
    Book {
        id: format!("{}-book-{}", series_id, number),
        series_id: series_id.to_string(),
        name: format!("Chapter {}: The Adventure Begins", number),
        number,
        pages_count: fixture_pages_count(number),
    }
}

/// The fixture data set.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureCatalog;

impl FixtureCatalog {
    pub fn new() -> Self {
        Self
    }

    pub fn all_series(&self) -> &'static [Series] {
        &FIXTURE_SERIES
    }

    /// All series, or only featured ones.
    pub fn matching(&self, filter: &SeriesFilter) -> Vec<Series> {
        FIXTURE_SERIES
            .iter()
            .filter(|s| !filter.featured || s.featured)
            .cloned()
            .collect()
    }

    pub fn series(&self, id: &str) -> Option<&'static Series> {
        FIXTURE_SERIES.iter().find(|s| s.id == id)
    }

    /// Books of a series in ascending order; empty for unknown series.
    pub fn books(&self, series_id: &str) -> Vec<Book> {
        match self.series(series_id) {
            Some(series) => (1..=series.books_count)
                .map(|n| fixture_book(&series.id, n))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn book(&self, id: &str) -> Option<Book> {
        FIXTURE_SERIES.iter().find_map(|series| {
            let number: u32 = id
                .strip_prefix(series.id.as_str())?
                .strip_prefix("-book-")?
                .parse()
                .ok()?;
            (1..=series.books_count)
                .contains(&number)
                .then(|| fixture_book(&series.id, number))
        })
    }

    /// Placeholder pages of a book; empty for unknown books.
    pub fn pages(&self, book_id: &str) -> Vec<Page> {
        let Some(book) = self.book(book_id) else {
            return Vec::new();
        };
        (1..=book.pages_count)
            .map(|n| Page {
                number: n,
                url: format!(
                    "https://placehold.co/800x1200.png?text=S[{}]-B[{}]-P[{}]",
                    book.series_id, book.id, n
                ),
                media_type: Some("image/png".to_string()),
                width: Some(800),
                height: Some(1200),
            })
            .collect()
    }
}

#[async_trait]
impl CatalogSource for FixtureCatalog {
    fn name(&self) -> &'static str {
        "fixtures"
    }

    async fn list_series(&self, filter: &SeriesFilter) -> Result<Vec<Series>, CatalogError> {
        Ok(self.matching(filter))
    }

    async fn get_series(&self, id: &str) -> Result<Option<Series>, CatalogError> {
        Ok(self.series(id).cloned())
    }

    async fn list_books(&self, series_id: &str) -> Result<Vec<Book>, CatalogError> {
        Ok(self.books(series_id))
    }

    async fn get_book(&self, id: &str) -> Result<Option<Book>, CatalogError> {
        Ok(self.book(id))
    }

    async fn list_pages(&self, book_id: &str) -> Result<Vec<Page>, CatalogError> {
        Ok(self.pages(book_id))
    }
}
