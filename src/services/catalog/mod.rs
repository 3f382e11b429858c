use crate::config::Config;
use crate::data::{self, CsvOptions};
use crate::error::IngestError;
use crate::models::Book;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Book metadata keyed by ISBN, in file order.
#[derive(Debug, Default)]
pub struct BookCatalog {
    books: Vec<Book>,
    by_isbn: HashMap<String, usize>,
}

impl BookCatalog {
    pub fn new(books: Vec<Book>) -> Self {
        let mut by_isbn = HashMap::with_capacity(books.len());
        for (position, book) in books.iter().enumerate() {
            // first occurrence wins, matching a scan from the top of the file
            by_isbn.entry(book.isbn.clone()).or_insert(position);
        }
        Self { books, by_isbn }
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn get(&self, isbn: &str) -> Option<&Book> {
        self.by_isbn.get(isbn).map(|&position| &self.books[position])
    }

    pub fn head(&self, limit: usize) -> &[Book] {
        &self.books[..limit.min(self.books.len())]
    }
}

#[derive(Debug, Clone)]
pub enum CatalogState {
    Unloaded,
    Ready(Arc<BookCatalog>),
}

#[derive(Debug, Clone)]
pub struct CatalogService {
    state: CatalogState,
}

impl CatalogService {
    pub fn unloaded() -> Self {
        Self {
            state: CatalogState::Unloaded,
        }
    }

    pub fn ready(catalog: BookCatalog) -> Self {
        Self {
            state: CatalogState::Ready(Arc::new(catalog)),
        }
    }

    pub fn load(config: &Config) -> Self {
        match Self::read(config) {
            Ok(catalog) => {
                info!("Loaded {} books.", catalog.len());
                Self::ready(catalog)
            }
            Err(e) => {
                error!("Error loading books: {}", e);
                Self::unloaded()
            }
        }
    }

    fn read(config: &Config) -> Result<BookCatalog, IngestError> {
        let options = CsvOptions::new(config.data.delimiter)?;
        let ingested = data::read_books(
            &config.data.books_path,
            &options,
            &config.catalog.placeholder_image_url,
        )?;
        if ingested.rows.is_empty() {
            warn!("{} contains no books", config.data.books_path.display());
        }
        Ok(BookCatalog::new(ingested.rows))
    }

    pub fn catalog(&self) -> Option<&BookCatalog> {
        match &self.state {
            CatalogState::Unloaded => None,
            CatalogState::Ready(catalog) => Some(catalog.as_ref()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, CatalogState::Ready(_))
    }
}
