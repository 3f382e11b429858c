//! Lenient readers for the Book-Crossing style `Ratings.csv` and `Books.csv`.
//!
//! Both files are latin-1 encoded. Rows whose field count differs from the
//! header, or whose numeric fields do not parse, are skipped and counted.

use crate::error::IngestError;
use crate::models::{Book, RatingRecord};
use crate::utils::{latin1_to_string, validation::validate_rating_record};
use csv::{ByteRecord, ReaderBuilder};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Ingested<T> {
    pub rows: Vec<T>,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: u8,
}

impl CsvOptions {
    pub fn new(delimiter: char) -> Result<Self, IngestError> {
        if !delimiter.is_ascii() {
            return Err(IngestError::InvalidDelimiter(delimiter));
        }
        Ok(Self {
            delimiter: delimiter as u8,
        })
    }
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

struct Columns {
    names: Vec<String>,
}

impl Columns {
    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn require(&self, path: &Path, name: &'static str) -> Result<usize, IngestError> {
        self.position(name).ok_or_else(|| IngestError::MissingColumn {
            path: path.to_path_buf(),
            column: name,
        })
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}

fn open_reader(
    path: &Path,
    options: &CsvOptions,
) -> Result<(csv::Reader<File>, Columns), IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(file);

    let headers = reader
        .byte_headers()
        .map_err(|source| IngestError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    let names = headers
        .iter()
        .map(|h| latin1_to_string(h).trim().to_string())
        .collect();

    Ok((reader, Columns { names }))
}

fn field(record: &ByteRecord, index: usize) -> String {
    record.get(index).map(latin1_to_string).unwrap_or_default()
}

pub fn read_ratings(path: &Path, options: &CsvOptions) -> Result<Ingested<RatingRecord>, IngestError> {
    let (mut reader, columns) = open_reader(path, options)?;
    let user_col = columns.require(path, "User-ID")?;
    let isbn_col = columns.require(path, "ISBN")?;
    let rating_col = columns.require(path, "Book-Rating")?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    let mut record = ByteRecord::new();

    loop {
        match reader.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {}
            Err(e) if e.is_io_error() => {
                return Err(IngestError::Csv {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                debug!("Skipping unreadable rating row: {}", e);
                skipped += 1;
                continue;
            }
        }

        if record.len() != columns.len() {
            skipped += 1;
            continue;
        }

        let parsed = field(&record, user_col)
            .trim()
            .parse::<u64>()
            .ok()
            .zip(field(&record, rating_col).trim().parse::<f32>().ok())
            .map(|(user_id, rating)| RatingRecord::new(user_id, field(&record, isbn_col), rating));

        match parsed {
            Some(rating) if validate_rating_record(&rating).is_ok() => rows.push(rating),
            _ => {
                debug!("Skipping malformed rating row at {:?}", record.position());
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} malformed rows in {}", skipped, path.display());
    }
    info!("Loaded {} ratings from {}", rows.len(), path.display());

    Ok(Ingested { rows, skipped })
}

pub fn read_books(
    path: &Path,
    options: &CsvOptions,
    placeholder_image_url: &str,
) -> Result<Ingested<Book>, IngestError> {
    let (mut reader, columns) = open_reader(path, options)?;
    let isbn_col = columns.require(path, "ISBN")?;
    let optional = |name: &str| columns.position(name);
    let title_col = optional("Book-Title");
    let author_col = optional("Book-Author");
    let year_col = optional("Year-Of-Publication");
    let publisher_col = optional("Publisher");
    let image_s_col = optional("Image-URL-S");
    let image_m_col = optional("Image-URL-M");
    let image_l_col = optional("Image-URL-L");

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    let mut record = ByteRecord::new();

    loop {
        match reader.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {}
            Err(e) if e.is_io_error() => {
                return Err(IngestError::Csv {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                debug!("Skipping unreadable book row: {}", e);
                skipped += 1;
                continue;
            }
        }

        if record.len() != columns.len() {
            skipped += 1;
            continue;
        }

        let get = |col: Option<usize>| col.map(|c| field(&record, c)).unwrap_or_default();
        let mut image_url_l = get(image_l_col);
        if image_url_l.trim().is_empty() {
            image_url_l = placeholder_image_url.to_string();
        }

        rows.push(Book {
            isbn: field(&record, isbn_col),
            title: get(title_col),
            author: get(author_col),
            year_of_publication: get(year_col),
            publisher: get(publisher_col),
            image_url_s: get(image_s_col),
            image_url_m: get(image_m_col),
            image_url_l,
        });
    }

    if skipped > 0 {
        warn!("Skipped {} malformed rows in {}", skipped, path.display());
    }
    info!("Loaded {} books from {}", rows.len(), path.display());

    Ok(Ingested { rows, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn test_read_ratings_skips_bad_rows() {
        let file = write_fixture(
            b"User-ID,ISBN,Book-Rating\n\
              276725,034545104X,0\n\
              oops,0155061224,5\n\
              276727,0446520802,0,extra\n\
              276729,052165615X,3\n",
        );
        let ingested = read_ratings(file.path(), &CsvOptions::default()).unwrap();
        assert_eq!(ingested.rows.len(), 2);
        assert_eq!(ingested.skipped, 2);
        assert_eq!(ingested.rows[0], RatingRecord::new(276725, "034545104X", 0.0));
        assert_eq!(ingested.rows[1].rating, 3.0);
    }

    #[test]
    fn test_read_ratings_trims_headers_and_honours_delimiter() {
        let file = write_fixture(b" User-ID ; ISBN ;Book-Rating\n1;abc;7\n");
        let options = CsvOptions::new(';').unwrap();
        let ingested = read_ratings(file.path(), &options).unwrap();
        assert_eq!(ingested.rows, vec![RatingRecord::new(1, "abc", 7.0)]);
    }

    #[test]
    fn test_read_ratings_requires_columns() {
        let file = write_fixture(b"User,ISBN,Book-Rating\n1,abc,7\n");
        let result = read_ratings(file.path(), &CsvOptions::default());
        assert!(matches!(
            result,
            Err(IngestError::MissingColumn { column: "User-ID", .. })
        ));
    }

    #[test]
    fn test_read_books_decodes_latin1_and_fills_images() {
        let mut contents = b"ISBN,Book-Title,Book-Author,Image-URL-L\n".to_vec();
        contents.extend_from_slice(b"0001,Caf\xe9,Someone,\n");
        contents.extend_from_slice(b"0002,Other,Else,http://img/l.jpg\n");
        let file = write_fixture(&contents);

        let ingested = read_books(file.path(), &CsvOptions::default(), "placeholder").unwrap();
        assert_eq!(ingested.rows.len(), 2);
        assert_eq!(ingested.rows[0].title, "Café");
        assert_eq!(ingested.rows[0].image_url_l, "placeholder");
        assert_eq!(ingested.rows[1].image_url_l, "http://img/l.jpg");
        assert_eq!(ingested.rows[1].publisher, "");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = read_books(Path::new("/nonexistent/Books.csv"), &CsvOptions::default(), "");
        assert!(matches!(result, Err(IngestError::Io { .. })));
    }

    #[test]
    fn test_rejects_non_ascii_delimiter() {
        assert!(CsvOptions::new('§').is_err());
    }
}
