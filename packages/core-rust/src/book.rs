//! Book record types.
//!
//! - [`BookRecord`]: a book as held by the record store
//! - [`BookPayload`]: the request body for inserts and updates
//! - [`EnrichedBookRecord`]: a stored record plus the remote author's display name

use serde::{Deserialize, Serialize};

use crate::author::AuthorInfo;

/// Store-assigned identifier of a book.
pub type BookId = i32;

/// A book as persisted by the record store.
///
/// Records are immutable once read into the enrichment pipeline; all
/// derived values are built from clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: BookId,
    pub isbn: String,
    pub title: String,
    /// Raw author key or name as entered with the book.
    pub author: String,
    pub price: f64,
}

impl BookRecord {
    /// Identifier handed to the author service when enriching this record.
    ///
    /// This is the book's own id, not an author id. The join is kept as the
    /// upstream service expects it; see `DESIGN.md` before changing it.
    #[must_use]
    pub fn author_lookup_key(&self) -> i64 {
        i64::from(self.id)
    }

    /// Merges the remote author into an enriched copy of this record.
    #[must_use]
    pub fn enrich(self, author: &AuthorInfo) -> EnrichedBookRecord {
        EnrichedBookRecord {
            display_author: author.display_name(),
            book: self,
        }
    }
}

/// Request body accepted when inserting or updating a book.
///
/// Any `id` supplied on insert is ignored because the store assigns ids.
/// On update the path id replaces whatever the body carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookPayload {
    #[serde(default)]
    pub id: Option<BookId>,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub price: f64,
}

impl BookPayload {
    /// Builds the stored record under the given id.
    #[must_use]
    pub fn into_record(self, id: BookId) -> BookRecord {
        BookRecord {
            id,
            isbn: self.isbn,
            title: self.title,
            author: self.author,
            price: self.price,
        }
    }
}

/// A book record with the remote author's `"Last, First"` display name.
///
/// Only ever produced by enrichment and returned as a response value;
/// never persisted. Serializes flat: the book fields followed by
/// `displayAuthor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedBookRecord {
    #[serde(flatten)]
    pub book: BookRecord,
    #[serde(rename = "displayAuthor")]
    pub display_author: String,
}
