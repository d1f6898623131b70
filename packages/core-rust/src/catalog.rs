use serde::{Deserialize, Serialize};

use crate::book::{BookRecord, EnrichedBookRecord};

/// Listing returned by the guarded enrichment call.
///
/// `Degraded` is produced only by the fallback path and carries the plain
/// records: same element count, no `displayAuthor` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Catalog {
    Enriched(Vec<EnrichedBookRecord>),
    Degraded(Vec<BookRecord>),
}

impl Catalog {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Enriched(books) => books.len(),
            Self::Degraded(books) => books.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuthorInfo;

    fn book() -> BookRecord {
        BookRecord {
            id: 1,
            isbn: "X".to_string(),
            title: "T1".to_string(),
            author: "a".to_string(),
            price: 9.99,
        }
    }

    #[test]
    fn degraded_listing_omits_display_author() {
        let catalog = Catalog::Degraded(vec![book()]);
        let json = serde_json::to_value(&catalog).unwrap();
        assert!(json[0].get("displayAuthor").is_none());
        assert_eq!(json[0]["id"], 1);
        assert!(catalog.is_degraded());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn enriched_listing_serializes_as_plain_array() {
        let catalog = Catalog::Enriched(vec![book().enrich(&AuthorInfo::new("Doe", "Jane"))]);
        let json = serde_json::to_value(&catalog).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["displayAuthor"], "Doe, Jane");
        assert!(!catalog.is_degraded());
    }

    #[test]
    fn empty_listing() {
        assert!(Catalog::Enriched(Vec::new()).is_empty());
    }
}
