use serde::{Deserialize, Serialize};

/// Name parts of an author as returned by the remote author service.
///
/// No local identity is tracked: the value is fetched per lookup and
/// discarded once merged into an enriched record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorInfo {
    pub last_name: String,
    /// The author service has historically emitted this field as `firtName`.
    #[serde(alias = "firtName")]
    pub first_name: String,
}

impl AuthorInfo {
    #[must_use]
    pub fn new(last_name: impl Into<String>, first_name: impl Into<String>) -> Self {
        Self {
            last_name: last_name.into(),
            first_name: first_name.into(),
        }
    }

    /// Formats the author as `"Last, First"`.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}
