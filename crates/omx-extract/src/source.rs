//! Source catalog
//!
//! A [`SourceSpec`] describes one upstream registry: where it lives, which
//! entity type it serves, and the earliest date with data worth extracting.
//! The base URL is a plain field so tests can point a source at a mock server.

use crate::schema::EntityType;
use chrono::NaiveDate;

/// EBI BioSamples REST endpoint.
pub const EBI_BIOSAMPLES_URL: &str = "https://www.ebi.ac.uk/biosamples/samples";

/// One upstream paginated source
#[derive(Debug, Clone)]
pub struct SourceSpec {
    /// Stable identifier; prefixes every partition file name.
    pub id: String,

    /// Endpoint serving the paginated collection.
    pub base_url: String,

    /// Entity type the source returns, used to pick the schema.
    pub entity_type: EntityType,

    /// First date with data worth extracting.
    pub start_date: NaiveDate,
}

impl SourceSpec {
    /// The EBI BioSamples registry. Incremental updates are reliable from
    /// 2021 onward, so extraction starts there.
    pub fn ebi_biosamples() -> Self {
        Self {
            id: "biosamples".to_string(),
            base_url: EBI_BIOSAMPLES_URL.to_string(),
            entity_type: EntityType::Biosample,
            // First date the update-date filter returns consistent results for.
            start_date: NaiveDate::from_ymd_opt(2021, 1, 1)
                .unwrap_or(NaiveDate::MIN),
        }
    }

    /// Replace the base URL, keeping everything else.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}
