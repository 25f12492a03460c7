//! Vector infrastructure configuration and batch validation.
//!
//! Validation collects every violation into one [`ValidationErrors`] so a
//! bad config file is fixed in a single edit, not one failed run per
//! field.

use serde::Deserialize;

use crate::error::ValidationErrors;

const DISTANCE_FUNCTIONS: &[&str] = &["cosine", "dotproduct", "euclidean"];
const INDEX_TYPES: &[&str] = &["diskann", "quantizedflat", "flat"];

/// Which vector backend to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VectorProvider {
    /// Pick whatever is available; resolves to the in-memory store here.
    Auto,
    InMemory,
    /// External search service (requires the `[vector.search_api]` table).
    SearchApi,
    /// Document database with native vector indexes (requires the
    /// `[vector.document_db]` table).
    DocumentDb,
}

impl Default for VectorProvider {
    fn default() -> Self {
        VectorProvider::Auto
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorIndexConfig {
    #[serde(default)]
    pub provider: VectorProvider,
    /// Collection (or index) the records live in.
    pub collection_name: String,
    /// Identifier of the embedding service producing the vectors.
    pub embedding_service_id: String,
    /// When set, the writer rejects records whose embedding length
    /// differs.
    #[serde(default)]
    pub expected_dimensions: Option<usize>,
    #[serde(default)]
    pub search_api: Option<SearchApiConfig>,
    #[serde(default)]
    pub document_db: Option<DocumentDbVectorConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchApiConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentDbVectorConfig {
    /// JSON path of the embedding field inside stored documents.
    #[serde(default)]
    pub vector_path: Option<String>,
    #[serde(default)]
    pub distance_function: Option<String>,
    #[serde(default)]
    pub index_type: Option<String>,
}

impl VectorIndexConfig {
    /// Check every constraint and report all violations at once.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();

        if self.collection_name.trim().is_empty() {
            errors.push("collection_name must not be empty".to_string());
        }
        if self.embedding_service_id.trim().is_empty() {
            errors.push("embedding_service_id must not be empty".to_string());
        }
        if let Some(dims) = self.expected_dimensions {
            if dims == 0 {
                errors.push("expected_dimensions must be a positive integer".to_string());
            }
        }

        match self.provider {
            VectorProvider::SearchApi => match &self.search_api {
                None => errors.push(
                    "provider 'search-api' requires a [vector.search_api] section".to_string(),
                ),
                Some(api) => {
                    if api.endpoint.as_deref().map_or(true, |s| s.trim().is_empty()) {
                        errors.push("search_api.endpoint must not be empty".to_string());
                    }
                    if api.index_name.as_deref().map_or(true, |s| s.trim().is_empty()) {
                        errors.push("search_api.index_name must not be empty".to_string());
                    }
                }
            },
            VectorProvider::DocumentDb => match &self.document_db {
                None => errors.push(
                    "provider 'document-db' requires a [vector.document_db] section".to_string(),
                ),
                Some(db) => {
                    if db.vector_path.as_deref().map_or(true, |s| s.trim().is_empty()) {
                        errors.push("document_db.vector_path must not be empty".to_string());
                    }
                    if let Some(distance) = db.distance_function.as_deref() {
                        if !DISTANCE_FUNCTIONS.contains(&distance) {
                            errors.push(format!(
                                "document_db.distance_function '{}' is not one of: {}",
                                distance,
                                DISTANCE_FUNCTIONS.join(", ")
                            ));
                        }
                    }
                    if let Some(index_type) = db.index_type.as_deref() {
                        if !INDEX_TYPES.contains(&index_type) {
                            errors.push(format!(
                                "document_db.index_type '{}' is not one of: {}",
                                index_type,
                                INDEX_TYPES.join(", ")
                            ));
                        }
                    }
                }
            },
            VectorProvider::Auto | VectorProvider::InMemory => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> VectorIndexConfig {
        VectorIndexConfig {
            provider: VectorProvider::Auto,
            collection_name: "entities".to_string(),
            embedding_service_id: "default".to_string(),
            expected_dimensions: None,
            search_api: None,
            document_db: None,
        }
    }

    #[test]
    fn test_minimal_in_memory_config_is_valid() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_all_violations_reported_together() {
        let config = VectorIndexConfig {
            provider: VectorProvider::DocumentDb,
            collection_name: "".to_string(),
            expected_dimensions: Some(0),
            document_db: Some(DocumentDbVectorConfig {
                vector_path: None,
                distance_function: Some("manhattan".to_string()),
                index_type: Some("hnsw".to_string()),
            }),
            ..base()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.0.len(), 5);
        let rendered = errors.to_string();
        assert!(rendered.contains("collection_name"));
        assert!(rendered.contains("manhattan"));
        assert!(rendered.contains("hnsw"));
    }

    #[test]
    fn test_search_api_requires_endpoint_and_index() {
        let config = VectorIndexConfig {
            provider: VectorProvider::SearchApi,
            search_api: Some(SearchApiConfig {
                endpoint: Some("https://search.example.com".to_string()),
                index_name: None,
                api_key: None,
            }),
            ..base()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.0.len(), 1);
        assert!(errors.0[0].contains("index_name"));
    }

    #[test]
    fn test_document_db_accepts_known_enumerations() {
        let config = VectorIndexConfig {
            provider: VectorProvider::DocumentDb,
            document_db: Some(DocumentDbVectorConfig {
                vector_path: Some("/embedding".to_string()),
                distance_function: Some("cosine".to_string()),
                index_type: Some("diskann".to_string()),
            }),
            ..base()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_deserializes_from_kebab_case() {
        let config: VectorIndexConfig = toml::from_str(
            r#"
provider = "search-api"
collection_name = "entities"
embedding_service_id = "default"
"#,
        )
        .unwrap();
        assert_eq!(config.provider, VectorProvider::SearchApi);
    }
}
