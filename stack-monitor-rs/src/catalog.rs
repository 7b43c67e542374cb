//! Technology catalog lookup seam.
//!
//! The catalog is an external collaborator injected at construction.
//! When no catalog is wired in, coverage scoring degrades to
//! [`DEFAULT_CATALOG_COVERAGE`] rather than erroring.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Coverage assumed when no catalog collaborator is available.
pub const DEFAULT_CATALOG_COVERAGE: f64 = 0.8;

/// One known technology in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    pub category: String,
    pub ecosystem: Option<String>,
}

/// Lookup capability over a technology catalog.
///
/// Lookups are case-insensitive on the technology name.
#[cfg_attr(test, mockall::automock)]
pub trait CatalogLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Option<CatalogEntry>;
}

/// In-memory catalog seeded with commonly generated technologies.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-seeded with the technologies the generation pipeline
    /// emits most often.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        let seed: &[(&str, &str, Option<&str>)] = &[
            ("fastapi", "web_framework", None),
            ("django", "web_framework", None),
            ("flask", "web_framework", None),
            ("express", "web_framework", None),
            ("react", "frontend", None),
            ("vue", "frontend", None),
            ("angular", "frontend", None),
            ("postgresql", "database", None),
            ("mysql", "database", None),
            ("mongodb", "database", None),
            ("redis", "cache", None),
            ("memcached", "cache", None),
            ("elasticsearch", "search", None),
            ("kafka", "messaging", None),
            ("rabbitmq", "messaging", None),
            ("docker", "container", None),
            ("kubernetes", "orchestration", None),
            ("terraform", "infrastructure", None),
            ("nginx", "web_server", None),
            ("graphql", "api", None),
            ("grpc", "api", None),
            ("aws lambda", "serverless", Some("aws")),
            ("aws s3", "storage", Some("aws")),
            ("dynamodb", "database", Some("aws")),
            ("azure functions", "serverless", Some("azure")),
            ("cosmos db", "database", Some("azure")),
            ("google cloud storage", "storage", Some("gcp")),
            ("bigquery", "analytics", Some("gcp")),
            ("tensorflow", "ml_framework", None),
            ("pytorch", "ml_framework", None),
            ("spark", "data_processing", None),
            ("airflow", "workflow", None),
            ("prometheus", "monitoring", None),
            ("grafana", "monitoring", None),
        ];
        for (name, category, ecosystem) in seed {
            catalog.insert(CatalogEntry {
                name: (*name).to_string(),
                category: (*category).to_string(),
                ecosystem: ecosystem.map(|e| e.to_string()),
            });
        }
        catalog
    }

    pub fn insert(&mut self, entry: CatalogEntry) {
        self.entries.insert(entry.name.to_lowercase(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CatalogLookup for StaticCatalog {
    fn lookup(&self, name: &str) -> Option<CatalogEntry> {
        self.entries.get(&name.trim().to_lowercase()).cloned()
    }
}
