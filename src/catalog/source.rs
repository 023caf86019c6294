//! Metadata sources backing the schema catalog.

use super::{ColumnDescriptor, SchemaDescriptor, SemanticType};
use crate::error::{Result, TripSqlError};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

/// A read-only store of table and column metadata.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Reads every table the source knows about.
    ///
    /// Fails with `CatalogUnavailable` if the store cannot be reached.
    async fn fetch_tables(&self) -> Result<Vec<SchemaDescriptor>>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Reads table descriptors from a TOML file.
///
/// ```toml
/// [[tables]]
/// schema = "nyc_taxi"
/// name = "taxi_zone_lookup"
/// description = "TLC taxi zones"
///
/// [[tables.columns]]
/// name = "Borough"
/// type = "string"
/// description = "Borough name"
/// ```
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    default_schema: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, default_schema: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_schema: default_schema.into(),
        }
    }

    /// Parses descriptor TOML.
    pub fn parse(&self, content: &str) -> Result<Vec<SchemaDescriptor>> {
        let file: CatalogFile = toml::from_str(content).map_err(|e| {
            TripSqlError::catalog_unavailable(format!(
                "Invalid catalog file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(file
            .tables
            .into_iter()
            .map(|table| SchemaDescriptor {
                schema: table
                    .schema
                    .unwrap_or_else(|| self.default_schema.clone()),
                name: table.name,
                description: table.description,
                columns: table
                    .columns
                    .into_iter()
                    .map(|col| ColumnDescriptor {
                        semantic_type: col
                            .semantic_type
                            .unwrap_or_else(|| SemanticType::from_type_name(&col.data_type)),
                        name: col.name,
                        data_type: col.data_type,
                        nullable: col.nullable,
                        description: col.description,
                    })
                    .collect(),
            })
            .collect())
    }
}

#[async_trait]
impl MetadataSource for FileSource {
    async fn fetch_tables(&self) -> Result<Vec<SchemaDescriptor>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            TripSqlError::catalog_unavailable(format!(
                "Failed to read catalog file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        self.parse(&content)
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tables: Vec<FileTable>,
}

#[derive(Debug, Deserialize)]
struct FileTable {
    schema: Option<String>,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    columns: Vec<FileColumn>,
}

#[derive(Debug, Deserialize)]
struct FileColumn {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    semantic_type: Option<SemanticType>,
    #[serde(default = "default_nullable")]
    nullable: bool,
    #[serde(default)]
    description: String,
}

fn default_nullable() -> bool {
    true
}
