//! Schema descriptor types.
//!
//! A [`CatalogSnapshot`] is an immutable, versioned set of table descriptors.
//! Stages receive the snapshot captured when their request started.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::time::SystemTime;

/// Coarse column type used for prompt hints and result checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Integer,
    Decimal,
    Text,
    Timestamp,
    Date,
    Boolean,
    Other,
}

impl SemanticType {
    /// Classifies an engine type name (`int`, `double`, `varchar(32)`, ...).
    pub fn from_type_name(type_name: &str) -> Self {
        let lowered = type_name.trim().to_lowercase();
        let base = lowered.split('(').next().unwrap_or_default().trim();
        match base {
            "int" | "integer" | "bigint" | "smallint" | "tinyint" | "int2" | "int4" | "int8" => {
                Self::Integer
            }
            "double" | "double precision" | "float" | "float4" | "float8" | "real" | "decimal"
            | "numeric" => Self::Decimal,
            "string" | "varchar" | "char" | "text" | "character varying" | "character" => {
                Self::Text
            }
            "date" => Self::Date,
            "boolean" | "bool" => Self::Boolean,
            _ if base.starts_with("timestamp") => Self::Timestamp,
            _ => Self::Other,
        }
    }
}

/// Describes one column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub semantic_type: SemanticType,
    pub nullable: bool,
    pub description: String,
}

impl ColumnDescriptor {
    /// Creates a nullable column, deriving the semantic type from `data_type`.
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            semantic_type: SemanticType::from_type_name(&data_type),
            data_type,
            nullable: true,
            description: description.into(),
        }
    }

    /// Marks the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Describes one table or view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Schema (database) the table lives in.
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl SchemaDescriptor {
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            description: description.into(),
            columns: Vec::new(),
        }
    }

    /// Adds a column.
    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// Returns `schema.name`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Returns true if `name` (bare or schema-qualified) names this table.
    pub fn matches_name(&self, name: &str) -> bool {
        match name.split_once('.') {
            Some((schema, table)) => {
                self.schema.eq_ignore_ascii_case(schema) && self.name.eq_ignore_ascii_case(table)
            }
            None => self.name.eq_ignore_ascii_case(name),
        }
    }

    /// Finds a column by name, case-insensitively.
    pub fn find_column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Formats the table for inclusion in a generation prompt.
    pub fn format_for_llm(&self) -> String {
        let header = if self.description.is_empty() {
            format!("Table: {}\n", self.qualified_name())
        } else {
            format!("Table: {} -- {}\n", self.qualified_name(), self.description)
        };

        let column_lines = self
            .columns
            .iter()
            .map(|column| {
                let null = if column.nullable { "" } else { " NOT NULL" };
                if column.description.is_empty() {
                    format!("  - {}: {}{}\n", column.name, column.data_type, null)
                } else {
                    format!(
                        "  - {}: {}{} -- {}\n",
                        column.name, column.data_type, null, column.description
                    )
                }
            })
            .collect::<String>();

        format!("{}{}", header, column_lines)
    }
}

/// An immutable, versioned view of the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    /// Strictly increases across refreshes. Zero means never loaded.
    pub version: u64,
    pub refreshed_at: SystemTime,
    /// Tables ordered by qualified name.
    pub tables: Vec<SchemaDescriptor>,
}

impl CatalogSnapshot {
    /// Builds a snapshot, ordering tables by qualified name.
    pub fn new(version: u64, mut tables: Vec<SchemaDescriptor>) -> Self {
        tables.sort_by_key(|t| (t.schema.to_lowercase(), t.name.to_lowercase()));
        Self {
            version,
            refreshed_at: SystemTime::now(),
            tables,
        }
    }

    /// An unloaded, empty snapshot.
    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Resolves a table reference. Unqualified names resolve in
    /// `default_schema` only, as the engine resolves them.
    pub fn find_table(
        &self,
        schema: Option<&str>,
        name: &str,
        default_schema: &str,
    ) -> Option<&SchemaDescriptor> {
        let schema = schema.unwrap_or(default_schema);
        self.tables
            .iter()
            .find(|t| t.schema.eq_ignore_ascii_case(schema) && t.name.eq_ignore_ascii_case(name))
    }

    /// Returns the tables whose bare or qualified name is in `names`, or all
    /// tables when `names` is `None`. Matching is case-insensitive.
    pub fn describe(&self, names: Option<&HashSet<String>>) -> Vec<SchemaDescriptor> {
        match names {
            None => self.tables.clone(),
            Some(names) => self
                .tables
                .iter()
                .filter(|t| names.iter().any(|n| t.matches_name(n)))
                .cloned()
                .collect(),
        }
    }

    /// Hash of the table content, ignoring version and timestamp.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tables.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones() -> SchemaDescriptor {
        SchemaDescriptor::new("nyc_taxi", "taxi_zone_lookup", "Taxi zones")
            .column(ColumnDescriptor::new("LocationID", "int", "Zone id").not_null())
            .column(ColumnDescriptor::new("Borough", "string", "Borough name"))
    }

    #[test]
    fn test_semantic_type_from_type_name() {
        assert_eq!(SemanticType::from_type_name("int"), SemanticType::Integer);
        assert_eq!(SemanticType::from_type_name("BIGINT"), SemanticType::Integer);
        assert_eq!(SemanticType::from_type_name("double"), SemanticType::Decimal);
        assert_eq!(SemanticType::from_type_name("decimal(10,2)"), SemanticType::Decimal);
        assert_eq!(SemanticType::from_type_name("varchar(32)"), SemanticType::Text);
        assert_eq!(SemanticType::from_type_name("string"), SemanticType::Text);
        assert_eq!(SemanticType::from_type_name("timestamp(3)"), SemanticType::Timestamp);
        assert_eq!(
            SemanticType::from_type_name("timestamp without time zone"),
            SemanticType::Timestamp
        );
        assert_eq!(SemanticType::from_type_name("date"), SemanticType::Date);
        assert_eq!(SemanticType::from_type_name("map<string,int>"), SemanticType::Other);
    }

    #[test]
    fn test_find_column_case_insensitive() {
        let table = zones();
        assert!(table.find_column("borough").is_some());
        assert!(table.find_column("LOCATIONID").is_some());
        assert!(table.find_column("zone").is_none());
    }

    #[test]
    fn test_format_for_llm() {
        let text = zones().format_for_llm();
        assert_eq!(
            text,
            "Table: nyc_taxi.taxi_zone_lookup -- Taxi zones\n  - LocationID: int NOT NULL -- Zone id\n  - Borough: string -- Borough name\n"
        );
    }

    #[test]
    fn test_snapshot_orders_tables() {
        let snapshot = CatalogSnapshot::new(
            1,
            vec![
                SchemaDescriptor::new("nyc_taxi", "yellow_curated", ""),
                SchemaDescriptor::new("nyc_taxi", "taxi_zone_lookup", ""),
            ],
        );
        assert_eq!(snapshot.tables[0].name, "taxi_zone_lookup");
        assert_eq!(snapshot.tables[1].name, "yellow_curated");
    }

    #[test]
    fn test_find_table_resolution() {
        let snapshot = CatalogSnapshot::new(
            1,
            vec![
                zones(),
                SchemaDescriptor::new("nyc_taxi_raw", "yellow_tripdata", ""),
                SchemaDescriptor::new("staging", "taxi_zone_lookup", ""),
            ],
        );

        let found = snapshot.find_table(None, "TAXI_ZONE_LOOKUP", "nyc_taxi").unwrap();
        assert_eq!(found.schema, "nyc_taxi");

        let found = snapshot.find_table(Some("staging"), "taxi_zone_lookup", "nyc_taxi").unwrap();
        assert_eq!(found.schema, "staging");

        // A bare name never resolves outside the default schema.
        assert!(snapshot.find_table(None, "yellow_tripdata", "nyc_taxi").is_none());
        let found = snapshot.find_table(None, "yellow_tripdata", "nyc_taxi_raw").unwrap();
        assert_eq!(found.schema, "nyc_taxi_raw");

        assert!(snapshot.find_table(None, "taxi_zone_lookup", "other").is_none());
        assert!(snapshot.find_table(None, "missing", "nyc_taxi").is_none());
    }

    #[test]
    fn test_describe_filter() {
        let snapshot = CatalogSnapshot::new(
            1,
            vec![zones(), SchemaDescriptor::new("nyc_taxi", "yellow_curated", "")],
        );
        assert_eq!(snapshot.describe(None).len(), 2);

        let names: HashSet<String> = ["NYC_TAXI.TAXI_ZONE_LOOKUP".to_string()].into();
        let described = snapshot.describe(Some(&names));
        assert_eq!(described.len(), 1);
        assert_eq!(described[0].name, "taxi_zone_lookup");

        let names: HashSet<String> = ["yellow_curated".to_string()].into();
        assert_eq!(snapshot.describe(Some(&names))[0].name, "yellow_curated");
    }

    #[test]
    fn test_content_hash_ignores_version() {
        let a = CatalogSnapshot::new(1, vec![zones()]);
        let b = CatalogSnapshot::new(7, vec![zones()]);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), CatalogSnapshot::empty().content_hash());
    }
}
