//! Table allow-list for generated SQL.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    /// `schema.table`
    Table { schema: String, table: String },
    /// `schema.*`
    Schema(String),
}

/// The set of tables generated SQL may read.
///
/// Entries are `schema.table`, `schema.*`, or a bare `table` which belongs to
/// the default schema. Unqualified references resolve in the default schema.
/// Catalog-qualified references (`hive.nyc_taxi.t`) are allowed only for the
/// engine's own catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    entries: Vec<Entry>,
    default_schema: String,
    catalog: Option<String>,
}

impl AllowList {
    pub fn new<I, S>(entries: I, default_schema: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let default_schema = default_schema.into().to_lowercase();
        let entries = entries
            .into_iter()
            .filter_map(|entry| {
                let entry = entry.as_ref().trim().to_lowercase();
                if entry.is_empty() {
                    return None;
                }
                Some(match entry.split_once('.') {
                    Some((schema, "*")) => Entry::Schema(schema.to_string()),
                    Some((schema, table)) => Entry::Table {
                        schema: schema.to_string(),
                        table: table.to_string(),
                    },
                    None => Entry::Table {
                        schema: default_schema.clone(),
                        table: entry,
                    },
                })
            })
            .collect();

        Self {
            entries,
            default_schema,
            catalog: None,
        }
    }

    /// Sets the engine catalog that catalog-qualified references may name.
    pub fn with_catalog(mut self, catalog: impl AsRef<str>) -> Self {
        let catalog = catalog.as_ref().trim().to_lowercase();
        self.catalog = (!catalog.is_empty()).then_some(catalog);
        self
    }

    /// The schema unqualified references resolve in.
    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    /// Returns true if the reference names an allowed table.
    pub fn permits(&self, schema: Option<&str>, table: &str) -> bool {
        let schema = schema.unwrap_or(&self.default_schema).to_lowercase();
        let table = table.to_lowercase();
        self.entries.iter().any(|entry| match entry {
            Entry::Schema(s) => *s == schema,
            Entry::Table { schema: s, table: t } => *s == schema && *t == table,
        })
    }

    /// Returns true if `catalog` is the engine catalog. Always false when no
    /// catalog is configured.
    pub fn permits_catalog(&self, catalog: &str) -> bool {
        self.catalog
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(catalog))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for AllowList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .entries
            .iter()
            .map(|entry| match entry {
                Entry::Schema(s) => format!("{s}.*"),
                Entry::Table { schema, table } => format!("{schema}.{table}"),
            })
            .collect();
        f.write_str(&names.join(", "))
    }
}
