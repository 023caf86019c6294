//! PostgreSQL `information_schema` metadata source.

use super::{ColumnDescriptor, MetadataSource, SchemaDescriptor, SemanticType};
use crate::error::{Result, TripSqlError};
use async_trait::async_trait;
use sqlx::postgres::PgPool;

/// Reads table and column metadata, including `COMMENT ON` descriptions,
/// for the given schemas.
#[derive(Debug, Clone)]
pub struct PostgresSource {
    pool: PgPool,
    schemas: Vec<String>,
}

type ColumnRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
);

impl PostgresSource {
    pub fn new(pool: PgPool, schemas: Vec<String>) -> Self {
        Self { pool, schemas }
    }
}

#[async_trait]
impl MetadataSource for PostgresSource {
    async fn fetch_tables(&self) -> Result<Vec<SchemaDescriptor>> {
        let rows: Vec<ColumnRow> = sqlx::query_as(
            r#"
            SELECT
                c.table_schema::text,
                c.table_name::text,
                c.column_name::text,
                c.data_type::text,
                c.is_nullable::text,
                col_description(
                    format('%I.%I', c.table_schema, c.table_name)::regclass,
                    c.ordinal_position::int
                )::text,
                obj_description(
                    format('%I.%I', c.table_schema, c.table_name)::regclass,
                    'pg_class'
                )::text
            FROM information_schema.columns c
            WHERE c.table_schema = ANY($1)
            ORDER BY c.table_schema, c.table_name, c.ordinal_position
            "#,
        )
        .bind(&self.schemas)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TripSqlError::catalog_unavailable(format!("Failed to read columns: {e}")))?;

        let mut tables: Vec<SchemaDescriptor> = Vec::new();
        for (schema, table, column, data_type, is_nullable, col_comment, table_comment) in rows {
            let is_same_table = tables
                .last()
                .is_some_and(|t| t.schema == schema && t.name == table);
            if !is_same_table {
                tables.push(SchemaDescriptor::new(
                    schema,
                    table,
                    table_comment.unwrap_or_default(),
                ));
            }

            if let Some(current) = tables.last_mut() {
                current.columns.push(ColumnDescriptor {
                    name: column,
                    semantic_type: SemanticType::from_type_name(&data_type),
                    data_type,
                    nullable: is_nullable == "YES",
                    description: col_comment.unwrap_or_default(),
                });
            }
        }

        Ok(tables)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
