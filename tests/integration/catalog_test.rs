//! Catalog loading and refresh from a descriptor file.

use std::sync::Arc;

use tripsql::catalog::{FileSource, SchemaCatalog, SemanticType};
use tripsql::error::ErrorKind;

const ZONES: &str = r#"
[[tables]]
name = "taxi_zone_lookup"
description = "TLC taxi zones"

[[tables.columns]]
name = "LocationID"
type = "int"
nullable = false

[[tables.columns]]
name = "Borough"
type = "string"
"#;

const ZONES_WITH_SERVICE: &str = r#"
[[tables]]
name = "taxi_zone_lookup"
description = "TLC taxi zones"

[[tables.columns]]
name = "LocationID"
type = "int"
nullable = false

[[tables.columns]]
name = "Borough"
type = "string"

[[tables.columns]]
name = "service_zone"
type = "string"
"#;

#[tokio::test]
async fn test_file_catalog_load_and_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.toml");
    std::fs::write(&path, ZONES).unwrap();

    let catalog = SchemaCatalog::load(Arc::new(FileSource::new(path.clone(), "nyc_taxi")))
        .await
        .unwrap();
    let first = catalog.snapshot();
    assert_eq!(first.version, 1);
    let zones = first
        .find_table(Some("nyc_taxi"), "taxi_zone_lookup", "nyc_taxi")
        .unwrap();
    assert_eq!(zones.columns.len(), 2);
    assert_eq!(zones.columns[0].semantic_type, SemanticType::Integer);
    assert!(!zones.columns[0].nullable);

    std::fs::write(&path, ZONES_WITH_SERVICE).unwrap();
    let second = catalog.refresh().await.unwrap();
    assert_eq!(second.version, 2);
    assert!(second
        .find_table(None, "taxi_zone_lookup", "nyc_taxi")
        .unwrap()
        .find_column("SERVICE_ZONE")
        .is_some());

    // The snapshot captured before the refresh is unchanged.
    assert_eq!(first.tables[0].columns.len(), 2);
}

#[tokio::test]
async fn test_refresh_failure_keeps_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.toml");
    std::fs::write(&path, ZONES).unwrap();

    let catalog = SchemaCatalog::load(Arc::new(FileSource::new(path.clone(), "nyc_taxi")))
        .await
        .unwrap();

    std::fs::write(&path, "[[tables]\nname = ").unwrap();
    let err = catalog.refresh().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CatalogUnavailable);
    assert_eq!(catalog.version(), 1);
    assert_eq!(catalog.describe(None).len(), 1);

    std::fs::remove_file(&path).unwrap();
    assert!(catalog.refresh().await.is_err());
    assert_eq!(catalog.version(), 1);
}

#[tokio::test]
async fn test_missing_catalog_file_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileSource::new(dir.path().join("absent.toml"), "nyc_taxi");
    let err = SchemaCatalog::load(Arc::new(source)).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::CatalogUnavailable);
}
