//! Schema catalog for tripsql.
//!
//! Holds the current [`CatalogSnapshot`] behind an [`ArcSwap`]. Readers take a
//! cheap `Arc` of whatever snapshot is current and never block; a refresh
//! builds a complete new snapshot and swaps the pointer once it is ready.

mod allowlist;
mod builtin;
mod postgres;
mod source;
mod types;

pub use allowlist::AllowList;
pub use builtin::{nyc_taxi_tables, BuiltinSource};
pub use postgres::PostgresSource;
pub use source::{FileSource, MetadataSource};
pub use types::{CatalogSnapshot, ColumnDescriptor, SchemaDescriptor, SemanticType};

use crate::error::Result;
use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Versioned, copy-and-swap schema catalog.
pub struct SchemaCatalog {
    source: Arc<dyn MetadataSource>,
    current: ArcSwap<CatalogSnapshot>,
    /// Serializes refreshes so versions stay monotonic.
    refresh_lock: Mutex<()>,
}

impl SchemaCatalog {
    /// Loads the catalog from its source. Fails with `CatalogUnavailable` if
    /// the source cannot be reached.
    pub async fn load(source: Arc<dyn MetadataSource>) -> Result<Self> {
        let tables = source.fetch_tables().await?;
        info!(
            source = source.name(),
            tables = tables.len(),
            "Loaded schema catalog"
        );
        Ok(Self {
            source,
            current: ArcSwap::from_pointee(CatalogSnapshot::new(1, tables)),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Returns the current snapshot. Requests capture this once and use it
    /// for their whole lifetime.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.load_full()
    }

    /// Returns the current version.
    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    /// Describes the named tables, or every table when `tables` is `None`.
    pub fn describe(&self, tables: Option<&HashSet<String>>) -> Vec<SchemaDescriptor> {
        self.current.load().describe(tables)
    }

    /// Re-reads the source and swaps in a new snapshot.
    ///
    /// On failure the previous snapshot stays in place and the error
    /// (`CatalogUnavailable`) is returned.
    pub async fn refresh(&self) -> Result<Arc<CatalogSnapshot>> {
        let _guard = self.refresh_lock.lock().await;

        let tables = match self.source.fetch_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                warn!(
                    source = self.source.name(),
                    version = self.version(),
                    "Catalog refresh failed, serving stale snapshot: {}",
                    e
                );
                return Err(e);
            }
        };

        let previous = self.current.load_full();
        let next = Arc::new(CatalogSnapshot::new(previous.version + 1, tables));
        if next.content_hash() == previous.content_hash() {
            debug!(version = next.version, "Catalog content unchanged");
        } else {
            info!(
                version = next.version,
                tables = next.tables.len(),
                "Catalog content changed"
            );
        }
        self.current.store(Arc::clone(&next));
        Ok(next)
    }

    /// Refreshes every `interval` until `cancel` fires.
    pub fn spawn_refresh_task(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Catalog refresh task stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        // Failures are logged by refresh() and retried next tick.
                        let _ = self.refresh().await;
                    }
                }
            }
        })
    }
}
