//! Mock query engine for testing and `--mock` runs.
//!
//! Plays back a script of outcomes (rows, transient errors, rejections, hangs)
//! and then falls back to data sets matched against the submitted SQL.

use super::{ColumnInfo, EngineOutput, QueryEngine, QueryHandle, Row, Value};
use crate::error::{Result, TripSqlError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What the mock engine does for one submitted statement.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    /// Return these rows (capped at the requested maximum).
    Rows { columns: Vec<ColumnInfo>, rows: Vec<Row> },
    /// Fail with a retryable error.
    Transient(String),
    /// Fail with a rejection, as an engine does for bad SQL.
    Rejected(String),
    /// Never finish within any sane timeout.
    Hang,
}

#[derive(Debug, Clone)]
struct Dataset {
    pattern: String,
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
}

/// A query engine that returns predefined results.
pub struct MockEngine {
    script: Mutex<VecDeque<MockOutcome>>,
    datasets: Vec<Dataset>,
    pending: Mutex<HashMap<String, MockOutcome>>,
    submitted: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    cancellations: AtomicUsize,
    next_id: AtomicU64,
    hang: Duration,
    cancellable: bool,
}

impl MockEngine {
    /// Creates a mock engine with no data sets.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            datasets: Vec::new(),
            pending: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            hang: Duration::from_secs(3600),
            cancellable: true,
        }
    }

    /// Creates a mock engine serving the demo trip data.
    pub fn demo() -> Self {
        Self::new()
            .with_dataset("tip", borough_tip_columns(), borough_tip_rows())
            .with_dataset("", hourly_columns(), manhattan_hourly_rows())
    }

    /// Adds a data set returned when the SQL contains `pattern` (case-insensitive).
    ///
    /// Data sets are matched in insertion order; an empty pattern matches anything.
    pub fn with_dataset(
        mut self,
        pattern: impl Into<String>,
        columns: Vec<ColumnInfo>,
        rows: Vec<Row>,
    ) -> Self {
        self.datasets.push(Dataset {
            pattern: pattern.into().to_lowercase(),
            columns,
            rows,
        });
        self
    }

    /// Adds a catch-all data set.
    pub fn with_rows(self, columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        self.with_dataset("", columns, rows)
    }

    /// Queues outcomes consumed one per submitted statement.
    pub fn with_script(self, outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        {
            let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
            script.extend(outcomes);
        }
        self
    }

    /// Sets how long a [`MockOutcome::Hang`] fetch sleeps.
    pub fn with_hang(mut self, hang: Duration) -> Self {
        self.hang = hang;
        self
    }

    /// Reports remote cancellation as unsupported.
    pub fn without_cancellation(mut self) -> Self {
        self.cancellable = false;
        self
    }

    /// Appends an outcome to the script.
    pub fn push_outcome(&self, outcome: MockOutcome) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
    }

    /// Number of statements submitted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of cancel calls received.
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    /// Every statement submitted, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn dataset_for(&self, sql: &str) -> MockOutcome {
        let lowered = sql.to_lowercase();
        self.datasets
            .iter()
            .find(|d| lowered.contains(&d.pattern))
            .map(|d| MockOutcome::Rows {
                columns: d.columns.clone(),
                rows: d.rows.clone(),
            })
            .unwrap_or_else(|| MockOutcome::Rows {
                columns: vec![ColumnInfo::new("result", "varchar")],
                rows: vec![vec![Value::String(format!("Mock result for: {}", sql))]],
            })
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryEngine for MockEngine {
    async fn submit(&self, sql: &str) -> Result<QueryHandle> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sql.to_string());

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let outcome = scripted.unwrap_or_else(|| self.dataset_for(sql));

        let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), outcome);

        Ok(QueryHandle::new(id, sql))
    }

    async fn fetch(&self, handle: &QueryHandle, max_rows: usize) -> Result<EngineOutput> {
        let outcome = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle.id)
            .ok_or_else(|| TripSqlError::internal(format!("unknown query {}", handle.id)))?;

        match outcome {
            MockOutcome::Rows { columns, rows } => Ok(EngineOutput::capped(columns, rows, max_rows)),
            MockOutcome::Transient(msg) => Err(TripSqlError::transient(msg)),
            MockOutcome::Rejected(msg) => Err(TripSqlError::execution_rejected(msg)),
            MockOutcome::Hang => {
                tokio::time::sleep(self.hang).await;
                Err(TripSqlError::transient("mock query hung"))
            }
        }
    }

    async fn cancel(&self, handle: &QueryHandle) -> Result<()> {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle.id);
        Ok(())
    }

    fn supports_cancellation(&self) -> bool {
        self.cancellable
    }
}

fn hourly_columns() -> Vec<ColumnInfo> {
    vec![
        ColumnInfo::new("pickup_hr", "bigint"),
        ColumnInfo::new("trips", "bigint"),
        ColumnInfo::new("revenue", "double"),
    ]
}

/// Hourly Manhattan pickups for 2024-08-01.
fn manhattan_hourly_rows() -> Vec<Row> {
    const TRIPS: [i64; 24] = [
        820, 540, 360, 240, 210, 330, 980, 2100, 3050, 3120, 3000, 3150, 3300, 3280, 3400, 3550,
        3610, 3900, 4200, 4050, 3700, 3400, 2900, 1800,
    ];
    TRIPS
        .iter()
        .enumerate()
        .map(|(hour, trips)| {
            let revenue = (*trips as f64 * 2_140.0).round() / 100.0;
            vec![
                Value::Int(hour as i64),
                Value::Int(*trips),
                Value::Float(revenue),
            ]
        })
        .collect()
}

fn borough_tip_columns() -> Vec<ColumnInfo> {
    vec![
        ColumnInfo::new("pickup_borough", "varchar"),
        ColumnInfo::new("avg_tip_pct", "double"),
    ]
}

fn borough_tip_rows() -> Vec<Row> {
    [
        ("Manhattan", 0.182),
        ("Brooklyn", 0.161),
        ("Queens", 0.149),
        ("Bronx", 0.097),
        ("Staten Island", 0.088),
    ]
    .into_iter()
    .map(|(borough, pct)| vec![Value::from(borough), Value::Float(pct)])
    .collect()
}
