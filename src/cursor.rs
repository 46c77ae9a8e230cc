//! Streaming cursor over one query's results.
//!
//! The cursor pulls batches of rows from the query node via long-polling
//! fetch tasks and prefetches the next batch while the caller consumes the
//! current one. At most one fetch task is in flight per cursor; batches are
//! installed strictly in the order fetched.

use crate::error::{Error, Result};
use crate::models::{Column, QueryMetadata, ResultsPage, Row};
use crate::pool::TaskHandle;
use crate::session::SessionInner;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Consecutive fetch-task failures tolerated before the cursor refuses
/// further network attempts for this query.
const MAX_FETCH_FAILURES: u32 = 3;

/// Outcome of one fetch task: the rows of a batch, whether the server
/// signaled end-of-results, and any warnings attached to the page.
#[derive(Debug, Clone)]
pub(crate) struct Batch {
    rows: Vec<Row>,
    end_of_results: bool,
    warnings: Vec<String>,
}

/// Forward-only cursor over a query's result stream.
///
/// Drive it with [`advance`](Cursor::advance); after a successful advance
/// the current row is available through [`row`](Cursor::row) and the value
/// accessors. Dropping the cursor releases server-side query state if the
/// stream was not drained.
#[derive(Debug)]
pub struct Cursor {
    session: Arc<SessionInner>,
    query_id: String,
    columns: Vec<Column>,
    /// Lowercased column name to 0-based index; first occurrence wins.
    field_map: HashMap<String, usize>,
    buffer: Vec<Row>,
    /// 1-based position of the current row within `buffer`; 0 before the
    /// first row of a batch is served.
    pos: usize,
    pending: Option<TaskHandle<Result<Batch>>>,
    end_reached: bool,
    fetch_failures: u32,
    broken: Option<Error>,
    warnings: Vec<String>,
    closed: bool,
}

impl Cursor {
    pub(crate) fn new(session: Arc<SessionInner>, metadata: QueryMetadata) -> Result<Self> {
        let mut field_map = HashMap::with_capacity(metadata.columns.len());
        for (i, column) in metadata.columns.iter().enumerate() {
            field_map.entry(column.name.to_lowercase()).or_insert(i);
        }
        let mut cursor = Self {
            session,
            query_id: metadata.query_id,
            columns: metadata.columns,
            field_map,
            buffer: Vec::new(),
            pos: 0,
            pending: None,
            end_reached: false,
            fetch_failures: 0,
            broken: None,
            warnings: Vec::new(),
            closed: false,
        };
        // start pulling the first batch right away
        cursor.pending = Some(cursor.spawn_fetch()?);
        Ok(cursor)
    }

    /// The server-assigned query identifier this cursor is reading.
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// The column schema, fixed for the lifetime of the query.
    pub fn schema(&self) -> &[Column] {
        &self.columns
    }

    /// Warnings reported by the server so far on this result stream.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn clear_warnings(&mut self) {
        self.warnings.clear();
    }

    /// Move to the next row. Returns `false` once the stream is exhausted;
    /// afterwards no further network activity occurs.
    ///
    /// A fetch failure is returned as an error and may be retried with
    /// another `advance()` call, up to a small cap of consecutive failures.
    pub fn advance(&mut self) -> Result<bool> {
        if self.closed {
            return Err(Error::CursorClosed);
        }

        if self.pos < self.buffer.len() {
            // still rows in the current batch; overlap the next fetch with
            // consumption
            if !self.end_reached && self.broken.is_none() && self.pending.is_none() {
                self.pending = Some(self.spawn_fetch()?);
            }
            self.pos += 1;
            return Ok(true);
        }

        if self.end_reached {
            return Ok(false);
        }

        if let Some(err) = &self.broken {
            return Err(err.clone());
        }

        let task = match self.pending.take() {
            Some(task) => task,
            // the previous fetch failed and was discarded; start fresh
            None => self.spawn_fetch()?,
        };

        let batch = match task.wait() {
            Ok(Ok(batch)) => batch,
            Ok(Err(err)) => return Err(self.note_fetch_failure(err)),
            Err(err) => return Err(self.note_fetch_failure(err)),
        };
        self.fetch_failures = 0;

        if batch.end_of_results {
            debug!(query_id = %self.query_id, "server signaled end of results");
            self.end_reached = true;
        }
        self.warnings.extend(batch.warnings);

        self.buffer = batch.rows;
        self.pos = 0;
        if self.buffer.is_empty() {
            // only happens when the continuation flag was false
            return Ok(false);
        }
        self.pos = 1;
        Ok(true)
    }

    /// The current row, if positioned on one.
    pub fn row(&self) -> Option<&[Option<String>]> {
        if self.pos >= 1 && self.pos <= self.buffer.len() {
            Some(&self.buffer[self.pos - 1])
        } else {
            None
        }
    }

    /// Value of the given column (0-based) in the current row. `Ok(None)`
    /// is a server-side null.
    pub fn value(&self, column: usize) -> Result<Option<&str>> {
        let row = self
            .row()
            .ok_or_else(|| Error::Usage("not on a valid row".into()))?;
        let cell = row
            .get(column)
            .ok_or_else(|| Error::Usage(format!("invalid column index: {column}")))?;
        Ok(cell.as_deref())
    }

    /// Value of the named column (case-insensitive) in the current row.
    pub fn value_named(&self, label: &str) -> Result<Option<&str>> {
        let index = self
            .field_map
            .get(&label.to_lowercase())
            .copied()
            .ok_or_else(|| Error::Usage(format!("invalid column label: {label}")))?;
        self.value(index)
    }

    /// Close the cursor, releasing server-side query state unless the
    /// server already signaled exhaustion (it frees completed queries
    /// itself). A teardown failure is reported but the cursor stays closed.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // an in-flight prefetch references server-side read state; wait for
        // it before releasing the query
        if let Some(task) = self.pending.take() {
            if let Ok(Ok(batch)) = task.wait() {
                if batch.end_of_results {
                    self.end_reached = true;
                }
            }
        }

        if self.end_reached {
            return Ok(());
        }
        if self.session.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let client = self.session.client.clone();
        let query_id = self.query_id.clone();
        let task = self
            .session
            .pool
            .submit(async move { client.release_query(&query_id).await })?;
        task.wait()?
    }

    fn note_fetch_failure(&mut self, err: Error) -> Error {
        self.fetch_failures += 1;
        if self.fetch_failures >= MAX_FETCH_FAILURES {
            warn!(
                query_id = %self.query_id,
                failures = self.fetch_failures,
                "giving up on fetches for this query"
            );
            self.broken = Some(err.clone());
        }
        err
    }

    fn spawn_fetch(&self) -> Result<TaskHandle<Result<Batch>>> {
        let client = self.session.client.clone();
        let query_id = self.query_id.clone();
        let size = self.session.config.batch_size;
        let period_millis = self.session.config.polling_period_millis;
        let budget_millis = self.session.config.polling_timeout().as_millis() as i64;
        self.session.pool.submit(async move {
            fetch_batch(&client, &query_id, size, period_millis, budget_millis).await
        })
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.close() {
                warn!(query_id = %self.query_id, error = %err, "failed to release query on drop");
            }
        }
    }
}

/// One fetch task: long-poll until the server returns rows, signals
/// end-of-results, or the local retry budget runs out.
async fn fetch_batch(
    client: &crate::client::QueryNodeClient,
    query_id: &str,
    size: u32,
    period_millis: u64,
    budget_millis: i64,
) -> Result<Batch> {
    let mut time_left = budget_millis;
    loop {
        if time_left <= 0 {
            return Err(Error::PollTimeout);
        }

        let page = client.fetch_page(query_id, size, period_millis).await?;

        if page.rows.is_empty() && page.has_more {
            // the query has not produced rows within the server-side wait;
            // retry in place against the local budget
            time_left -= period_millis as i64;
            debug!(query_id, time_left, "no rows yet, retrying long poll");
            continue;
        }

        return Ok(Batch {
            end_of_results: !page.has_more,
            warnings: collect_warnings(&page),
            rows: page.rows,
        });
    }
}

/// Entries marked `WARNING` are surfaced on the cursor; anything else is
/// only logged.
fn collect_warnings(page: &ResultsPage) -> Vec<String> {
    let mut warnings = Vec::new();
    for entry in &page.errors_or_warnings {
        if entry.severity == "WARNING" {
            warnings.push(entry.text.clone());
        } else {
            debug!(severity = %entry.severity, text = %entry.text, "diagnostic entry");
        }
    }
    warnings
}
