//! Session layer: the synchronous public API over the async transport.

use crate::client::QueryNodeClient;
use crate::config::SessionConfig;
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::params::{Template, Value};
use crate::pool::WorkerPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared per-session state handed to cursors and prepared queries.
#[derive(Debug)]
pub(crate) struct SessionInner {
    pub(crate) config: SessionConfig,
    pub(crate) client: Arc<QueryNodeClient>,
    pub(crate) pool: WorkerPool,
    pub(crate) closed: AtomicBool,
}

/// A session against one query node.
///
/// Owns the transport (with its resolved TLS trust policy) and a worker
/// pool for background network tasks. Created once at connect time and
/// immutable afterwards, apart from closing.
#[derive(Debug)]
pub struct Session {
    inner: Arc<SessionInner>,
    server_version: String,
}

impl Session {
    /// Connect to the query node described by `config`.
    ///
    /// Resolves the TLS trust policy, starts the worker pool, and probes
    /// the server's configuration endpoint so that bad credentials or an
    /// unreachable host fail here rather than on the first query.
    pub fn connect(config: SessionConfig) -> Result<Self> {
        let client = Arc::new(QueryNodeClient::new(&config)?);
        let pool = WorkerPool::new(config.concurrent_statements)?;
        let inner = Arc::new(SessionInner {
            config,
            client,
            pool,
            closed: AtomicBool::new(false),
        });

        let probe = {
            let client = inner.client.clone();
            inner
                .pool
                .submit(async move { client.server_configuration().await })?
        };
        let server = probe.wait()??;
        info!(
            host = %inner.config.host,
            version = %server.build_version,
            "connected to query node"
        );

        Ok(Self {
            inner,
            server_version: server.build_version,
        })
    }

    /// Build version reported by the server at connect time.
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Submit a query and return a cursor over its results.
    pub fn execute(&self, query: &str) -> Result<Cursor> {
        execute_on(&self.inner, query)
    }

    /// Prepare a query template with positional `?` placeholders, bound to
    /// this session.
    pub fn prepare(&self, template: impl Into<String>) -> PreparedQuery {
        PreparedQuery {
            inner: self.inner.clone(),
            template: Template::new(template),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Close the session. Blocks until every submitted task has signaled
    /// completion, then shuts the worker pool down.
    pub fn close(&mut self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.pool.shutdown();
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close session");
        }
    }
}

fn execute_on(inner: &Arc<SessionInner>, query: &str) -> Result<Cursor> {
    if inner.closed.load(Ordering::SeqCst) {
        return Err(Error::SessionClosed);
    }

    let client = inner.client.clone();
    let query = query.to_string();
    let time_to_live = inner.config.query_time_to_live_secs;
    let task = inner
        .pool
        .submit(async move { client.submit_query(&query, time_to_live).await })?;

    let metadata = task.wait()??;
    Cursor::new(inner.clone(), metadata)
}

/// A query template bound to a session.
///
/// Placeholders are substituted client-side into literal query text; the
/// server never sees the template form. All placeholders must be bound
/// before [`execute`](PreparedQuery::execute), which verifies bindings
/// before any network call.
pub struct PreparedQuery {
    inner: Arc<SessionInner>,
    template: Template,
}

impl PreparedQuery {
    /// Bind a value to the placeholder at `ordinal` (1-based, in order of
    /// appearance).
    pub fn bind(&mut self, ordinal: usize, value: impl Into<Value>) -> Result<()> {
        self.template.bind(ordinal, value)
    }

    pub fn clear_bindings(&mut self) {
        self.template.clear_bindings();
    }

    pub fn parameter_count(&self) -> usize {
        self.template.parameter_count()
    }

    /// Substitute all bindings and submit the resulting query.
    pub fn execute(&self) -> Result<Cursor> {
        let query = self.template.render()?;
        execute_on(&self.inner, &query)
    }
}
