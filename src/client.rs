use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::models::{CreateQueryRequest, QueryErrorBody, QueryMetadata, ResultsPage, ServerInfo};
use crate::tls;
use reqwest::{Client, StatusCode};
use tracing::debug;

/// Low-level query-node client that directly calls the REST endpoints.
///
/// One instance per session; the TLS trust policy is resolved once here and
/// baked into the underlying connection pool.
#[derive(Debug)]
pub(crate) struct QueryNodeClient {
    base_url: String,
    query_url: String,
    username: String,
    password: String,
    http_client: Client,
}

impl QueryNodeClient {
    /// Creates a new client from the session configuration, resolving the
    /// TLS trust policy and sizing the connection pool.
    pub(crate) fn new(config: &SessionConfig) -> Result<Self> {
        let base_url = config.base_url();
        let query_url = format!("{base_url}/api/v2/query");

        let mut builder = Client::builder()
            .timeout(config.network_timeout())
            .connect_timeout(config.network_timeout())
            .pool_max_idle_per_host(config.concurrent_statements);

        if config.use_tls {
            let tls_config = tls::build_client_config(&config.tls)?;
            builder = builder.use_preconfigured_tls(tls_config);
        }

        let http_client = builder
            .build()
            .map_err(|e| Error::Config(format!("cannot initialize http client: {e}")))?;

        Ok(Self {
            base_url,
            query_url,
            username: config.username.clone(),
            password: config.password.clone(),
            http_client,
        })
    }

    /// POST `/api/v2/query`
    /// Submit a query; on success the server assigns a query identifier and
    /// reports the column schema.
    pub(crate) async fn submit_query(
        &self,
        query: &str,
        time_to_live_secs: u64,
    ) -> Result<QueryMetadata> {
        let request = CreateQueryRequest {
            query,
            cached: false,
            time_to_live: time_to_live_secs,
        };
        debug!(url = %self.query_url, "submitting query");

        let resp = self
            .http_client
            .post(&self.query_url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if status == StatusCode::OK {
            let metadata: QueryMetadata = serde_json::from_str(&body)
                .map_err(|e| Error::Transport(format!("JSON parse error: {e}")))?;
            debug!(query_id = %metadata.query_id, columns = metadata.columns.len(), "query accepted");
            return Ok(metadata);
        }
        if status == StatusCode::BAD_REQUEST {
            // structured error body, or the raw text when it is not even that
            return Err(match serde_json::from_str::<QueryErrorBody>(&body) {
                Ok(err) => Error::Query {
                    message: err.message,
                    details: err.details,
                },
                Err(_) => Error::Query {
                    message: body,
                    details: None,
                },
            });
        }
        Err(Error::Transport(format!(
            "could not submit query to {}: HTTP {status}",
            self.query_url
        )))
    }

    /// GET `/api/v2/query/{queryId}/results?size=&longPollTimeout=`
    /// One long-poll exchange for the next batch of rows. The server may
    /// hold the request open up to `long_poll_timeout_millis`.
    pub(crate) async fn fetch_page(
        &self,
        query_id: &str,
        size: u32,
        long_poll_timeout_millis: u64,
    ) -> Result<ResultsPage> {
        let url = format!(
            "{}/{}/results?size={}&longPollTimeout={}",
            self.query_url, query_id, size, long_poll_timeout_millis
        );
        debug!(%url, "fetching results");

        let resp = self
            .http_client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(Error::Transport(format!(
                "bad response from query node: HTTP {status}"
            )));
        }
        let page = resp
            .json::<ResultsPage>()
            .await
            .map_err(|e| Error::Transport(format!("JSON parse error: {e}")))?;
        debug!(
            rows = page.rows.len(),
            has_more = page.has_more,
            "received results page"
        );
        Ok(page)
    }

    /// DELETE `/api/v2/query/{queryId}`
    /// Release server-side query state. Needed only when the results were
    /// not drained to exhaustion.
    pub(crate) async fn release_query(&self, query_id: &str) -> Result<()> {
        let url = format!("{}/{}", self.query_url, query_id);
        debug!(%url, "releasing query");

        let resp = self
            .http_client
            .delete(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "failed to release query {query_id}: HTTP {status}"
            )));
        }
        Ok(())
    }

    /// GET `/api/v1/configuration`
    /// Connectivity probe run at session creation; also reports the server
    /// build version.
    pub(crate) async fn server_configuration(&self) -> Result<ServerInfo> {
        let url = format!("{}/api/v1/configuration", self.base_url);

        let resp = self
            .http_client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::AuthenticationFailed);
        }
        if status != StatusCode::OK {
            return Err(Error::Transport(format!("bad status code: HTTP {status}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Transport(format!("JSON parse error: {e}")))?;
        let build_version = body
            .pointer("/build/version")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(ServerInfo { build_version })
    }
}
