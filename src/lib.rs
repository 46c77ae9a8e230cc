//! Client for a long-polling tabular-query HTTP service.
//!
//! A [`Session`] submits queries over HTTPS and streams results back in
//! batches through a synchronous, pull-based [`Cursor`]: the next batch is
//! prefetched in the background while the caller consumes the current one,
//! and server-side query state is released on close when the stream was not
//! drained. TLS trust is established per session from certificate
//! fingerprints, a PEM trust store, or explicit insecure mode.
//!
//! ```no_run
//! use querynode_client::{Session, SessionConfig, TlsOptions};
//!
//! # fn main() -> querynode_client::Result<()> {
//! let config = SessionConfig {
//!     host: "lmi.example.com".into(),
//!     username: "admin".into(),
//!     password: "secret".into(),
//!     tls: TlsOptions {
//!         accepted_certificate_fingerprints: Some("SHA-256:AB:0F:11:22".into()),
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//!
//! let session = Session::connect(config)?;
//! let mut prepared = session.prepare("SELECT * WHERE x = ?");
//! prepared.bind(1, 5)?;
//! let mut cursor = prepared.execute()?;
//! while cursor.advance()? {
//!     println!("{:?}", cursor.row());
//! }
//! cursor.close()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod cursor;
mod error;
mod models;
mod params;
mod pool;
mod session;
mod tls;

pub use config::{SessionConfig, TlsOptions};
pub use cursor::Cursor;
pub use error::{Error, Result};
pub use models::{Column, ColumnType, QueryMetadata, Row, ServerInfo};
pub use params::{Template, Value};
pub use session::{PreparedQuery, Session};
