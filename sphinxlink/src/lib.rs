//! Sphinx/Manticore SphinxQL bridge
//!
//! Named connections to `searchd` over its MySQL wire protocol, with results materialized
//! into typed rows.
//!
//! # Examples
//!
//! Named connection:
//!
//! ```no_run
//! use sphinxlink::{FieldType, RowShape, SphinxLink};
//!
//! # async fn app() -> sphinxlink::Result<()> {
//! let link = SphinxLink::from_env()?;
//! link.connect("main", "127.0.0.1", 9306, "", "", "").await?;
//!
//! let shape = RowShape::from([FieldType::BigInt, FieldType::Text]);
//! let rows = link
//!     .query("main", "SELECT id, title FROM articles WHERE MATCH(?) LIMIT 10")
//!     .matching("rust async")
//!     .fetch::<(i64, String)>(&shape)
//!     .await?;
//!
//! for (id, title) in rows {
//!     println!("{id}: {title}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Single connection:
//!
//! ```no_run
//! use sphinxlink::{Connection, RowShape};
//!
//! # async fn app() -> sphinxlink::Result<()> {
//! let mut conn = Connection::connect_env().await?;
//!
//! let set = sphinxlink::query("SHOW TABLES", &mut conn)
//!     .fetch_all(&RowShape::text(2))
//!     .await?;
//!
//! assert_eq!(set.columns().len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod common;
mod net;
mod ext;

// Protocol
pub mod mysql;
mod stream;

// Component
pub mod encoding;
pub mod sql;
pub mod row;
pub mod types;

// Operation
pub mod transport;
pub mod executor;
pub mod fetch;
pub mod query;
pub mod meta;

// Connection
pub mod connection;
pub mod registry;
pub mod link;

mod error;

#[cfg(test)]
mod mock;

pub use row::{Decode, DecodeError, FieldType, FromRow, Row, RowSet, RowShape, Value};
pub use encoding::{Charset, Encoding};

pub use executor::Executor;
pub use connection::{Config, Connection};
pub use registry::{ConnectionInfo, Registry, Session, SessionStore, Target};
pub use meta::{MetaCursor, MetaRow};
pub use link::SphinxLink;
#[doc(inline)]
pub use query::{Interrupt, Text, query};
pub use error::{Error, ErrorKind, Result};

#[cfg(feature = "json")]
pub use types::Json;

#[cfg(feature = "macros")]
pub use sphinxlink_macros::FromRow;
