//! The execution seam.
//!
//! Generated routines never talk to a database directly; they render SQL and
//! hand it to a [`Connection`] supplied by the execution layer. All operations
//! integrate with asupersync's structured concurrency via a `Cx` context, so
//! cancellation and timeouts are the execution layer's concern and surface as
//! `Outcome::Cancelled` / `Outcome::Err`.

use crate::identifiers::Dialect;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};

/// A database connection capable of executing generated statements.
///
/// Implementations must be `Send + Sync` for use across async boundaries.
///
/// ```rust,ignore
/// let rows = conn.query(&cx, "SELECT * FROM customers WHERE id = $1", &[Value::BigInt(1)]).await;
/// ```
pub trait Connection: Send + Sync {
    /// Dialect used to render statements for this connection.
    fn dialect(&self) -> Dialect;

    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute a statement (INSERT, UPDATE, DELETE, DDL) and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Execute an INSERT and return the generated key.
    ///
    /// For PostgreSQL this typically uses `RETURNING`; the exact behavior
    /// depends on the driver implementation.
    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, crate::Error>> + Send;
}
