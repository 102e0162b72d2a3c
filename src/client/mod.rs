//! Native client boundary.
//!
//! Everything above this module talks to the server through
//! [`NativeClient`]. [`WireConnector`] opens the in-tree protocol client;
//! tests plug in a scripted one.

pub mod tls;
pub mod wire;

#[cfg(test)]
pub(crate) mod mock;

use crate::bind::BindSet;
use crate::config::Account;
use crate::error::MariaResult;
use crate::protocol::{ColumnDef, OkPacket};

/// Outcome of a statement that produced no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OkStatus {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub warnings: u16,
    pub status_flags: u16,
}

impl From<OkPacket> for OkStatus {
    fn from(ok: OkPacket) -> Self {
        Self {
            affected_rows: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            warnings: ok.warnings,
            status_flags: ok.status_flags,
        }
    }
}

/// Text-protocol rows. `None` cells are SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextRows {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Option<Vec<u8>>>>,
}

/// One result of a (possibly multi-statement) text query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    Done(OkStatus),
    Rows(TextRows),
}

/// Result of executing a prepared statement. Rows stay as raw binary packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementResult {
    Done(OkStatus),
    Rows {
        columns: Vec<ColumnDef>,
        packets: Vec<Vec<u8>>,
    },
}

/// Server-side statement created by COM_STMT_PREPARE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedInfo {
    pub id: u32,
    pub params: usize,
    pub columns: Vec<ColumnDef>,
}

/// One open session. Not shared between threads without a lock.
pub trait NativeClient: Send {
    /// Run `sql` and drain every result it produces.
    fn query(&mut self, sql: &str) -> MariaResult<Vec<QueryResult>>;

    fn select_db(&mut self, schema: &str) -> MariaResult<()>;

    fn prepare(&mut self, sql: &str) -> MariaResult<PreparedInfo>;

    fn execute(&mut self, statement_id: u32, params: &BindSet) -> MariaResult<StatementResult>;

    fn close_statement(&mut self, statement_id: u32) -> MariaResult<()>;

    fn ping(&mut self) -> MariaResult<()>;

    fn server_version(&self) -> &str;

    /// Say goodbye and drop the transport. Errors are ignored.
    fn close(&mut self);
}

/// Opens sessions for an account.
pub trait Connector: Send + Sync {
    fn connect(&self, account: &Account) -> MariaResult<Box<dyn NativeClient>>;
}

/// Connects with the built-in protocol client.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireConnector;

impl Connector for WireConnector {
    fn connect(&self, account: &Account) -> MariaResult<Box<dyn NativeClient>> {
        Ok(Box::new(wire::WireClient::connect(account)?))
    }
}
