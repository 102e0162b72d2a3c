//! Server-side prepared statements.

use std::io::Read;

use crate::bind::{BindSet, ToBind};
use crate::client::StatementResult;
use crate::connection::Connection;
use crate::error::{LastError, MariaResult};
use crate::protocol::ColumnDef;
use crate::result_set::ResultSet;
use crate::types::{DateTime, Decimal, FieldType, Time, TimeKind};

/// A prepared statement bound to the session it was prepared on.
///
/// Parameters are positional and keep their values between executions, so a
/// statement can be re-run after changing only some of them. The server-side
/// statement is closed on drop.
pub struct Statement {
    conn: Connection,
    id: u32,
    sql: String,
    params: BindSet,
    columns: Vec<ColumnDef>,
    generation: u64,
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("id", &self.id)
            .field("sql", &self.sql)
            .field("params", &self.params.len())
            .finish()
    }
}

impl Statement {
    /// Prepare `sql` on `conn`. Fails regardless of the error policy since
    /// there is no neutral statement to hand back.
    pub(crate) fn prepare(conn: Connection, sql: &str) -> MariaResult<Self> {
        tracing::debug!(sql = %sql, "prepare");
        let (info, generation) = conn.run_strict(|client, generation| {
            client.prepare(sql).map(|info| (info, generation))
        })?;
        Ok(Self {
            conn,
            id: info.id,
            sql: sql.to_string(),
            params: BindSet::new(info.params),
            columns: info.columns,
            generation,
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn last_error(&self) -> Option<LastError> {
        self.conn.last_error()
    }

    // ==================== Parameters ====================

    /// Bind any [`ToBind`] value to parameter `index`.
    pub fn set<T: ToBind + ?Sized>(&mut self, index: usize, value: &T) -> MariaResult<()> {
        value.to_bind(self.params.get_mut(index)?);
        Ok(())
    }

    pub fn set_null(&mut self, index: usize) -> MariaResult<()> {
        self.params.get_mut(index)?.set_null();
        Ok(())
    }

    /// Read `reader` to the end and bind the bytes as a blob.
    pub fn set_blob(&mut self, index: usize, mut reader: impl Read) -> MariaResult<()> {
        let bind = self.params.get_mut(index)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        bind.set_bytes(FieldType::Blob, &data);
        Ok(())
    }

    pub fn set_data(&mut self, index: usize, data: &[u8]) -> MariaResult<()> {
        self.set(index, data)
    }

    /// Bind only the date part of `value`.
    pub fn set_date(&mut self, index: usize, value: &DateTime) -> MariaResult<()> {
        let mut native = value.native_time();
        native.hour = 0;
        native.minute = 0;
        native.second = 0;
        native.second_part = 0;
        native.kind = TimeKind::Date;
        self.params.get_mut(index)?.set_time(FieldType::Date, native);
        Ok(())
    }

    pub fn set_date_time(&mut self, index: usize, value: &DateTime) -> MariaResult<()> {
        self.set(index, value)
    }

    pub fn set_time(&mut self, index: usize, value: &Time) -> MariaResult<()> {
        self.set(index, value)
    }

    pub fn set_decimal(&mut self, index: usize, value: &Decimal) -> MariaResult<()> {
        self.set(index, value)
    }

    pub fn set_string(&mut self, index: usize, value: &str) -> MariaResult<()> {
        self.set(index, value)
    }

    pub fn set_boolean(&mut self, index: usize, value: bool) -> MariaResult<()> {
        self.set(index, &value)
    }

    pub fn set_unsigned8(&mut self, index: usize, value: u8) -> MariaResult<()> {
        self.set(index, &value)
    }

    pub fn set_signed8(&mut self, index: usize, value: i8) -> MariaResult<()> {
        self.set(index, &value)
    }

    pub fn set_unsigned16(&mut self, index: usize, value: u16) -> MariaResult<()> {
        self.set(index, &value)
    }

    pub fn set_signed16(&mut self, index: usize, value: i16) -> MariaResult<()> {
        self.set(index, &value)
    }

    pub fn set_unsigned32(&mut self, index: usize, value: u32) -> MariaResult<()> {
        self.set(index, &value)
    }

    pub fn set_signed32(&mut self, index: usize, value: i32) -> MariaResult<()> {
        self.set(index, &value)
    }

    pub fn set_unsigned64(&mut self, index: usize, value: u64) -> MariaResult<()> {
        self.set(index, &value)
    }

    pub fn set_signed64(&mut self, index: usize, value: i64) -> MariaResult<()> {
        self.set(index, &value)
    }

    pub fn set_float(&mut self, index: usize, value: f32) -> MariaResult<()> {
        self.set(index, &value)
    }

    pub fn set_double(&mut self, index: usize, value: f64) -> MariaResult<()> {
        self.set(index, &value)
    }

    // ==================== Execution ====================

    fn run(&self) -> MariaResult<Option<StatementResult>> {
        tracing::debug!(id = self.id, sql = %self.sql, "execute statement");
        let (id, params) = (self.id, &self.params);
        self.conn
            .run_in(self.generation, None, |client| client.execute(id, params).map(Some))
    }

    /// Execute and return the affected row count, or the row count for a
    /// row-producing statement.
    pub fn execute(&self) -> MariaResult<u64> {
        Ok(match self.run()? {
            Some(StatementResult::Done(ok)) => ok.affected_rows,
            Some(StatementResult::Rows { packets, .. }) => packets.len() as u64,
            None => 0,
        })
    }

    pub fn insert(&self) -> MariaResult<u64> {
        Ok(match self.run()? {
            Some(StatementResult::Done(ok)) => ok.last_insert_id,
            _ => 0,
        })
    }

    pub fn query(&self) -> MariaResult<ResultSet> {
        Ok(match self.run()? {
            Some(StatementResult::Rows { columns, packets }) => {
                let columns = if columns.is_empty() {
                    self.columns.clone()
                } else {
                    columns
                };
                ResultSet::from_binary(columns, packets)
            }
            _ => ResultSet::empty(),
        })
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        let id = self.id;
        self.conn
            .quietly_in(self.generation, |client| client.close_statement(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::OkStatus;
    use crate::client::mock::MockServer;
    use crate::config::Account;
    use crate::error::{ErrorPolicy, MariaError};
    use crate::protocol::binary::tests::row_packet;

    fn connection(server: &MockServer) -> Connection {
        Connection::with_connector(Account::default(), server.connector())
    }

    #[test]
    fn test_prepare_sizes_params() {
        let server = MockServer::new();
        let conn = connection(&server);
        let stmt = conn.create_statement("INSERT INTO t VALUES (?, ?, ?)").unwrap();
        assert_eq!(stmt.param_count(), 3);
        assert_eq!(stmt.sql(), "INSERT INTO t VALUES (?, ?, ?)");
    }

    #[test]
    fn test_bind_and_execute() {
        let server = MockServer::new();
        let conn = connection(&server);
        let mut stmt = conn
            .create_statement("INSERT INTO t VALUES (?, ?, ?, ?, ?, ?)")
            .unwrap();
        stmt.set_signed32(0, -5).unwrap();
        stmt.set_unsigned64(1, 18).unwrap();
        stmt.set_string(2, "abc").unwrap();
        stmt.set_null(3).unwrap();
        stmt.set_decimal(4, &"12.50".parse().unwrap()).unwrap();
        stmt.set_date(5, &DateTime::new(1990, 4, 1, 13, 5, 0, 0).unwrap())
            .unwrap();
        assert_eq!(stmt.execute().unwrap(), 1);

        let log = server.log();
        assert_eq!(
            log.last().map(String::as_str),
            Some("EXECUTE 1 [-5, 18, 'abc', NULL, '12.50', 1990-04-01 00:00:00.000]")
        );
    }

    #[test]
    fn test_rebinding_keeps_other_params() {
        let server = MockServer::new();
        let conn = connection(&server);
        let mut stmt = conn.create_statement("UPDATE t SET a = ? WHERE id = ?").unwrap();
        stmt.set_double(0, 1.5).unwrap();
        stmt.set_unsigned32(1, 7).unwrap();
        stmt.execute().unwrap();
        stmt.set_unsigned32(1, 8).unwrap();
        stmt.execute().unwrap();

        let executes: Vec<String> = server
            .log()
            .into_iter()
            .filter(|l| l.starts_with("EXECUTE"))
            .collect();
        assert_eq!(executes, vec!["EXECUTE 1 [1.5, 7]", "EXECUTE 1 [1.5, 8]"]);
    }

    #[test]
    fn test_bad_index_is_out_of_range() {
        let server = MockServer::new();
        let conn = connection(&server);
        let mut stmt = conn.create_statement("SELECT ?").unwrap();
        let err = stmt.set_boolean(1, true).unwrap_err();
        assert!(matches!(err, MariaError::OutOfRange { index: 1, count: 1 }));
    }

    #[test]
    fn test_set_blob_reads_everything() {
        let server = MockServer::new();
        let conn = connection(&server);
        let mut stmt = conn.create_statement("INSERT INTO files VALUES (?)").unwrap();
        stmt.set_blob(0, std::io::Cursor::new(b"file body".to_vec()))
            .unwrap();
        stmt.execute().unwrap();
        assert_eq!(
            server.log().last().map(String::as_str),
            Some("EXECUTE 1 ['file body']")
        );
    }

    #[test]
    fn test_insert_returns_id() {
        let server = MockServer::new();
        let id = server.on_prepare("INSERT INTO t VALUES (?)", 1, Vec::new());
        server.on_execute(
            id,
            StatementResult::Done(OkStatus {
                affected_rows: 1,
                last_insert_id: 99,
                ..OkStatus::default()
            }),
        );
        let conn = connection(&server);
        let mut stmt = conn.create_statement("INSERT INTO t VALUES (?)").unwrap();
        stmt.set(0, "x").unwrap();
        assert_eq!(stmt.insert().unwrap(), 99);
    }

    #[test]
    fn test_query_decodes_binary_rows() {
        let server = MockServer::new();
        let columns = vec![
            ColumnDef::new("id", FieldType::Long),
            ColumnDef::new("name", FieldType::VarString),
        ];
        let id = server.on_prepare("SELECT id, name FROM t WHERE id > ?", 1, columns.clone());
        let one = 1i32.to_le_bytes();
        let two = 2i32.to_le_bytes();
        server.on_execute(
            id,
            StatementResult::Rows {
                columns,
                packets: vec![
                    row_packet(&[Some(&one[..]), Some(&b"\x03ann"[..])]),
                    row_packet(&[Some(&two[..]), None]),
                ],
            },
        );

        let conn = connection(&server);
        let mut stmt = conn.create_statement("SELECT id, name FROM t WHERE id > ?").unwrap();
        stmt.set_signed32(0, 0).unwrap();
        let mut rs = stmt.query().unwrap();
        assert_eq!(rs.row_count(), 2);
        assert!(rs.next().unwrap());
        assert_eq!(rs.get_signed32("id").unwrap(), 1);
        assert_eq!(rs.get_string("name").unwrap(), "ann");
        assert!(rs.next().unwrap());
        assert!(rs.is_null("name").unwrap());
        assert!(!rs.next().unwrap());
    }

    #[test]
    fn test_drop_closes_statement() {
        let server = MockServer::new();
        let conn = connection(&server);
        drop(conn.create_statement("SELECT 1").unwrap());
        assert_eq!(server.log(), vec!["PREPARE SELECT 1", "CLOSE 1"]);
    }

    #[test]
    fn test_stale_after_reconnect() {
        let server = MockServer::new();
        let conn = connection(&server);
        let stmt = conn.create_statement("SELECT 1").unwrap();
        conn.disconnect();
        conn.connect().unwrap();
        assert!(matches!(stmt.execute(), Err(MariaError::NotConnected)));
        drop(stmt);
        assert!(!server.log().iter().any(|l| l.starts_with("CLOSE")));
    }

    #[test]
    fn test_prepare_fails_under_both_postures() {
        let server = MockServer::new();
        server.fail_prepare("SELEC ?", 1064, "syntax error");

        let raising = connection(&server);
        assert!(matches!(
            raising.create_statement("SELEC ?"),
            Err(MariaError::Connection { code: 1064, .. })
        ));

        let quiet = Connection::with_connector(
            Account::default().errors(ErrorPolicy {
                log: false,
                raise: false,
            }),
            server.connector(),
        );
        assert!(matches!(
            quiet.create_statement("SELEC ?"),
            Err(MariaError::Connection { code: 1064, .. })
        ));
        assert_eq!(quiet.last_error().map(|e| e.code), Some(1064));
    }

    #[test]
    fn test_execute_failure_without_raise() {
        let server = MockServer::new();
        let id = server.on_prepare("DELETE FROM t WHERE id = ?", 1, Vec::new());
        server.fail_execute(id, 1451, "foreign key constraint fails");
        let conn = Connection::with_connector(
            Account::default().errors(ErrorPolicy {
                log: false,
                raise: false,
            }),
            server.connector(),
        );
        let mut stmt = conn.create_statement("DELETE FROM t WHERE id = ?").unwrap();
        stmt.set_signed64(0, 1).unwrap();
        assert_eq!(stmt.execute().unwrap(), 0);
        assert_eq!(stmt.last_error().map(|e| e.code), Some(1451));
    }
}
