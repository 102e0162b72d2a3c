//! Explicit transactions and save points.
//!
//! A [`Transaction`] rolls back when dropped without [`commit`](Transaction::commit).
//! A [`SavePoint`] borrows its transaction, so the transaction cannot end
//! while a save point is still open; dropping an uncommitted save point rolls
//! back to it.

use std::cell::Cell;

use crate::connection::Connection;
use crate::error::MariaResult;
use crate::types::IsolationLevel;

#[derive(Debug)]
pub struct Transaction {
    conn: Connection,
    generation: u64,
    finished: bool,
    save_points: Cell<u32>,
}

impl Transaction {
    pub(crate) fn begin(
        conn: Connection,
        isolation: IsolationLevel,
        consistent_snapshot: bool,
    ) -> MariaResult<Self> {
        let start = if consistent_snapshot {
            "START TRANSACTION WITH CONSISTENT SNAPSHOT;"
        } else {
            "START TRANSACTION;"
        };
        tracing::debug!(isolation = ?isolation, consistent_snapshot, "begin transaction");
        let generation = conn.run_strict(|client, generation| {
            client.query(isolation.as_sql())?;
            client.query(start)?;
            Ok(generation)
        })?;
        Ok(Self {
            conn,
            generation,
            finished: false,
            save_points: Cell::new(0),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn commit(mut self) -> MariaResult<bool> {
        self.finish("COMMIT")
    }

    pub fn rollback(mut self) -> MariaResult<bool> {
        self.finish("ROLLBACK")
    }

    fn finish(&mut self, sql: &'static str) -> MariaResult<bool> {
        self.finished = true;
        tracing::debug!(sql, "end transaction");
        self.conn
            .run_in(self.generation, false, |client| client.query(sql).map(|_| true))
    }

    /// Open the next save point, named `SP1`, `SP2`, ... within this transaction.
    pub fn create_save_point(&self) -> MariaResult<SavePoint<'_>> {
        let n = self.save_points.get() + 1;
        self.save_points.set(n);
        let name = format!("SP{}", n);
        let sql = format!("SAVEPOINT {}", name);
        self.conn
            .run_in_strict(self.generation, |client| client.query(&sql).map(|_| ()))?;
        Ok(SavePoint {
            tx: self,
            name,
            done: false,
        })
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("rolling back unfinished transaction");
            self.conn
                .quietly_in(self.generation, |client| client.query("ROLLBACK").map(|_| ()));
        }
    }
}

#[derive(Debug)]
pub struct SavePoint<'t> {
    tx: &'t Transaction,
    name: String,
    done: bool,
}

impl SavePoint<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keep the work done since the save point.
    pub fn commit(mut self) -> MariaResult<bool> {
        self.done = true;
        let sql = format!("RELEASE SAVEPOINT {}", self.name);
        self.tx
            .conn
            .run_in(self.tx.generation, false, |client| client.query(&sql).map(|_| true))
    }
}

impl Drop for SavePoint<'_> {
    fn drop(&mut self) {
        if !self.done {
            let sql = format!("ROLLBACK TO SAVEPOINT {}", self.name);
            self.tx
                .conn
                .quietly_in(self.tx.generation, |client| client.query(&sql).map(|_| ()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockServer;
    use crate::config::Account;
    use crate::error::{ErrorPolicy, MariaError};

    fn connection(server: &MockServer) -> Connection {
        Connection::with_connector(Account::default(), server.connector())
    }

    #[test]
    fn test_commit() {
        let server = MockServer::new();
        let conn = connection(&server);
        let tx = conn
            .create_transaction(IsolationLevel::ReadCommitted, false)
            .unwrap();
        conn.execute("UPDATE t SET a = 1").unwrap();
        assert!(tx.commit().unwrap());
        assert_eq!(
            server.log(),
            vec![
                "QUERY SET TRANSACTION ISOLATION LEVEL READ COMMITTED;",
                "QUERY START TRANSACTION;",
                "QUERY UPDATE t SET a = 1",
                "QUERY COMMIT",
            ]
        );
    }

    #[test]
    fn test_drop_rolls_back() {
        let server = MockServer::new();
        let conn = connection(&server);
        {
            let _tx = conn
                .create_transaction(IsolationLevel::default(), true)
                .unwrap();
        }
        assert_eq!(
            server.log(),
            vec![
                "QUERY SET TRANSACTION ISOLATION LEVEL REPEATABLE READ;",
                "QUERY START TRANSACTION WITH CONSISTENT SNAPSHOT;",
                "QUERY ROLLBACK",
            ]
        );
    }

    #[test]
    fn test_explicit_rollback_runs_once() {
        let server = MockServer::new();
        let conn = connection(&server);
        let tx = conn
            .create_transaction(IsolationLevel::Serializable, false)
            .unwrap();
        assert!(tx.rollback().unwrap());
        let rollbacks = server.log().iter().filter(|l| *l == "QUERY ROLLBACK").count();
        assert_eq!(rollbacks, 1);
    }

    #[test]
    fn test_save_points() {
        let server = MockServer::new();
        let conn = connection(&server);
        let tx = conn
            .create_transaction(IsolationLevel::ReadUncommitted, false)
            .unwrap();
        server.clear_log();

        let first = tx.create_save_point().unwrap();
        assert_eq!(first.name(), "SP1");
        assert!(first.commit().unwrap());
        {
            let second = tx.create_save_point().unwrap();
            assert_eq!(second.name(), "SP2");
        }
        tx.commit().unwrap();

        assert_eq!(
            server.log(),
            vec![
                "QUERY SAVEPOINT SP1",
                "QUERY RELEASE SAVEPOINT SP1",
                "QUERY SAVEPOINT SP2",
                "QUERY ROLLBACK TO SAVEPOINT SP2",
                "QUERY COMMIT",
            ]
        );
    }

    #[test]
    fn test_no_rollback_on_a_new_session() {
        let server = MockServer::new();
        let conn = connection(&server);
        let tx = conn
            .create_transaction(IsolationLevel::default(), false)
            .unwrap();
        conn.disconnect();
        conn.connect().unwrap();
        server.clear_log();
        drop(tx);
        assert!(server.log().is_empty());
    }

    #[test]
    fn test_begin_failure_under_both_postures() {
        let server = MockServer::new();
        server.fail_query("START TRANSACTION;", 1792, "read-only transaction");

        let raising = connection(&server);
        let err = raising
            .create_transaction(IsolationLevel::default(), false)
            .unwrap_err();
        assert!(matches!(err, MariaError::Connection { code: 1792, .. }));

        let quiet = Connection::with_connector(
            Account::default().errors(ErrorPolicy {
                log: false,
                raise: false,
            }),
            server.connector(),
        );
        let err = quiet
            .create_transaction(IsolationLevel::default(), false)
            .unwrap_err();
        assert!(matches!(err, MariaError::Connection { code: 1792, .. }));
        assert_eq!(quiet.last_error().map(|e| e.code), Some(1792));
    }

    #[test]
    fn test_commit_failure_without_raise() {
        let server = MockServer::new();
        server.fail_query("COMMIT", 1180, "Got error during COMMIT");
        let conn = Connection::with_connector(
            Account::default().errors(ErrorPolicy {
                log: false,
                raise: false,
            }),
            server.connector(),
        );
        let tx = conn
            .create_transaction(IsolationLevel::default(), false)
            .unwrap();
        assert!(!tx.commit().unwrap());
        assert_eq!(conn.last_error().map(|e| e.code), Some(1180));
        assert!(!server.log().iter().any(|l| l == "QUERY ROLLBACK"));
    }
}
