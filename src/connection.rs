//! A session with the server.
//!
//! [`Connection`] is a cheap handle: clones share one session behind a
//! mutex, so statements, transactions and scheduler jobs can each hold one.
//! Operations connect on demand. Failures go through the account's
//! [`ErrorPolicy`]: they are logged when `log` is set, always recorded in
//! [`Connection::last_error`], and returned as `Err` only when `raise` is set.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::{Connector, NativeClient, QueryResult, WireConnector};
use crate::config::Account;
use crate::error::{LastError, MariaError, MariaResult};
use crate::result_set::ResultSet;
use crate::statement::Statement;
use crate::transaction::Transaction;
use crate::types::IsolationLevel;

pub(crate) type Client = Box<dyn NativeClient>;

struct Session {
    client: Option<Client>,
    schema: String,
    auto_commit: bool,
    last_error: Option<LastError>,
    /// Bumped on every connect; server-side handles from older sessions are stale.
    generation: u64,
    server_version: String,
}

#[derive(Clone)]
pub struct Connection {
    account: Arc<Account>,
    connector: Arc<dyn Connector>,
    session: Arc<Mutex<Session>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.account.address())
            .field("connected", &self.connected())
            .finish()
    }
}

impl Connection {
    pub fn new(account: Account) -> Self {
        Self::with_connector(account, Arc::new(WireConnector))
    }

    pub fn with_connector(account: Account, connector: Arc<dyn Connector>) -> Self {
        let session = Session {
            client: None,
            schema: account.schema.clone(),
            auto_commit: account.auto_commit,
            last_error: None,
            generation: 0,
            server_version: String::new(),
        };
        Self {
            account: Arc::new(account),
            connector,
            session: Arc::new(Mutex::new(session)),
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    // ==================== Session plumbing ====================

    fn open(&self, session: &mut Session) -> MariaResult<()> {
        if session.client.is_some() {
            return Ok(());
        }
        tracing::debug!(address = %self.account.address(), user = %self.account.user_name, "connecting");
        let mut client = self.connector.connect(&self.account)?;
        if let Err(e) = self.prepare_session(&mut client, session) {
            client.close();
            return Err(e);
        }
        session.server_version = client.server_version().to_string();
        session.client = Some(client);
        session.generation += 1;
        Ok(())
    }

    fn prepare_session(&self, client: &mut Client, session: &Session) -> MariaResult<()> {
        if !session.auto_commit {
            client.query("SET autocommit=0")?;
        }
        if !session.schema.is_empty() {
            client.select_db(&session.schema)?;
        }
        for (name, value) in &self.account.options {
            client.query(&format!("SET OPTION {}={}", name, value))?;
        }
        Ok(())
    }

    /// Apply the error policy to `result`. Without a `neutral` value the
    /// error is returned even when the policy does not raise.
    fn settle<T>(
        &self,
        session: &mut Session,
        neutral: Option<T>,
        result: MariaResult<T>,
    ) -> MariaResult<T> {
        let e = match result {
            Ok(value) => {
                session.last_error = None;
                return Ok(value);
            }
            Err(e) => e,
        };
        if self.account.errors.log {
            tracing::error!(code = e.code(), error = %e, "MariaDB operation failed");
        }
        session.last_error = Some(LastError::from(&e));
        if matches!(e, MariaError::Io(_) | MariaError::Protocol(_)) {
            if let Some(mut client) = session.client.take() {
                client.close();
            }
        }
        match neutral {
            Some(value) if !self.account.errors.raise => Ok(value),
            _ => Err(e),
        }
    }

    fn open_and<T>(
        &self,
        session: &mut Session,
        op: impl FnOnce(&mut Client, u64) -> MariaResult<T>,
    ) -> MariaResult<T> {
        self.open(session)?;
        let generation = session.generation;
        match session.client.as_mut() {
            Some(client) => op(client, generation),
            None => Err(MariaError::NotConnected),
        }
    }

    /// Run `op` on the session, connecting first if needed.
    pub(crate) fn run<T>(
        &self,
        neutral: T,
        op: impl FnOnce(&mut Client, u64) -> MariaResult<T>,
    ) -> MariaResult<T> {
        let mut session = self.session.lock();
        let result = self.open_and(&mut session, op);
        self.settle(&mut session, Some(neutral), result)
    }

    /// Like [`run`](Self::run) for operations with no neutral result.
    pub(crate) fn run_strict<T>(
        &self,
        op: impl FnOnce(&mut Client, u64) -> MariaResult<T>,
    ) -> MariaResult<T> {
        let mut session = self.session.lock();
        let result = self.open_and(&mut session, op);
        self.settle(&mut session, None, result)
    }

    fn in_generation<T>(
        session: &mut Session,
        generation: u64,
        op: impl FnOnce(&mut Client) -> MariaResult<T>,
    ) -> MariaResult<T> {
        match session.client.as_mut() {
            Some(client) if session.generation == generation => op(client),
            _ => Err(MariaError::NotConnected),
        }
    }

    /// Run `op` only if the session opened as `generation` is still alive.
    pub(crate) fn run_in<T>(
        &self,
        generation: u64,
        neutral: T,
        op: impl FnOnce(&mut Client) -> MariaResult<T>,
    ) -> MariaResult<T> {
        let mut session = self.session.lock();
        let result = Self::in_generation(&mut session, generation, op);
        self.settle(&mut session, Some(neutral), result)
    }

    pub(crate) fn run_in_strict<T>(
        &self,
        generation: u64,
        op: impl FnOnce(&mut Client) -> MariaResult<T>,
    ) -> MariaResult<T> {
        let mut session = self.session.lock();
        let result = Self::in_generation(&mut session, generation, op);
        self.settle(&mut session, None, result)
    }

    /// Like [`run_in`](Self::run_in) but silent: no policy, no error record.
    pub(crate) fn quietly_in(&self, generation: u64, op: impl FnOnce(&mut Client) -> MariaResult<()>) {
        let mut session = self.session.lock();
        if session.generation != generation {
            return;
        }
        if let Some(client) = session.client.as_mut() {
            if let Err(e) = op(client) {
                tracing::debug!(error = %e, "cleanup failed");
            }
        }
    }

    // ==================== Lifecycle ====================

    /// Connect if not already connected.
    pub fn connect(&self) -> MariaResult<bool> {
        self.run(false, |_, _| Ok(true))
    }

    pub fn disconnect(&self) {
        let mut session = self.session.lock();
        if let Some(mut client) = session.client.take() {
            tracing::debug!(address = %self.account.address(), "disconnecting");
            client.close();
        }
    }

    pub fn connected(&self) -> bool {
        self.session.lock().client.is_some()
    }

    pub fn ping(&self) -> MariaResult<bool> {
        self.run(false, |client, _| client.ping().map(|()| true))
    }

    /// Version string from the server handshake; empty before connecting.
    pub fn server_version(&self) -> String {
        self.session.lock().server_version.clone()
    }

    pub fn last_error(&self) -> Option<LastError> {
        self.session.lock().last_error.clone()
    }

    pub fn schema(&self) -> String {
        self.session.lock().schema.clone()
    }

    pub fn set_schema(&self, schema: &str) -> MariaResult<bool> {
        let changed = self.run(false, |client, _| client.select_db(schema).map(|()| true))?;
        if changed {
            self.session.lock().schema = schema.to_string();
        }
        Ok(changed)
    }

    pub fn auto_commit(&self) -> bool {
        self.session.lock().auto_commit
    }

    pub fn set_auto_commit(&self, auto_commit: bool) -> MariaResult<bool> {
        if self.auto_commit() == auto_commit {
            return Ok(true);
        }
        let sql = if auto_commit { "SET autocommit=1" } else { "SET autocommit=0" };
        let changed = self.run(false, |client, _| client.query(sql).map(|_| true))?;
        if changed {
            self.session.lock().auto_commit = auto_commit;
        }
        Ok(changed)
    }

    // ==================== Queries ====================

    /// Run `sql` and return the affected row count summed over every statement.
    pub fn execute(&self, sql: &str) -> MariaResult<u64> {
        tracing::debug!(sql = %sql, "execute");
        self.run(0, |client, _| {
            let affected = client
                .query(sql)?
                .iter()
                .map(|r| match r {
                    QueryResult::Done(ok) => ok.affected_rows,
                    QueryResult::Rows(_) => 0,
                })
                .sum();
            Ok(affected)
        })
    }

    /// Run `sql` and return the last insert id.
    pub fn insert(&self, sql: &str) -> MariaResult<u64> {
        tracing::debug!(sql = %sql, "insert");
        self.run(0, |client, _| {
            let id = client
                .query(sql)?
                .iter()
                .rev()
                .find_map(|r| match r {
                    QueryResult::Done(ok) => Some(ok.last_insert_id),
                    QueryResult::Rows(_) => None,
                })
                .unwrap_or(0);
            Ok(id)
        })
    }

    /// Run `sql` and return its first row-producing result.
    pub fn query(&self, sql: &str) -> MariaResult<ResultSet> {
        tracing::debug!(sql = %sql, "query");
        self.run(ResultSet::empty(), |client, _| {
            let rows = client.query(sql)?.into_iter().find_map(|r| match r {
                QueryResult::Rows(rows) => Some(rows),
                QueryResult::Done(_) => None,
            });
            Ok(rows.map_or_else(ResultSet::empty, ResultSet::from_text))
        })
    }

    pub fn create_statement(&self, sql: &str) -> MariaResult<Statement> {
        Statement::prepare(self.clone(), sql)
    }

    pub fn create_transaction(
        &self,
        isolation: IsolationLevel,
        consistent_snapshot: bool,
    ) -> MariaResult<Transaction> {
        Transaction::begin(self.clone(), isolation, consistent_snapshot)
    }
}
