//! Scripted in-memory client for unit tests.
//!
//! Every call is appended to a shared log (`QUERY <sql>`, `PREPARE <sql>`,
//! `EXECUTE <id> [..]`, `CLOSE <id>`, `INIT_DB <schema>`, `PING`, `QUIT`)
//! and answered from the script, or with an empty OK when nothing matches.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    Connector, NativeClient, OkStatus, PreparedInfo, QueryResult, StatementResult, TextRows,
};
use crate::bind::{BindBuffer, BindSet};
use crate::config::Account;
use crate::error::{MariaError, MariaResult};
use crate::protocol::ColumnDef;
use crate::types::FieldType;

#[derive(Debug, Clone)]
enum Reply<T> {
    Ok(T),
    Fail(u32, String),
}

impl<T: Clone> Reply<T> {
    fn get(&self) -> MariaResult<T> {
        match self {
            Reply::Ok(v) => Ok(v.clone()),
            Reply::Fail(code, message) => Err(MariaError::Connection {
                code: *code,
                message: message.clone(),
            }),
        }
    }
}

#[derive(Default)]
struct MockState {
    queries: HashMap<String, Reply<Vec<QueryResult>>>,
    prepared: HashMap<String, Reply<PreparedInfo>>,
    executions: HashMap<u32, VecDeque<Reply<StatementResult>>>,
    connect_error: Option<(u32, String)>,
    delay: Option<Duration>,
    log: Vec<String>,
    connects: usize,
    next_id: u32,
}

/// Handle on the script and log shared by every client it hands out.
#[derive(Clone, Default)]
pub(crate) struct MockServer {
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            state: self.state.clone(),
        })
    }

    pub fn on_query(&self, sql: &str, results: Vec<QueryResult>) {
        self.state.lock().queries.insert(sql.to_string(), Reply::Ok(results));
    }

    pub fn fail_query(&self, sql: &str, code: u32, message: &str) {
        self.state
            .lock()
            .queries
            .insert(sql.to_string(), Reply::Fail(code, message.to_string()));
    }

    /// Script a statement; returns its id.
    pub fn on_prepare(&self, sql: &str, params: usize, columns: Vec<ColumnDef>) -> u32 {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.prepared.insert(
            sql.to_string(),
            Reply::Ok(PreparedInfo {
                id,
                params,
                columns,
            }),
        );
        id
    }

    pub fn fail_prepare(&self, sql: &str, code: u32, message: &str) {
        self.state
            .lock()
            .prepared
            .insert(sql.to_string(), Reply::Fail(code, message.to_string()));
    }

    /// Queue the result of the next execution of statement `id`.
    pub fn on_execute(&self, id: u32, result: StatementResult) {
        self.state
            .lock()
            .executions
            .entry(id)
            .or_default()
            .push_back(Reply::Ok(result));
    }

    pub fn fail_execute(&self, id: u32, code: u32, message: &str) {
        self.state
            .lock()
            .executions
            .entry(id)
            .or_default()
            .push_back(Reply::Fail(code, message.to_string()));
    }

    pub fn fail_connect(&self, code: u32, message: &str) {
        self.state.lock().connect_error = Some((code, message.to_string()));
    }

    /// Make every query sleep first.
    pub fn delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }
}

// ==================== Result builders ====================

pub(crate) fn done(affected_rows: u64, last_insert_id: u64) -> QueryResult {
    QueryResult::Done(OkStatus {
        affected_rows,
        last_insert_id,
        ..OkStatus::default()
    })
}

pub(crate) fn text(columns: &[(&str, FieldType)], rows: &[&[Option<&str>]]) -> QueryResult {
    QueryResult::Rows(TextRows {
        columns: columns
            .iter()
            .map(|(name, ty)| ColumnDef::new(*name, *ty))
            .collect(),
        rows: rows
            .iter()
            .map(|row| row.iter().map(|c| c.map(|s| s.as_bytes().to_vec())).collect())
            .collect(),
    })
}

fn render(params: &BindSet) -> String {
    let cells: Vec<String> = params
        .iter()
        .map(|bind| {
            if bind.is_null() {
                return "NULL".to_string();
            }
            match bind.buffer() {
                BindBuffer::Scalar(_) => match bind.field_type() {
                    FieldType::Float => bind.float().to_string(),
                    FieldType::Double => bind.double().to_string(),
                    _ if bind.is_unsigned() => bind.unsigned().to_string(),
                    _ => bind.signed().to_string(),
                },
                BindBuffer::Time(t) => format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
                    t.year,
                    t.month,
                    t.day,
                    t.hour,
                    t.minute,
                    t.second,
                    t.millisecond()
                ),
                BindBuffer::Bytes(b) => format!("'{}'", String::from_utf8_lossy(b)),
                BindBuffer::Empty => "''".to_string(),
            }
        })
        .collect();
    format!("[{}]", cells.join(", "))
}

// ==================== Client ====================

struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl Connector for MockConnector {
    fn connect(&self, _account: &Account) -> MariaResult<Box<dyn NativeClient>> {
        let mut state = self.state.lock();
        state.connects += 1;
        if let Some((code, message)) = &state.connect_error {
            return Err(MariaError::Connection {
                code: *code,
                message: message.clone(),
            });
        }
        Ok(Box::new(MockClient {
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct MockClient {
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

impl MockClient {
    fn record(&self, entry: String) {
        self.state.lock().log.push(entry);
    }
}

impl NativeClient for MockClient {
    fn query(&mut self, sql: &str) -> MariaResult<Vec<QueryResult>> {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.record(format!("QUERY {}", sql));
        match self.state.lock().queries.get(sql) {
            Some(reply) => reply.get(),
            None => Ok(vec![done(0, 0)]),
        }
    }

    fn select_db(&mut self, schema: &str) -> MariaResult<()> {
        self.record(format!("INIT_DB {}", schema));
        Ok(())
    }

    fn prepare(&mut self, sql: &str) -> MariaResult<PreparedInfo> {
        self.record(format!("PREPARE {}", sql));
        let mut state = self.state.lock();
        if let Some(reply) = state.prepared.get(sql) {
            return reply.get();
        }
        state.next_id += 1;
        Ok(PreparedInfo {
            id: state.next_id,
            params: sql.matches('?').count(),
            columns: Vec::new(),
        })
    }

    fn execute(&mut self, statement_id: u32, params: &BindSet) -> MariaResult<StatementResult> {
        self.record(format!("EXECUTE {} {}", statement_id, render(params)));
        let reply = self
            .state
            .lock()
            .executions
            .get_mut(&statement_id)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(reply) => reply.get(),
            None => Ok(StatementResult::Done(OkStatus {
                affected_rows: 1,
                ..OkStatus::default()
            })),
        }
    }

    fn close_statement(&mut self, statement_id: u32) -> MariaResult<()> {
        self.record(format!("CLOSE {}", statement_id));
        Ok(())
    }

    fn ping(&mut self) -> MariaResult<()> {
        self.record("PING".to_string());
        Ok(())
    }

    fn server_version(&self) -> &str {
        "11.4.2-MariaDB-mock"
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.record("QUIT".to_string());
        }
    }
}
