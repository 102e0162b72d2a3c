//! Background job queue.
//!
//! A [`Scheduler`] owns a FIFO of jobs and up to `max_workers` worker threads.
//! Workers are spawned on demand and exit once the queue is empty. Each worker
//! runs SQL jobs on its own connection; statement jobs run on the connection
//! the statement was prepared on.
//!
//! Submission never blocks. The returned [`Handle`] is polled with
//! [`Scheduler::worker_status`] or waited on with [`Scheduler::wait_handle`].
//! Jobs submitted with `keep_handle = false` are forgotten as soon as they
//! finish.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::client::{Connector, WireConnector};
use crate::config::Account;
use crate::connection::Connection;
use crate::error::{ErrorPolicy, MariaError, MariaResult};
use crate::result_set::ResultSet;
use crate::statement::Statement;

/// A statement shared between the caller and the scheduler.
pub type SharedStatement = Arc<Mutex<Statement>>;

/// Opaque job identifier. Handles are never reused within a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobStatus {
    Waiting,
    Executing,
    Succeed,
    Failed,
    /// Released, discarded after completion, or never submitted.
    Removed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Succeed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Execute,
    Insert,
    Query,
}

enum Target {
    Sql(String),
    Statement(SharedStatement),
}

struct Task {
    handle: Handle,
    command: Command,
    target: Target,
}

enum Output {
    Count(u64),
    /// `None` once taken.
    Rows(Option<ResultSet>),
}

struct Job {
    status: JobStatus,
    keep: bool,
    output: Option<Output>,
    error: Option<String>,
}

struct State {
    queue: VecDeque<Task>,
    jobs: HashMap<Handle, Job>,
    next_handle: u64,
    workers: usize,
    max_workers: usize,
}

struct Shared {
    account: Account,
    connector: Arc<dyn Connector>,
    state: Mutex<State>,
    finished: Condvar,
}

pub struct Scheduler {
    shared: Arc<Shared>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Scheduler")
            .field("queued", &state.queue.len())
            .field("jobs", &state.jobs.len())
            .field("workers", &state.workers)
            .finish()
    }
}

impl Scheduler {
    pub fn new(account: Account) -> Self {
        Self::with_connector(account, Arc::new(WireConnector))
    }

    /// Workers always run in auto-commit mode and always raise, so failures
    /// land in [`JobStatus::Failed`] instead of being swallowed.
    pub fn with_connector(account: Account, connector: Arc<dyn Connector>) -> Self {
        let errors = ErrorPolicy {
            log: account.errors.log,
            raise: true,
        };
        let account = account.auto_commit(true).errors(errors);
        Self {
            shared: Arc::new(Shared {
                account,
                connector,
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    jobs: HashMap::new(),
                    next_handle: 0,
                    workers: 0,
                    max_workers: 1,
                }),
                finished: Condvar::new(),
            }),
        }
    }

    /// Cap the number of concurrent workers (at least one).
    pub fn max_workers(self, max_workers: usize) -> Self {
        self.shared.state.lock().max_workers = max_workers.max(1);
        self
    }

    // ==================== Submission ====================

    pub fn execute(&self, sql: &str, keep_handle: bool) -> Handle {
        self.submit(Command::Execute, Target::Sql(sql.to_string()), keep_handle)
    }

    pub fn insert(&self, sql: &str, keep_handle: bool) -> Handle {
        self.submit(Command::Insert, Target::Sql(sql.to_string()), keep_handle)
    }

    pub fn query(&self, sql: &str, keep_handle: bool) -> Handle {
        self.submit(Command::Query, Target::Sql(sql.to_string()), keep_handle)
    }

    /// Prepare `sql` on a fresh connection owned by the returned statement.
    pub fn create_statement(&self, sql: &str) -> MariaResult<SharedStatement> {
        let conn = Connection::with_connector(self.shared.account.clone(), self.shared.connector.clone());
        Ok(Arc::new(Mutex::new(conn.create_statement(sql)?)))
    }

    pub fn execute_statement(&self, statement: &SharedStatement, keep_handle: bool) -> Handle {
        self.submit(Command::Execute, Target::Statement(statement.clone()), keep_handle)
    }

    pub fn insert_statement(&self, statement: &SharedStatement, keep_handle: bool) -> Handle {
        self.submit(Command::Insert, Target::Statement(statement.clone()), keep_handle)
    }

    pub fn query_statement(&self, statement: &SharedStatement, keep_handle: bool) -> Handle {
        self.submit(Command::Query, Target::Statement(statement.clone()), keep_handle)
    }

    fn submit(&self, command: Command, target: Target, keep: bool) -> Handle {
        let mut state = self.shared.state.lock();
        state.next_handle += 1;
        let handle = Handle(state.next_handle);
        state.jobs.insert(
            handle,
            Job {
                status: JobStatus::Waiting,
                keep,
                output: None,
                error: None,
            },
        );
        state.queue.push_back(Task {
            handle,
            command,
            target,
        });
        tracing::debug!(%handle, ?command, "job queued");

        if state.workers < state.max_workers {
            self.spawn_worker(&mut state);
        }
        handle
    }

    fn spawn_worker(&self, state: &mut MutexGuard<'_, State>) {
        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("qail-mariadb-worker".to_string())
            .spawn(move || worker_loop(shared));
        match spawned {
            Ok(_) => state.workers += 1,
            Err(e) if state.workers == 0 => {
                tracing::error!(error = %e, "cannot spawn worker, failing queued jobs");
                let reason = format!("cannot spawn worker: {}", e);
                while let Some(task) = state.queue.pop_front() {
                    complete(state, task.handle, Err(reason.clone()));
                }
                self.shared.finished.notify_all();
            }
            Err(e) => tracing::warn!(error = %e, "cannot spawn extra worker"),
        }
    }

    // ==================== Status ====================

    pub fn worker_status(&self, handle: Handle) -> JobStatus {
        status_of(&self.shared.state.lock(), handle)
    }

    /// Block until the job finishes or `timeout` elapses, and return its
    /// status. Giving up does not cancel the job.
    pub fn wait_handle(&self, handle: Handle, timeout: Option<Duration>) -> JobStatus {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.shared.state.lock();
        loop {
            let status = status_of(&state, handle);
            if status.is_finished() || status == JobStatus::Removed {
                return status;
            }
            match deadline {
                Some(deadline) => {
                    if self.shared.finished.wait_until(&mut state, deadline).timed_out() {
                        return status_of(&state, handle);
                    }
                }
                None => self.shared.finished.wait(&mut state),
            }
        }
    }

    // ==================== Results ====================

    fn with_output<T>(
        &self,
        handle: Handle,
        read: impl FnOnce(&mut Output) -> MariaResult<T>,
    ) -> MariaResult<T> {
        let mut state = self.shared.state.lock();
        let job = state
            .jobs
            .get_mut(&handle)
            .ok_or(MariaError::UnknownHandle(handle))?;
        match job.status {
            JobStatus::Waiting | JobStatus::Executing => Err(MariaError::JobPending(handle)),
            JobStatus::Failed | JobStatus::Removed => Err(MariaError::JobFailed {
                handle,
                reason: job.error.clone().unwrap_or_default(),
            }),
            JobStatus::Succeed => match job.output.as_mut() {
                Some(output) => read(output),
                None => Err(MariaError::JobPending(handle)),
            },
        }
    }

    /// Affected rows of a finished execute job (row count for a query job).
    pub fn get_execute_result(&self, handle: Handle) -> MariaResult<u64> {
        self.with_output(handle, |output| match output {
            Output::Count(n) => Ok(*n),
            Output::Rows(Some(rs)) => Ok(rs.row_count() as u64),
            Output::Rows(None) => Err(MariaError::ResultTaken(handle)),
        })
    }

    /// Last insert id of a finished insert job.
    pub fn get_insert_result(&self, handle: Handle) -> MariaResult<u64> {
        self.get_execute_result(handle)
    }

    /// Move the result set out of a finished query job. Only the first call
    /// succeeds.
    pub fn take_query_result(&self, handle: Handle) -> MariaResult<ResultSet> {
        self.with_output(handle, |output| match output {
            Output::Rows(rows) => rows.take().ok_or(MariaError::ResultTaken(handle)),
            Output::Count(_) => Ok(ResultSet::empty()),
        })
    }

    /// Forget a job. A running job still completes; its result is dropped.
    pub fn release_handle(&self, handle: Handle) -> bool {
        let removed = self.shared.state.lock().jobs.remove(&handle).is_some();
        if removed {
            self.shared.finished.notify_all();
        }
        removed
    }
}

fn status_of(state: &State, handle: Handle) -> JobStatus {
    state
        .jobs
        .get(&handle)
        .map_or(JobStatus::Removed, |job| job.status)
}

fn complete(state: &mut State, handle: Handle, result: Result<Output, String>) {
    let Some(job) = state.jobs.get_mut(&handle) else {
        return;
    };
    match result {
        Ok(output) => {
            job.status = JobStatus::Succeed;
            job.output = Some(output);
        }
        Err(reason) => {
            tracing::error!(%handle, reason = %reason, "job failed");
            job.status = JobStatus::Failed;
            job.error = Some(reason);
        }
    }
    if !job.keep {
        state.jobs.remove(&handle);
    }
}

fn worker_loop(shared: Arc<Shared>) {
    let conn = Connection::with_connector(shared.account.clone(), shared.connector.clone());
    loop {
        let task = {
            let mut state = shared.state.lock();
            match state.queue.pop_front() {
                Some(task) => {
                    if let Some(job) = state.jobs.get_mut(&task.handle) {
                        job.status = JobStatus::Executing;
                    }
                    task
                }
                None => {
                    state.workers -= 1;
                    break;
                }
            }
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| run_task(&conn, &task)))
            .unwrap_or_else(|_| Err("job panicked".to_string()));

        let mut state = shared.state.lock();
        complete(&mut state, task.handle, result);
        drop(state);
        shared.finished.notify_all();
    }
    conn.disconnect();
}

fn run_task(conn: &Connection, task: &Task) -> Result<Output, String> {
    tracing::debug!(handle = %task.handle, command = ?task.command, "job started");
    let result = match &task.target {
        Target::Sql(sql) => match task.command {
            Command::Execute => conn.execute(sql).map(Output::Count),
            Command::Insert => conn.insert(sql).map(Output::Count),
            Command::Query => conn.query(sql).map(|rs| Output::Rows(Some(rs))),
        },
        Target::Statement(statement) => {
            let statement = statement.lock();
            match task.command {
                Command::Execute => statement.execute().map(Output::Count),
                Command::Insert => statement.insert().map(Output::Count),
                Command::Query => statement.query().map(|rs| Output::Rows(Some(rs))),
            }
        }
    };
    result.map_err(|e| e.to_string())
}
