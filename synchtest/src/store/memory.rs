//! In-memory cluster implementation for testing.
//!
//! Models one primary and two replicas sharing a single `synchtest` table.
//! Committed changes replicate synchronously to every replica that is not
//! lagging. Faults are injected per target:
//!
//! - **lag**: the replica stops applying changes and keeps serving old rows
//! - **stale reads**: reads on the target return no rows
//! - **failing reads**: reads on the target fail after the session is open
//! - **refused connections**: `connect` fails
//!
//! Every statement yields once before taking effect, so concurrent sessions
//! interleave the way they would on a real network.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;

use crate::config::{Endpoint, Target, WorkerId};
use crate::sql;
use crate::store::error::StoreError;
use crate::store::row::Row;
use crate::store::traits::{Connector, Session};

/// One statement executed against the cluster, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Target the statement ran on.
    pub target: Target,
    /// Worker owning the session.
    pub worker: WorkerId,
    /// Statement text as received.
    pub statement: String,
}

impl Operation {
    /// Whether this is a marker insert.
    pub fn is_insert(&self) -> bool {
        self.statement.trim_start().to_lowercase().starts_with("insert")
    }

    /// Whether this is a full-table delete.
    pub fn is_delete_all(&self) -> bool {
        self.statement.trim().eq_ignore_ascii_case(sql::DELETE_ALL)
    }

    /// Whether this is a read.
    pub fn is_select(&self) -> bool {
        self.statement.trim_start().to_lowercase().starts_with("select")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Insert { id: i64, value: i64 },
    DeleteAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Statement {
    Begin,
    Commit,
    Rollback,
    Set(String),
    Insert { id: i64, value: i64 },
    DeleteAll,
    Select { id: i64 },
    DropTable,
    CreateTable,
}

fn parse_int(text: &str, statement: &str) -> Result<i64, StoreError> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| StoreError::Query(format!("syntax error in '{statement}'")))
}

fn parse(statement: &str) -> Result<Statement, StoreError> {
    let normalized = statement.trim().trim_end_matches(';').to_lowercase();
    let syntax_error = || StoreError::Query(format!("syntax error in '{statement}'"));

    match normalized.as_str() {
        "begin" | "start transaction" => return Ok(Statement::Begin),
        "commit" | "end" => return Ok(Statement::Commit),
        "rollback" => return Ok(Statement::Rollback),
        "delete from synchtest" => return Ok(Statement::DeleteAll),
        "drop table if exists synchtest" | "drop table synchtest" => {
            return Ok(Statement::DropTable);
        }
        _ => {}
    }

    if normalized.starts_with("set ") {
        return Ok(Statement::Set(normalized));
    }
    if normalized.starts_with("create table") && normalized.contains(sql::TABLE) {
        return Ok(Statement::CreateTable);
    }
    if let Some(rest) = normalized.strip_prefix("insert into synchtest") {
        let values = rest
            .split_once("values")
            .map(|(_, values)| values.trim())
            .and_then(|values| values.strip_prefix('('))
            .and_then(|values| values.strip_suffix(')'))
            .ok_or_else(syntax_error)?;
        let (id, value) = values.split_once(',').ok_or_else(syntax_error)?;
        return Ok(Statement::Insert {
            id: parse_int(id, statement)?,
            value: parse_int(value, statement)?,
        });
    }
    if let Some(rest) = normalized.strip_prefix("select value from synchtest where") {
        let id = rest
            .trim()
            .strip_prefix("id")
            .map(str::trim)
            .and_then(|rest| rest.strip_prefix('='))
            .ok_or_else(syntax_error)?;
        return Ok(Statement::Select {
            id: parse_int(id, statement)?,
        });
    }

    Err(StoreError::Query(format!(
        "unsupported statement '{statement}'"
    )))
}

#[derive(Debug, Default)]
struct Faults {
    lagging: bool,
    stale_reads: bool,
    failing_reads: bool,
    refuse_connections: bool,
}

#[derive(Debug)]
struct ClusterState {
    table_exists: [bool; 3],
    rows: [Vec<(i64, i64)>; 3],
    faults: [Faults; 3],
    journal: Vec<Operation>,
    directives: Vec<Operation>,
    rejected_prefixes: Vec<String>,
    reads: [u64; 3],
    in_flight_reads: usize,
    peak_in_flight_reads: usize,
    connects: u64,
    open_sessions: usize,
    closed_sessions: usize,
}

impl ClusterState {
    fn new(table_exists: bool) -> Self {
        Self {
            table_exists: [table_exists; 3],
            rows: Default::default(),
            faults: Default::default(),
            journal: Vec::new(),
            directives: Vec::new(),
            rejected_prefixes: Vec::new(),
            reads: [0; 3],
            in_flight_reads: 0,
            peak_in_flight_reads: 0,
            connects: 0,
            open_sessions: 0,
            closed_sessions: 0,
        }
    }

    /// Apply a committed change on the primary and replicate it.
    fn replicate(&mut self, change: Change) -> Result<u64, StoreError> {
        if !self.table_exists[Target::Primary.index()] {
            return Err(missing_table());
        }
        let mut affected = 0;
        for target in Target::ALL {
            let idx = target.index();
            if target.is_secondary() && self.faults[idx].lagging {
                continue;
            }
            let rows = &mut self.rows[idx];
            let changed = match change {
                Change::Insert { id, value } => {
                    rows.push((id, value));
                    1
                }
                Change::DeleteAll => {
                    let count = rows.len() as u64;
                    rows.clear();
                    count
                }
            };
            if target == Target::Primary {
                affected = changed;
            }
        }
        Ok(affected)
    }

    fn set_table(&mut self, exists: bool) {
        for target in Target::ALL {
            let idx = target.index();
            if target.is_secondary() && self.faults[idx].lagging {
                continue;
            }
            self.table_exists[idx] = exists;
            self.rows[idx].clear();
        }
    }
}

fn missing_table() -> StoreError {
    StoreError::Query("relation \"synchtest\" does not exist".to_string())
}

/// Shared handle to an in-memory primary/replica cluster.
///
/// Cloning yields another handle to the same cluster. Acts as the
/// [`Connector`] for its own sessions.
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    state: Rc<RefCell<ClusterState>>,
}

impl MemoryCluster {
    /// A healthy cluster with the `synchtest` table already created.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ClusterState::new(true))),
        }
    }

    /// A healthy cluster with no `synchtest` table.
    pub fn without_table() -> Self {
        Self {
            state: Rc::new(RefCell::new(ClusterState::new(false))),
        }
    }

    /// Stop applying replicated changes on a replica.
    ///
    /// Ignored for the primary, which always applies its own commits.
    pub fn lag(&self, target: Target) {
        if target.is_secondary() {
            self.state.borrow_mut().faults[target.index()].lagging = true;
        }
    }

    /// Make reads on a target return no rows.
    pub fn serve_stale_reads(&self, target: Target) {
        self.state.borrow_mut().faults[target.index()].stale_reads = true;
    }

    /// Make reads on a target fail with a query error.
    pub fn fail_reads(&self, target: Target) {
        self.state.borrow_mut().faults[target.index()].failing_reads = true;
    }

    /// Refuse new connections to a target.
    pub fn refuse_connections(&self, target: Target) {
        self.state.borrow_mut().faults[target.index()].refuse_connections = true;
    }

    /// Make every statement starting with `prefix` fail, on every target.
    ///
    /// Matching ignores case and leading whitespace. Not cleared by
    /// [`MemoryCluster::heal`].
    pub fn fail_statements(&self, prefix: &str) {
        self.state
            .borrow_mut()
            .rejected_prefixes
            .push(prefix.trim().to_lowercase());
    }

    fn rejects(&self, statement: &str) -> bool {
        let normalized = statement.trim_start().to_lowercase();
        self.state
            .borrow()
            .rejected_prefixes
            .iter()
            .any(|prefix| normalized.starts_with(prefix.as_str()))
    }

    /// Clear every fault on a target. A replica that lagged stays behind
    /// until the next change replicates.
    pub fn heal(&self, target: Target) {
        self.state.borrow_mut().faults[target.index()] = Faults::default();
    }

    /// Rows currently visible on a target, as `(id, value)` pairs.
    pub fn rows(&self, target: Target) -> Vec<(i64, i64)> {
        self.state.borrow().rows[target.index()].clone()
    }

    /// Whether the table exists on a target.
    pub fn table_exists(&self, target: Target) -> bool {
        self.state.borrow().table_exists[target.index()]
    }

    /// Every statement executed so far, in execution order.
    pub fn journal(&self) -> Vec<Operation> {
        self.state.borrow().journal.clone()
    }

    /// Every `set ...` directive received, in order.
    pub fn directives(&self) -> Vec<Operation> {
        self.state.borrow().directives.clone()
    }

    /// Number of reads issued against a target.
    pub fn reads(&self, target: Target) -> u64 {
        self.state.borrow().reads[target.index()]
    }

    /// Highest number of reads simultaneously in flight.
    pub fn peak_in_flight_reads(&self) -> usize {
        self.state.borrow().peak_in_flight_reads
    }

    /// Number of successful connects.
    pub fn connects(&self) -> u64 {
        self.state.borrow().connects
    }

    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.state.borrow().open_sessions
    }

    /// Sessions closed through [`Session::close`].
    pub fn closed_sessions(&self) -> usize {
        self.state.borrow().closed_sessions
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Connector for MemoryCluster {
    type Session = MemorySession;

    async fn connect(
        &self,
        target: Target,
        worker: WorkerId,
        _endpoint: &Endpoint,
    ) -> Result<MemorySession, StoreError> {
        tokio::task::yield_now().await;

        let mut state = self.state.borrow_mut();
        if state.faults[target.index()].refuse_connections {
            return Err(StoreError::Connect(format!("{target} refused connection")));
        }
        state.connects += 1;
        state.open_sessions += 1;
        drop(state);

        Ok(MemorySession {
            cluster: self.clone(),
            target,
            worker,
            transaction: RefCell::new(None),
            closed: Cell::new(false),
        })
    }
}

/// Session on a [`MemoryCluster`].
#[derive(Debug)]
pub struct MemorySession {
    cluster: MemoryCluster,
    target: Target,
    worker: WorkerId,
    transaction: RefCell<Option<Vec<Change>>>,
    closed: Cell<bool>,
}

impl MemorySession {
    /// Target this session is connected to.
    pub fn target(&self) -> Target {
        self.target
    }

    async fn run(&self, statement: &str) -> Result<(u64, Vec<Row>), StoreError> {
        if self.closed.get() {
            return Err(StoreError::Closed);
        }
        let parsed = parse(statement)?;

        if self.cluster.rejects(statement) {
            tokio::task::yield_now().await;
            return Err(StoreError::Query(format!(
                "{} rejected '{statement}'",
                self.target
            )));
        }

        if let Statement::Select { id } = parsed {
            return self.select(statement, id).await.map(|rows| (0, rows));
        }

        tokio::task::yield_now().await;
        self.journal(statement);
        self.apply(parsed).map(|affected| (affected, Vec::new()))
    }

    fn journal(&self, statement: &str) {
        self.cluster.state.borrow_mut().journal.push(Operation {
            target: self.target,
            worker: self.worker,
            statement: statement.to_string(),
        });
    }

    async fn select(&self, statement: &str, id: i64) -> Result<Vec<Row>, StoreError> {
        let idx = self.target.index();
        {
            let mut state = self.cluster.state.borrow_mut();
            state.reads[idx] += 1;
            state.in_flight_reads += 1;
            state.peak_in_flight_reads = state.peak_in_flight_reads.max(state.in_flight_reads);
        }

        tokio::task::yield_now().await;

        self.journal(statement);
        let mut state = self.cluster.state.borrow_mut();
        state.in_flight_reads -= 1;

        let faults = &state.faults[idx];
        if faults.failing_reads {
            return Err(StoreError::Query(format!(
                "could not receive data from {}",
                self.target
            )));
        }
        if !state.table_exists[idx] {
            return Err(missing_table());
        }
        if faults.stale_reads {
            return Ok(Vec::new());
        }

        Ok(state.rows[idx]
            .iter()
            .filter(|(row_id, _)| *row_id == id)
            .map(|(_, value)| Row::single_int(sql::VALUE_COLUMN, *value))
            .collect())
    }

    fn write(&self, change: Change) -> Result<u64, StoreError> {
        if self.target.is_secondary() {
            return Err(StoreError::Query(
                "cannot execute statement in a read-only transaction".to_string(),
            ));
        }
        if let Some(pending) = self.transaction.borrow_mut().as_mut() {
            pending.push(change);
            return Ok(match change {
                Change::Insert { .. } => 1,
                Change::DeleteAll => 0,
            });
        }
        self.cluster.state.borrow_mut().replicate(change)
    }

    fn apply(&self, statement: Statement) -> Result<u64, StoreError> {
        match statement {
            Statement::Begin => {
                let mut transaction = self.transaction.borrow_mut();
                if transaction.is_none() {
                    *transaction = Some(Vec::new());
                }
                Ok(0)
            }
            Statement::Commit => {
                let pending = self.transaction.borrow_mut().take().unwrap_or_default();
                let mut state = self.cluster.state.borrow_mut();
                for change in pending {
                    state.replicate(change)?;
                }
                Ok(0)
            }
            Statement::Rollback => {
                self.transaction.borrow_mut().take();
                Ok(0)
            }
            Statement::Set(directive) => {
                self.cluster.state.borrow_mut().directives.push(Operation {
                    target: self.target,
                    worker: self.worker,
                    statement: directive,
                });
                Ok(0)
            }
            Statement::Insert { id, value } => self.write(Change::Insert { id, value }),
            Statement::DeleteAll => self.write(Change::DeleteAll),
            Statement::DropTable | Statement::CreateTable if self.target.is_secondary() => Err(
                StoreError::Query("cannot execute DDL in a read-only transaction".to_string()),
            ),
            Statement::DropTable => {
                self.cluster.state.borrow_mut().set_table(false);
                Ok(0)
            }
            Statement::CreateTable => {
                let mut state = self.cluster.state.borrow_mut();
                if !state.table_exists[Target::Primary.index()] {
                    state.set_table(true);
                }
                Ok(0)
            }
            Statement::Select { .. } => Ok(0),
        }
    }
}

#[async_trait(?Send)]
impl Session for MemorySession {
    async fn execute(&self, statement: &str) -> Result<u64, StoreError> {
        self.run(statement).await.map(|(affected, _)| affected)
    }

    async fn query(&self, statement: &str) -> Result<Vec<Row>, StoreError> {
        self.run(statement).await.map(|(_, rows)| rows)
    }

    async fn close(self) -> Result<(), StoreError> {
        if self.closed.replace(true) {
            return Err(StoreError::Closed);
        }
        let mut state = self.cluster.state.borrow_mut();
        state.open_sessions -= 1;
        state.closed_sessions += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("memory")
    }

    async fn session(cluster: &MemoryCluster, target: Target) -> MemorySession {
        cluster
            .connect(target, WorkerId::new(1), &endpoint())
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_statements() {
        assert_eq!(parse("begin").unwrap(), Statement::Begin);
        assert_eq!(parse("COMMIT;").unwrap(), Statement::Commit);
        assert_eq!(
            parse("insert into synchtest (id, value) values (3, 1700000000)").unwrap(),
            Statement::Insert {
                id: 3,
                value: 1_700_000_000
            }
        );
        assert_eq!(
            parse("select value from synchtest where id = 12").unwrap(),
            Statement::Select { id: 12 }
        );
        assert!(matches!(
            parse("set local synchronous_commit to on").unwrap(),
            Statement::Set(_)
        ));
        assert!(parse("vacuum full").is_err());
        assert!(parse("insert into synchtest (id, value) values (x, 1)").is_err());
    }

    #[tokio::test]
    async fn test_commit_replicates_to_all_targets() {
        let cluster = MemoryCluster::new();
        let primary = session(&cluster, Target::Primary).await;

        primary.execute("begin").await.unwrap();
        primary
            .execute("insert into synchtest (id, value) values (1, 42)")
            .await
            .unwrap();
        assert!(cluster.rows(Target::Secondary1).is_empty());
        assert!(cluster.rows(Target::Primary).is_empty());

        primary.execute("commit").await.unwrap();
        for target in Target::ALL {
            assert_eq!(cluster.rows(target), vec![(1, 42)]);
        }
    }

    #[tokio::test]
    async fn test_lagging_replica_keeps_old_rows() {
        let cluster = MemoryCluster::new();
        let primary = session(&cluster, Target::Primary).await;
        let replica = session(&cluster, Target::Secondary2).await;

        cluster.lag(Target::Secondary2);
        primary
            .execute("insert into synchtest (id, value) values (1, 7)")
            .await
            .unwrap();

        let rows = replica
            .query("select value from synchtest where id=1")
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(cluster.rows(Target::Secondary1), vec![(1, 7)]);
    }

    #[tokio::test]
    async fn test_replica_rejects_writes() {
        let cluster = MemoryCluster::new();
        let replica = session(&cluster, Target::Secondary1).await;
        let err = replica
            .execute("insert into synchtest (id, value) values (1, 7)")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn test_failing_reads_after_connect() {
        let cluster = MemoryCluster::new();
        let replica = session(&cluster, Target::Secondary1).await;
        cluster.fail_reads(Target::Secondary1);

        let result = replica.query("select value from synchtest where id=1").await;
        assert!(matches!(result, Err(StoreError::Query(_))));
        assert_eq!(cluster.reads(Target::Secondary1), 1);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let cluster = MemoryCluster::new();
        cluster.refuse_connections(Target::Secondary2);
        let result = cluster
            .connect(Target::Secondary2, WorkerId::new(1), &endpoint())
            .await;
        assert!(matches!(result, Err(StoreError::Connect(_))));
        assert_eq!(cluster.connects(), 0);
    }

    #[tokio::test]
    async fn test_rejected_statements() {
        let cluster = MemoryCluster::new();
        let primary = session(&cluster, Target::Primary).await;
        assert_eq!(primary.target(), Target::Primary);
        cluster.fail_statements("COMMIT");

        primary.execute("begin").await.unwrap();
        primary
            .execute("insert into synchtest (id, value) values (1, 9)")
            .await
            .unwrap();
        let result = primary.execute("commit").await;

        assert!(matches!(result, Err(StoreError::Query(_))));
        assert!(cluster.rows(Target::Primary).is_empty());
        assert!(cluster.journal().iter().all(|op| op.statement != "commit"));
    }

    #[tokio::test]
    async fn test_close_accounting() {
        let cluster = MemoryCluster::new();
        let primary = session(&cluster, Target::Primary).await;
        assert_eq!(cluster.open_sessions(), 1);

        primary.close().await.unwrap();
        assert_eq!(cluster.open_sessions(), 0);
        assert_eq!(cluster.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reads_are_all_in_flight() {
        let cluster = MemoryCluster::new();
        let s1 = session(&cluster, Target::Secondary1).await;
        let s2 = session(&cluster, Target::Secondary2).await;
        let p = session(&cluster, Target::Primary).await;
        let stmt = "select value from synchtest where id=1";

        let (r1, r2, r3) = futures::join!(s1.query(stmt), s2.query(stmt), p.query(stmt));
        assert!(r1.is_ok() && r2.is_ok() && r3.is_ok());
        assert_eq!(cluster.peak_in_flight_reads(), 3);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let cluster = MemoryCluster::without_table();
        let primary = session(&cluster, Target::Primary).await;
        let err = primary.execute("delete from synchtest").await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        primary
            .execute("create table if not exists synchtest (id int, value int)")
            .await
            .unwrap();
        assert!(cluster.table_exists(Target::Secondary1));
        assert_eq!(primary.execute("delete from synchtest").await.unwrap(), 0);
    }
}
