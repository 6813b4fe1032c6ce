//! Batched execution of one prepared statement across many rows.
//!
//! A [`TransactionSequence`] prepares its statement once and executes it
//! per row inside an explicit transaction. Every `rows_per_transaction`
//! rows the transaction commits and a fresh one begins on the next row; the
//! prepared statement is kept across the boundary. If the connection is
//! already inside a transaction when the sequence is created, the sequence
//! joins it and leaves commit and rollback to the transaction's owner.
//!
//! Rows executed through [`execute_rows`](TransactionSequence::execute_rows)
//! are accepted (marked clean) only once the transaction holding them has
//! committed. A failing row rolls back the in-flight transaction: rows of
//! earlier windows stay durable and clean, rows of the failed window stay
//! dirty. A joined sequence never accepts rows since its writes are not
//! durable until the owner commits; the owner accepts them after that.
//!
//! # Example
//!
//! ```
//! use carnassial_sqlite::TransactionSequence;
//! use rusqlite::Connection;
//!
//! let conn = Connection::open_in_memory().unwrap();
//! conn.execute_batch("CREATE TABLE Numbers (Value INTEGER)").unwrap();
//!
//! let mut sequence = TransactionSequence::new(&conn, "INSERT INTO Numbers (Value) VALUES (?1)", 2).unwrap();
//! for value in 0..5 {
//!     sequence.execute([value]).unwrap();
//! }
//! sequence.commit().unwrap();
//! assert_eq!(sequence.commits(), 3);
//! assert_eq!(sequence.rows_committed(), 5);
//! ```

use carnassial_core::Control;
use rusqlite::types::Value;
use rusqlite::{Connection, Params, Statement, Transaction, params_from_iter};
use tracing::{debug, warn};

use crate::error::Result;
use crate::file_row::{FileRow, INVALID_ID};

/// Rows whose persistence is tracked by a change flag and a store assigned
/// ID.
pub trait ChangeTracked {
    /// Whether the row differs from its stored state.
    fn has_changes(&self) -> bool;
    /// Marks the row as matching its stored state.
    fn accept_changes(&mut self);
    /// Records the ID the store assigned on insert.
    fn set_id(&mut self, id: i64);
}

impl ChangeTracked for FileRow {
    fn has_changes(&self) -> bool {
        FileRow::has_changes(self)
    }

    fn accept_changes(&mut self) {
        FileRow::accept_changes(self);
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

impl ChangeTracked for Control {
    fn has_changes(&self) -> bool {
        Control::has_changes(self)
    }

    fn accept_changes(&mut self) {
        Control::accept_changes(self);
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

/// How [`TransactionSequence::execute_rows`] treats each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowPolicy {
    /// Skip rows without changes.
    pub skip_unchanged: bool,
    /// Record the inserted row ID on each row.
    pub assign_ids: bool,
}

impl RowPolicy {
    /// Inserting new rows: every row, IDs assigned, accepted on commit.
    pub const INSERT: RowPolicy = RowPolicy {
        skip_unchanged: false,
        assign_ids: true,
    };

    /// Writing back edited rows: changed rows only, accepted on commit.
    pub const UPDATE: RowPolicy = RowPolicy {
        skip_unchanged: true,
        assign_ids: false,
    };
}

/// One prepared statement executed in windows of rows.
pub struct TransactionSequence<'c> {
    // declared before the transaction so it is finalized first
    statement: Statement<'c>,
    transaction: Option<Transaction<'c>>,
    conn: &'c Connection,
    joined: bool,
    rows_per_transaction: usize,
    rows_in_transaction: usize,
    rows_committed: usize,
    commits: usize,
}

impl<'c> TransactionSequence<'c> {
    /// Prepares `sql` for execution in windows of `rows_per_transaction`
    /// rows. A window of zero is treated as one.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError`](crate::SqliteError::DatabaseError) if the
    /// statement does not prepare, for example because a column is missing.
    pub fn new(conn: &'c Connection, sql: &str, rows_per_transaction: usize) -> Result<Self> {
        let statement = conn.prepare(sql)?;
        let joined = !conn.is_autocommit();
        if joined {
            debug!("transaction sequence joining the open transaction");
        }
        Ok(Self {
            statement,
            transaction: None,
            conn,
            joined,
            rows_per_transaction: rows_per_transaction.max(1),
            rows_in_transaction: 0,
            rows_committed: 0,
            commits: 0,
        })
    }

    /// Whether the sequence runs inside a transaction owned by the caller.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Number of transactions committed.
    pub fn commits(&self) -> usize {
        self.commits
    }

    /// Rows executed in windows which have closed.
    pub fn rows_committed(&self) -> usize {
        self.rows_committed
    }

    /// Rows executed in the current, uncommitted window.
    pub fn rows_in_transaction(&self) -> usize {
        self.rows_in_transaction
    }

    /// Row ID of the most recent insert on the connection.
    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Executes the statement for one row, beginning a transaction first if
    /// none is open.
    ///
    /// Returns `true` if this row filled the window and it was committed. A
    /// joined sequence always returns `false`.
    ///
    /// # Errors
    ///
    /// Returns the statement's error after rolling back the open
    /// transaction.
    pub fn execute<P: Params>(&mut self, params: P) -> Result<bool> {
        if !self.joined && self.transaction.is_none() {
            self.transaction = Some(self.conn.unchecked_transaction()?);
        }
        if let Err(error) = self.statement.execute(params) {
            self.rollback();
            return Err(error.into());
        }
        self.rows_in_transaction += 1;
        if self.rows_in_transaction >= self.rows_per_transaction {
            self.commit()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Commits the current window.
    ///
    /// Returns `false` if no rows were pending. A joined sequence closes the
    /// window without committing and returns `false`, since nothing became
    /// durable.
    pub fn commit(&mut self) -> Result<bool> {
        if self.rows_in_transaction == 0 {
            return Ok(false);
        }
        let durable = match self.transaction.take() {
            Some(transaction) => {
                transaction.commit()?;
                self.commits += 1;
                debug!(
                    rows = self.rows_in_transaction,
                    total = self.rows_committed + self.rows_in_transaction,
                    "committed transaction window"
                );
                true
            }
            None => false,
        };
        self.rows_committed += self.rows_in_transaction;
        self.rows_in_transaction = 0;
        Ok(durable)
    }

    fn rollback(&mut self) {
        if let Some(transaction) = self.transaction.take() {
            if let Err(error) = transaction.rollback() {
                warn!(%error, "rollback of failed transaction window failed");
            }
        }
        if self.rows_in_transaction > 0 {
            warn!(rows = self.rows_in_transaction, "rolled back transaction window");
        }
        self.rows_in_transaction = 0;
    }

    /// Executes the statement for each row and commits the trailing window.
    ///
    /// `bind` produces a row's parameters in statement order. Returns the
    /// number of rows executed.
    ///
    /// # Errors
    ///
    /// Stops at the first failing row. Rows committed in earlier windows
    /// keep their IDs and are clean; IDs assigned in the failed window are
    /// reset to [`INVALID_ID`]. In a joined sequence no window is durable,
    /// so every row keeps its change flag whether or not the call succeeds.
    pub fn execute_rows<'r, R, I, F>(&mut self, rows: I, policy: RowPolicy, mut bind: F) -> Result<usize>
    where
        R: ChangeTracked + 'r,
        I: IntoIterator<Item = &'r mut R>,
        F: FnMut(&R) -> Vec<Value>,
    {
        let mut pending: Vec<&'r mut R> = Vec::new();
        let mut executed = 0;
        for row in rows {
            if policy.skip_unchanged && !row.has_changes() {
                continue;
            }
            let values = bind(&*row);
            let committed = match self.execute(params_from_iter(values)) {
                Ok(committed) => committed,
                Err(error) => {
                    discard(&mut pending, policy);
                    return Err(error);
                }
            };
            if policy.assign_ids {
                row.set_id(self.last_insert_rowid());
            }
            pending.push(row);
            executed += 1;
            if committed {
                accept(&mut pending);
            }
        }

        match self.commit() {
            Err(error) => {
                discard(&mut pending, policy);
                return Err(error);
            }
            Ok(_) if self.joined => pending.clear(),
            Ok(_) => accept(&mut pending),
        }
        Ok(executed)
    }
}

fn accept<R: ChangeTracked>(pending: &mut Vec<&mut R>) {
    for row in pending.drain(..) {
        row.accept_changes();
    }
}

fn discard<R: ChangeTracked>(pending: &mut Vec<&mut R>, policy: RowPolicy) {
    for row in pending.drain(..) {
        if policy.assign_ids {
            row.set_id(INVALID_ID);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Item {
        id: i64,
        value: i64,
        changed: bool,
    }

    impl Item {
        fn new(value: i64) -> Self {
            Self {
                id: INVALID_ID,
                value,
                changed: true,
            }
        }
    }

    impl ChangeTracked for Item {
        fn has_changes(&self) -> bool {
            self.changed
        }

        fn accept_changes(&mut self) {
            self.changed = false;
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    fn connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Items (Id INTEGER PRIMARY KEY AUTOINCREMENT, Value INTEGER NOT NULL CHECK (Value >= 0))",
        )
        .unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM Items", [], |row| row.get(0)).unwrap()
    }

    const INSERT: &str = "INSERT INTO Items (Value) VALUES (?1)";

    #[test]
    fn test_windows_commit_every_n_rows() {
        let conn = connection();
        let mut items: Vec<Item> = (0..25).map(Item::new).collect();
        let mut sequence = TransactionSequence::new(&conn, INSERT, 10).unwrap();
        let executed = sequence
            .execute_rows(items.iter_mut(), RowPolicy::INSERT, |item| vec![Value::Integer(item.value)])
            .unwrap();
        assert_eq!(executed, 25);
        assert_eq!(sequence.commits(), 3);
        drop(sequence);

        assert_eq!(count(&conn), 25);
        assert!(conn.is_autocommit());
        assert!(items.iter().all(|item| !item.changed));
        assert_eq!(items[24].id, 25);
    }

    #[test]
    fn test_failure_rolls_back_only_the_open_window() {
        let conn = connection();
        let mut items: Vec<Item> = (0..25).map(Item::new).collect();
        items[13].value = -1;
        let mut sequence = TransactionSequence::new(&conn, INSERT, 10).unwrap();
        let result = sequence.execute_rows(items.iter_mut(), RowPolicy::INSERT, |item| vec![Value::Integer(item.value)]);
        assert!(result.is_err());
        assert_eq!(sequence.commits(), 1);
        drop(sequence);

        assert_eq!(count(&conn), 10);
        assert!(conn.is_autocommit());
        assert!(items[..10].iter().all(|item| !item.changed && item.id > 0));
        assert!(items[10..].iter().all(|item| item.changed && item.id == INVALID_ID));
    }

    #[test]
    fn test_unchanged_rows_are_skipped() {
        let conn = connection();
        let mut items: Vec<Item> = (0..4).map(Item::new).collect();
        let mut sequence = TransactionSequence::new(&conn, INSERT, 10).unwrap();
        sequence
            .execute_rows(items.iter_mut(), RowPolicy::INSERT, |item| vec![Value::Integer(item.value)])
            .unwrap();
        drop(sequence);

        items[2].value = 7;
        items[2].changed = true;
        let mut update = TransactionSequence::new(&conn, "UPDATE Items SET Value = ?1 WHERE Id = ?2", 10).unwrap();
        let executed = update
            .execute_rows(items.iter_mut(), RowPolicy::UPDATE, |item| {
                vec![Value::Integer(item.value), Value::Integer(item.id)]
            })
            .unwrap();
        assert_eq!(executed, 1);
        assert!(!items[2].changed);
        drop(update);
        let stored: i64 = conn
            .query_row("SELECT Value FROM Items WHERE Id = ?1", [items[2].id], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, 7);
    }

    #[test]
    fn test_joined_sequence_leaves_commit_to_owner() {
        let conn = connection();
        let transaction = conn.unchecked_transaction().unwrap();
        let mut sequence = TransactionSequence::new(&conn, INSERT, 2).unwrap();
        assert!(sequence.is_joined());
        for value in 0..5 {
            sequence.execute([value]).unwrap();
        }
        sequence.commit().unwrap();
        assert_eq!(sequence.commits(), 0);
        assert_eq!(sequence.rows_committed(), 5);
        drop(sequence);
        transaction.rollback().unwrap();
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_joined_rows_stay_dirty_after_owner_rollback() {
        let conn = connection();
        let mut items: Vec<Item> = (0..5).map(Item::new).collect();
        let transaction = conn.unchecked_transaction().unwrap();
        let mut sequence = TransactionSequence::new(&conn, INSERT, 2).unwrap();
        let executed = sequence
            .execute_rows(items.iter_mut(), RowPolicy::INSERT, |item| vec![Value::Integer(item.value)])
            .unwrap();
        assert_eq!(executed, 5);
        drop(sequence);
        assert!(items.iter().all(|item| item.changed));

        transaction.rollback().unwrap();
        assert_eq!(count(&conn), 0);
        assert!(items.iter().all(|item| item.changed));
    }

    #[test]
    fn test_commit_without_rows() {
        let conn = connection();
        let mut sequence = TransactionSequence::new(&conn, INSERT, 2).unwrap();
        assert!(!sequence.commit().unwrap());
        assert_eq!(sequence.commits(), 0);
    }

    #[test]
    fn test_statement_for_missing_column_does_not_prepare() {
        let conn = connection();
        assert!(TransactionSequence::new(&conn, "INSERT INTO Items (Missing) VALUES (?1)", 2).is_err());
    }
}
