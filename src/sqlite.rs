use std::{
    ops::ControlFlow,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use parking_lot::ReentrantMutex;
use rusqlite::{params_from_iter, Connection, Params, ToSql};
use tracing::{debug, error, info, warn};

use crate::{
    chunk::{self, stream, ChunkParser},
    context::Context,
    descriptor::describe,
    error::{Error, Result},
    provider::Provider,
    record::Record,
    statement::{build_delete, build_insert, build_select, build_update, MAX_BIND_PARAMS},
    value::Value,
};

/// SQLite provider configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Path to the SQLite database file
    pub db_path: String,
    /// Table every record is read from and written to
    pub table_name: String,
    /// How long to wait on a locked database before failing
    pub busy_timeout: Option<Duration>,
}

impl Config {
    pub fn new(db_path: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            table_name: table_name.into(),
            busy_timeout: None,
        }
    }

    pub fn in_memory(table_name: impl Into<String>) -> Self {
        Self::new(":memory:", table_name)
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }
}

/// Virtual machine steps between two looks at the running calls' contexts.
const PROGRESS_OPS: i32 = 1000;

/// A [`Provider`] over a single SQLite connection.
///
/// Calls from different threads are serialized on the connection. The lock is
/// reentrant, so a `query_chunks` callback may call back into the same
/// `Database` while its cursor is open.
#[derive(Debug)]
pub struct Database {
    connection: ReentrantMutex<Connection>,
    watch: Watch,
    table_name: String,
}

impl Database {
    pub fn open(config: Config) -> Result<Self> {
        info!(
            path = %config.db_path,
            table = %config.table_name,
            "opening sqlite database"
        );
        let connection = Connection::open(&config.db_path)?;
        if let Some(timeout) = config.busy_timeout {
            connection.busy_timeout(timeout)?;
        }
        Ok(Self::from_connection(connection, config.table_name))
    }

    /// Wrap an already open connection.
    pub fn from_connection(connection: Connection, table_name: impl Into<String>) -> Self {
        let watch = Watch::default();
        watch.install(&connection);
        Self {
            connection: ReentrantMutex::new(connection),
            watch,
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn session<T>(&self, f: impl FnOnce(Session<'_>) -> Result<T>) -> Result<T> {
        let conn = self.connection.lock();
        f(Session {
            conn: &conn,
            watch: &self.watch,
            table: &self.table_name,
        })
    }
}

/// Contexts of the provider calls currently running on a connection.
///
/// The connection's progress handler interrupts the running statement as soon
/// as any of them is canceled or past its deadline, which surfaces as
/// [`Error::Canceled`].
#[derive(Debug, Clone, Default)]
struct Watch(Arc<Mutex<Vec<Context>>>);

impl Watch {
    fn install(&self, conn: &Connection) {
        let watch = self.clone();
        conn.progress_handler(PROGRESS_OPS, Some(move || watch.any_done()));
    }

    fn any_done(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(Context::is_done)
    }

    fn enter(&self, ctx: &Context) -> Watched<'_> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ctx.clone());
        Watched { watch: self }
    }
}

/// Removes its context from the [`Watch`] on drop.
struct Watched<'w> {
    watch: &'w Watch,
}

impl Drop for Watched<'_> {
    fn drop(&mut self) {
        self.watch
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
    }
}

impl Provider for Database {
    fn insert<R: Record>(&self, ctx: &Context, records: &mut [R]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.session(|s| s.insert(ctx, records))
    }

    fn delete<K: ToSql>(&self, ctx: &Context, ids: &[K]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.session(|s| s.delete(ctx, ids))
    }

    fn update<R: Record>(&self, ctx: &Context, records: &[R]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.session(|s| s.update(ctx, records))
    }

    fn query<R: Record, P: Params>(
        &self,
        ctx: &Context,
        dest: &mut Vec<R>,
        query: &str,
        params: P,
    ) -> Result<()> {
        self.session(|s| s.query(ctx, dest, query, params))
    }

    fn query_one<R: Record, P: Params>(
        &self,
        ctx: &Context,
        dest: &mut R,
        query: &str,
        params: P,
    ) -> Result<()> {
        self.session(|s| s.query_one(ctx, dest, query, params))
    }

    fn query_chunks<R, P, F>(&self, ctx: &Context, parser: ChunkParser<'_, R, P, F>) -> Result<()>
    where
        R: Record,
        P: Params,
        F: FnMut(R) -> anyhow::Result<ControlFlow<()>>,
    {
        self.session(|s| s.query_chunks(ctx, parser))
    }

    fn exec<P: Params>(&self, ctx: &Context, query: &str, params: P) -> Result<usize> {
        self.session(|s| s.exec(ctx, query, params))
    }

    fn transaction<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        self.session(|s| s.transaction(ctx, 0, f))
    }
}

/// A [`Provider`] bound to one open transaction.
///
/// Everything issued through it runs inside that transaction. Calling
/// [`Provider::transaction`] on a `Tx` opens a savepoint.
pub struct Tx<'c> {
    session: Session<'c>,
    depth: usize,
}

impl Tx<'_> {
    pub fn table_name(&self) -> &str {
        self.session.table
    }
}

impl Provider for Tx<'_> {
    fn insert<R: Record>(&self, ctx: &Context, records: &mut [R]) -> Result<()> {
        self.session.insert(ctx, records)
    }

    fn delete<K: ToSql>(&self, ctx: &Context, ids: &[K]) -> Result<()> {
        self.session.delete(ctx, ids)
    }

    fn update<R: Record>(&self, ctx: &Context, records: &[R]) -> Result<()> {
        self.session.update(ctx, records)
    }

    fn query<R: Record, P: Params>(
        &self,
        ctx: &Context,
        dest: &mut Vec<R>,
        query: &str,
        params: P,
    ) -> Result<()> {
        self.session.query(ctx, dest, query, params)
    }

    fn query_one<R: Record, P: Params>(
        &self,
        ctx: &Context,
        dest: &mut R,
        query: &str,
        params: P,
    ) -> Result<()> {
        self.session.query_one(ctx, dest, query, params)
    }

    fn query_chunks<R, P, F>(&self, ctx: &Context, parser: ChunkParser<'_, R, P, F>) -> Result<()>
    where
        R: Record,
        P: Params,
        F: FnMut(R) -> anyhow::Result<ControlFlow<()>>,
    {
        self.session.query_chunks(ctx, parser)
    }

    fn exec<P: Params>(&self, ctx: &Context, query: &str, params: P) -> Result<usize> {
        self.session.exec(ctx, query, params)
    }

    fn transaction<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        self.session.transaction(ctx, self.depth, f)
    }
}

#[derive(Clone, Copy)]
struct Session<'c> {
    conn: &'c Connection,
    watch: &'c Watch,
    table: &'c str,
}

impl<'c> Session<'c> {
    fn insert<R: Record>(self, ctx: &Context, records: &mut [R]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let _watched = self.watch.enter(ctx);
        let descriptor = describe::<R>()?;
        let key = descriptor.key();

        for stmt in build_insert(&descriptor, records)? {
            ctx.check()?;
            let sql = stmt.sql(self.table);
            debug!(%sql, rows = stmt.rows.len(), "insert");

            if !stmt.generated_key {
                self.conn.execute(&sql, params_from_iter(stmt.args.iter()))?;
                continue;
            }

            // Rowids handed out by a single statement are increasing, so
            // sorted keys line up with the order the rows were listed in.
            let mut prepared = self.conn.prepare(&sql)?;
            let mut keys = prepared
                .query_map(params_from_iter(stmt.args.iter()), |row| {
                    Value::try_from(row.get_ref(0)?).map_err(rusqlite::Error::Utf8Error)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            keys.sort_by_key(|key| match key {
                Value::Integer(v) => *v,
                _ => i64::MAX,
            });

            for (&idx, value) in stmt.rows.iter().zip(keys) {
                key.decode(&mut records[idx], value)?;
            }
        }
        Ok(())
    }

    fn delete<K: ToSql>(self, ctx: &Context, ids: &[K]) -> Result<()> {
        let _watched = self.watch.enter(ctx);
        for batch in ids.chunks(MAX_BIND_PARAMS) {
            let Some(stmt) = build_delete(batch) else {
                continue;
            };
            ctx.check()?;
            let sql = stmt.sql(self.table);
            debug!(%sql, ids = batch.len(), "delete");
            self.conn.execute(&sql, stmt.args.as_slice())?;
        }
        Ok(())
    }

    fn update<R: Record>(self, ctx: &Context, records: &[R]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let _watched = self.watch.enter(ctx);
        let descriptor = describe::<R>()?;

        for record in records {
            let stmt = build_update(&descriptor, record)?;
            if stmt.is_empty() {
                debug!(key = ?stmt.key, "update has no columns to set, skipping");
                continue;
            }
            ctx.check()?;
            let sql = stmt.sql(self.table);
            debug!(%sql, "update");
            self.conn.execute(&sql, params_from_iter(stmt.bound_args()))?;
        }
        Ok(())
    }

    fn query<R: Record, P: Params>(
        self,
        ctx: &Context,
        dest: &mut Vec<R>,
        query: &str,
        params: P,
    ) -> Result<()> {
        let _watched = self.watch.enter(ctx);
        debug!(sql = query, "query");
        let mut records = Vec::new();
        stream(self.conn, ctx, build_select(query, params), |record| {
            records.push(record);
            Ok(ControlFlow::Continue(()))
        })?;
        *dest = records;
        Ok(())
    }

    fn query_one<R: Record, P: Params>(
        self,
        ctx: &Context,
        dest: &mut R,
        query: &str,
        params: P,
    ) -> Result<()> {
        let _watched = self.watch.enter(ctx);
        debug!(sql = query, "query one");
        let mut found = None;
        stream(self.conn, ctx, build_select(query, params), |record| {
            found = Some(record);
            Ok(ControlFlow::Break(()))
        })?;
        *dest = found.ok_or(Error::NotFound)?;
        Ok(())
    }

    fn query_chunks<R, P, F>(self, ctx: &Context, parser: ChunkParser<'_, R, P, F>) -> Result<()>
    where
        R: Record,
        P: Params,
        F: FnMut(R) -> anyhow::Result<ControlFlow<()>>,
    {
        let _watched = self.watch.enter(ctx);
        debug!(sql = parser.query(), "query chunks");
        let rows = chunk::query_chunks(self.conn, ctx, parser)?;
        debug!(rows, "query chunks finished");
        Ok(())
    }

    fn exec<P: Params>(self, ctx: &Context, query: &str, params: P) -> Result<usize> {
        let _watched = self.watch.enter(ctx);
        ctx.check()?;
        debug!(sql = query, "exec");
        Ok(self.conn.execute(query, params)?)
    }

    fn transaction<T, F>(self, ctx: &Context, depth: usize, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        let _watched = self.watch.enter(ctx);
        ctx.check()?;
        let scope = Scope::begin(self.conn, depth)?;
        let tx = Tx {
            session: self,
            depth: depth + 1,
        };

        // A panic in `f` unwinds through `scope`, whose drop rolls back.
        match f(&tx) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(err) => {
                scope.rollback();
                Err(err)
            }
        }
    }
}

/// An open transaction (depth 0) or savepoint (depth > 0).
///
/// Rolled back on drop unless committed.
struct Scope<'c> {
    conn: &'c Connection,
    depth: usize,
    open: bool,
}

impl<'c> Scope<'c> {
    fn begin(conn: &'c Connection, depth: usize) -> Result<Self> {
        let sql = match depth {
            0 => "BEGIN".to_string(),
            _ => format!("SAVEPOINT sp_{depth}"),
        };
        debug!(%sql, "begin transaction");
        conn.execute_batch(&sql)?;
        Ok(Self {
            conn,
            depth,
            open: true,
        })
    }

    fn commit(mut self) -> Result<()> {
        let sql = match self.depth {
            0 => "COMMIT".to_string(),
            depth => format!("RELEASE sp_{depth}"),
        };
        debug!(%sql, "commit transaction");
        // On failure `self` is dropped still open, which rolls back.
        self.conn.execute_batch(&sql)?;
        self.open = false;
        Ok(())
    }

    fn rollback(mut self) {
        self.open = false;
        self.undo();
    }

    fn undo(&self) {
        let sql = match self.depth {
            0 => "ROLLBACK".to_string(),
            depth => format!("ROLLBACK TO sp_{depth}; RELEASE sp_{depth}"),
        };
        debug!(%sql, "rollback transaction");
        if let Err(err) = self.conn.execute_batch(&sql) {
            error!(%err, depth = self.depth, "rollback failed");
        }
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if self.open {
            warn!(depth = self.depth, "transaction abandoned, rolling back");
            self.undo();
        }
    }
}
