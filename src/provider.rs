use std::ops::ControlFlow;

use rusqlite::{Params, ToSql};

use crate::{chunk::ChunkParser, context::Context, error::Result, record::Record, sqlite::Tx};

/// Persistence operations over one table.
///
/// Implemented by [`Database`](crate::Database) and by the transaction-bound
/// [`Tx`]. Every call takes a [`Context`] and fails with
/// [`Error::Canceled`](crate::Error::Canceled) once it is done.
pub trait Provider {
    /// Insert `records`. Keys generated by the database are written back into
    /// the records whose key was zero. An empty slice is a no-op.
    fn insert<R: Record>(&self, ctx: &Context, records: &mut [R]) -> Result<()>;

    /// Delete the rows whose key is in `ids`. An empty slice is a no-op.
    fn delete<K: ToSql>(&self, ctx: &Context, ids: &[K]) -> Result<()>;

    /// Update each record by key, writing only its present columns.
    fn update<R: Record>(&self, ctx: &Context, records: &[R]) -> Result<()>;

    /// Replace the contents of `dest` with every row returned by `query`.
    fn query<R: Record, P: Params>(
        &self,
        ctx: &Context,
        dest: &mut Vec<R>,
        query: &str,
        params: P,
    ) -> Result<()>;

    /// Decode the first row returned by `query` into `dest`.
    ///
    /// Fails with [`Error::NotFound`](crate::Error::NotFound) when there is none.
    fn query_one<R: Record, P: Params>(
        &self,
        ctx: &Context,
        dest: &mut R,
        query: &str,
        params: P,
    ) -> Result<()>;

    fn query_chunks<R, P, F>(&self, ctx: &Context, parser: ChunkParser<'_, R, P, F>) -> Result<()>
    where
        R: Record,
        P: Params,
        F: FnMut(R) -> anyhow::Result<ControlFlow<()>>;

    /// Run a statement, returning the number of affected rows.
    fn exec<P: Params>(&self, ctx: &Context, query: &str, params: P) -> Result<usize>;

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err` or
    /// panics; a panic is resumed after the rollback.
    fn transaction<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>;
}
