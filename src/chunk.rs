//! Row-by-row streaming of query results.

use std::{marker::PhantomData, ops::ControlFlow};

use rusqlite::{Connection, Params, Rows};
use tracing::trace;

use crate::{
    context::Context,
    descriptor::describe,
    error::{Error, Result},
    mapper::decode_row,
    record::Record,
    statement::{build_select, Select},
};

/// A query plus the callback that receives each decoded row.
///
/// The callback gets a freshly decoded record per row and returns
/// `ControlFlow::Break(())` to stop early. An error from the callback stops the
/// iteration and is returned as [`Error::Callback`].
pub struct ChunkParser<'q, R, P, F> {
    pub(crate) select: Select<'q, P>,
    pub(crate) for_each: F,
    _record: PhantomData<fn() -> R>,
}

impl<'q, R, P, F> ChunkParser<'q, R, P, F>
where
    R: Record,
    P: Params,
    F: FnMut(R) -> anyhow::Result<ControlFlow<()>>,
{
    pub fn new(query: &'q str, params: P, for_each: F) -> Self {
        Self {
            select: build_select(query, params),
            for_each,
            _record: PhantomData,
        }
    }

    pub fn query(&self) -> &'q str {
        self.select.sql
    }
}

/// Open cursor over a statement's rows. Dropping it resets the statement.
struct Cursor<'s> {
    rows: Rows<'s>,
    query: &'s str,
    read: usize,
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        trace!(query = self.query, rows = self.read, "cursor released");
    }
}

/// Decode each row of `select` into a fresh `R` and hand it to `on_row`.
///
/// Returns the number of rows handed over. The cursor is released on every
/// exit path, including cancellation and errors from `on_row`.
pub(crate) fn stream<R, P>(
    conn: &Connection,
    ctx: &Context,
    select: Select<'_, P>,
    mut on_row: impl FnMut(R) -> Result<ControlFlow<()>>,
) -> Result<usize>
where
    R: Record,
    P: Params,
{
    let descriptor = describe::<R>()?;
    ctx.check()?;

    let mut stmt = conn.prepare(select.sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut cursor = Cursor {
        rows: stmt.query(select.params)?,
        query: select.sql,
        read: 0,
    };

    loop {
        ctx.check()?;
        let Some(row) = cursor.rows.next()? else {
            break;
        };

        let mut record = R::default();
        decode_row(row, &names, &mut record, &descriptor)?;
        cursor.read += 1;

        if on_row(record)?.is_break() {
            break;
        }
    }

    Ok(cursor.read)
}

pub(crate) fn query_chunks<R, P, F>(
    conn: &Connection,
    ctx: &Context,
    parser: ChunkParser<'_, R, P, F>,
) -> Result<usize>
where
    R: Record,
    P: Params,
    F: FnMut(R) -> anyhow::Result<ControlFlow<()>>,
{
    let ChunkParser {
        select,
        mut for_each,
        ..
    } = parser;
    stream(conn, ctx, select, |record| for_each(record).map_err(Error::Callback))
}
