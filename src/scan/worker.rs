//! Per-worker scan runtime.
//!
//! Each worker owns one replica connection, adopts the bind snapshot, and
//! loops over page-range tasks: open a binary COPY for the range, drive the
//! wire decoder, and publish full chunks downstream.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::SyncSender,
    Arc,
};

use crate::{
    catalog::ScanDescriptor,
    codec::{self, WireDecoder},
    connection::Connection,
    postgres::ProtocolError,
    scan::{ColumnRef, PageCursor, PageRange},
    sql::{quote_ident, quote_literal},
    types::TargetType,
    vector::{ColumnData, DataChunk},
    ErrorKind, Result,
};

pub(crate) struct Worker {
    pub desc: Arc<ScanDescriptor>,
    pub cursor: Arc<PageCursor>,
    pub projection: Arc<Vec<ColumnRef>>,
    pub output_types: Arc<Vec<TargetType>>,
    pub predicate_sql: Arc<String>,
    pub cancel: Arc<AtomicBool>,
    pub chunk_capacity: usize,
    pub out: SyncSender<Result<DataChunk>>,
}

impl Worker {
    pub(crate) fn run(self) {
        match self.scan_partitions() {
            Ok(()) => {}
            // cancellation is a clean termination, not a failure
            Err(e) if e.is_canceled() => tracing::debug!("worker canceled"),
            Err(e) => {
                let _ = self.out.send(Err(e));
            }
        }
    }

    fn check_canceled(&self) -> Result<()> {
        match self.cancel.load(Ordering::Relaxed) {
            true => Err(ErrorKind::Canceled.into()),
            false => Ok(()),
        }
    }

    fn scan_partitions(&self) -> Result<()> {
        let mut conn =
            Connection::connect(&self.desc.config).map_err(|e| e.context("scan worker"))?;

        conn.execute("BEGIN TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")?;
        // adopt the bind snapshot so every worker sees the same table state;
        // in recovery there is none and reads are best-effort
        if let Some(snapshot) = &self.desc.snapshot {
            conn.execute(&format!("SET TRANSACTION SNAPSHOT {}", quote_literal(snapshot)))?;
        }

        match self.drain_tasks(&mut conn) {
            Ok(()) => conn.close(),
            // a cooperative stop leaves the socket healthy, so still part
            // with a Terminate; the open COPY dies with the connection
            Err(e) if e.is_canceled() => {
                let _ = conn.close();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn drain_tasks(&self, conn: &mut Connection) -> Result<()> {
        let mut decoder = WireDecoder::new();
        let mut chunk = DataChunk::new(&self.output_types, self.chunk_capacity);

        while let Some(range) = self.cursor.next_task(&self.desc) {
            self.check_canceled()?;
            tracing::debug!(lo = range.lo, hi = range.hi, "scanning page range");
            self.copy_range(conn, &mut decoder, range, &mut chunk)?;
        }

        if !chunk.is_empty() {
            self.publish(chunk)?;
        }
        Ok(())
    }

    /// Drive one `COPY .. TO STDOUT (FORMAT binary)` over a page range,
    /// decoding every tuple into the current chunk.
    fn copy_range(
        &self,
        conn: &mut Connection,
        decoder: &mut WireDecoder,
        range: PageRange,
        chunk: &mut DataChunk,
    ) -> Result<()> {
        conn.copy_out(&self.copy_sql(range))?;

        // the first message carries the 19-byte header; the first tuple may
        // immediately follow it within the same message
        let first = conn
            .copy_chunk()?
            .ok_or(ProtocolError::truncated("COPY stream"))?;
        decoder.feed(first);
        decoder.read_header()?;

        loop {
            self.check_canceled()?;

            if decoder.remaining() == 0 {
                decoder.clear();
                let Some(message) = conn.copy_chunk()? else {
                    return Err(ProtocolError::truncated("COPY trailer").into());
                };
                decoder.feed(message);
            }

            let field_count = decoder.read_tuple_count()?;
            if field_count == -1 {
                // end of stream; drain the copy tail and go back for a task
                decoder.clear();
                return conn.copy_finish();
            }
            if field_count as usize != self.projection.len() {
                return Err(ProtocolError::malformed("tuple field count mismatch").into());
            }

            for (idx, column) in self.projection.iter().enumerate() {
                let out = &mut chunk.columns[idx];
                match (column, decoder.read_field()?) {
                    (_, None) => out.push_null(),
                    (ColumnRef::RowId, Some(payload)) => {
                        let row_id = codec::decode_row_id(&payload)?;
                        let ColumnData::Int64(values) = &mut out.data else {
                            return Err(ProtocolError::malformed("row id column storage").into());
                        };
                        values.push(row_id);
                        out.validity.push(true);
                    }
                    (ColumnRef::Column(ci), Some(payload)) => {
                        codec::decode_value(&self.desc.columns[*ci], &payload, out)?;
                    }
                }
            }
            chunk.advance_row();

            if chunk.is_full() {
                let full = std::mem::replace(
                    chunk,
                    DataChunk::new(&self.output_types, self.chunk_capacity),
                );
                self.publish(full)?;
            }
        }
    }

    fn publish(&self, chunk: DataChunk) -> Result<()> {
        // a dropped receiver means the scan is being torn down
        self.out
            .send(Ok(chunk))
            .map_err(|_| ErrorKind::Canceled.into())
    }

    fn copy_sql(&self, range: PageRange) -> String {
        let mut columns = String::new();
        for column in self.projection.iter() {
            if !columns.is_empty() {
                columns.push_str(", ");
            }
            match column {
                ColumnRef::RowId => columns.push_str("ctid"),
                ColumnRef::Column(idx) => {
                    let descriptor = &self.desc.columns[*idx];
                    columns.push_str(&quote_ident(&descriptor.name));
                    if descriptor.needs_text_cast {
                        columns.push_str("::VARCHAR");
                    }
                }
            }
        }

        format!(
            "COPY (SELECT {columns} FROM {}.{} \
             WHERE ctid BETWEEN '({},0)'::tid AND '({},0)'::tid{}) \
             TO STDOUT (FORMAT binary)",
            quote_ident(&self.desc.schema),
            quote_ident(&self.desc.table),
            range.lo,
            range.hi,
            self.predicate_sql,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::tests::column, config::Config, predicate, predicate::PredicateSet};

    fn worker(projection: Vec<ColumnRef>, predicate_sql: &str) -> Worker {
        let desc = ScanDescriptor {
            config: Config::parse("postgres://localhost/db").unwrap(),
            schema: "public".into(),
            table: "tbl".into(),
            columns: vec![
                column("v", "int4", TargetType::Int32),
                {
                    let mut c = column("raw", "tsvector", TargetType::Text);
                    c.needs_text_cast = true;
                    c
                },
            ],
            approx_pages: 1,
            snapshot: None,
            in_recovery: false,
            pages_per_task: 1000,
        };
        let output_types = projection
            .iter()
            .map(|c| match c {
                ColumnRef::RowId => TargetType::Int64,
                ColumnRef::Column(i) => desc.columns[*i].target.clone(),
            })
            .collect();
        let (out, _rx) = std::sync::mpsc::sync_channel(1);
        Worker {
            desc: Arc::new(desc),
            cursor: Arc::new(PageCursor::new()),
            projection: Arc::new(projection),
            output_types: Arc::new(output_types),
            predicate_sql: Arc::new(predicate_sql.into()),
            cancel: Arc::new(AtomicBool::new(false)),
            chunk_capacity: 2048,
            out,
        }
    }

    #[test]
    fn copy_sql_shape() {
        let w = worker(vec![ColumnRef::RowId, ColumnRef::Column(0)], "");
        assert_eq!(
            w.copy_sql(PageRange { lo: 0, hi: u32::MAX }),
            "COPY (SELECT ctid, \"v\" FROM \"public\".\"tbl\" \
             WHERE ctid BETWEEN '(0,0)'::tid AND '(4294967295,0)'::tid) \
             TO STDOUT (FORMAT binary)",
        );
    }

    #[test]
    fn unsupported_columns_are_cast_to_text() {
        let w = worker(vec![ColumnRef::Column(1)], "");
        let sql = w.copy_sql(PageRange { lo: 10, hi: 20 });
        assert!(sql.contains("\"raw\"::VARCHAR"));
        assert!(sql.contains("BETWEEN '(10,0)'::tid AND '(20,0)'::tid"));
    }

    #[test]
    fn predicate_fragment_is_appended() {
        let desc_columns = vec![column("v", "int4", TargetType::Int32)];
        let mut set = PredicateSet::new();
        set.push(predicate::Predicate::Compare {
            column: 0,
            op: predicate::CompareOp::Gt,
            value: "10".into(),
        });
        let fragment = set.render(&desc_columns);
        let w = worker(vec![ColumnRef::Column(0)], &fragment);
        let sql = w.copy_sql(PageRange { lo: 0, hi: 5 });
        assert!(sql.contains("'(5,0)'::tid AND (\"v\" > '10')"), "{sql}");
    }
}
