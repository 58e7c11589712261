//! Parallel scan orchestration.
//!
//! The coordinator owns a single shared page cursor; worker threads pull
//! contiguous page-range tasks from it until the table's physical id space
//! is exhausted. Output order across tasks is unspecified.
mod worker;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread::JoinHandle,
};

use parking_lot::Mutex;

use crate::{
    catalog::{self, BoundTable, ScanDescriptor},
    config::Config,
    predicate::PredicateSet,
    types::TargetType,
    vector::DataChunk,
    ErrorKind, Result,
};

use worker::Worker;

/// Default row capacity of one output chunk.
pub const DEFAULT_CHUNK_CAPACITY: usize = 2048;

/// One projected output column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnRef {
    /// A table column, by scan-descriptor index.
    Column(usize),
    /// The synthesized 64-bit row id decoded from `ctid`.
    RowId,
}

/// Knobs of the parallel scan variant.
#[derive(Debug)]
pub struct ScanOptions {
    /// Columns to scan; `None` (or empty) scans every table column.
    pub projection: Option<Vec<ColumnRef>>,
    /// Filters offered for server-side pushdown.
    pub predicates: PredicateSet,
    /// Worker thread count; `0` lets the page estimate decide. Capped at
    /// one worker per page-range task.
    pub workers: usize,
    pub chunk_capacity: usize,
    pub pages_per_task: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            projection: None,
            predicates: PredicateSet::new(),
            workers: 0,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            pages_per_task: catalog::DEFAULT_PAGES_PER_TASK,
        }
    }
}

/// A contiguous range of physical pages assigned to one worker.
///
/// Encoded into the COPY query as a closed `ctid` interval
/// `'(lo,0)' .. '(hi,0)'`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRange {
    pub lo: u32,
    pub hi: u32,
}

/// The scan's only shared mutable cell: the next unassigned page.
pub(crate) struct PageCursor {
    next_page: Mutex<u64>,
}

impl PageCursor {
    pub(crate) fn new() -> PageCursor {
        PageCursor { next_page: Mutex::new(0) }
    }

    /// Hand out the next page-range task, or `None` when the id space is
    /// exhausted. Concurrent callers serialize on the cursor lock.
    pub(crate) fn next_task(&self, desc: &ScanDescriptor) -> Option<PageRange> {
        let mut next_page = self.next_page.lock();

        if *next_page >= desc.approx_pages {
            return None;
        }

        let lo = *next_page as u32;
        let upper = *next_page + desc.pages_per_task;
        // the relpages estimate is not authoritative, so exactly one task
        // (the last) is widened to cover any pages beyond it
        let hi = if upper >= desc.approx_pages { u32::MAX } else { upper as u32 };
        *next_page += desc.pages_per_task;

        Some(PageRange { lo, hi })
    }
}

/// Upper bound of usefully parallel workers for a bound table.
pub fn max_workers(desc: &ScanDescriptor) -> u64 {
    (desc.approx_pages / desc.pages_per_task).max(1)
}

/// Scan a whole table with default options.
pub fn scan(dsn: &str, schema: &str, table: &str) -> Result<ScanStream> {
    scan_with(dsn, schema, table, ScanOptions::default())
}

/// Scan a table with projection, predicate pushdown and worker control.
pub fn scan_with(dsn: &str, schema: &str, table: &str, options: ScanOptions) -> Result<ScanStream> {
    let config = Config::parse(dsn)?;
    let bound = catalog::bind_with(config, schema, table, options.pages_per_task)?;
    let desc = bound.descriptor().clone();

    let projection = match options.projection {
        Some(projection) if !projection.is_empty() => projection,
        _ => (0..desc.columns.len()).map(ColumnRef::Column).collect(),
    };
    for column in &projection {
        if let ColumnRef::Column(idx) = column {
            if *idx >= desc.columns.len() {
                return Err(ErrorKind::ColumnIndexOutOfBounds.into());
            }
        }
    }

    let output_types: Vec<TargetType> = projection
        .iter()
        .map(|column| match column {
            ColumnRef::RowId => TargetType::Int64,
            ColumnRef::Column(idx) => desc.columns[*idx].target.clone(),
        })
        .collect();

    let predicate_sql = options.predicates.render(&desc.columns);

    let workers = match options.workers {
        0 => max_workers(&desc),
        n => (n as u64).min(max_workers(&desc)),
    } as usize;

    tracing::debug!(workers, pages = desc.approx_pages, "starting scan");

    let cursor = Arc::new(PageCursor::new());
    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::sync_channel(workers * 2);

    let projection = Arc::new(projection);
    let output_types = Arc::new(output_types);
    let predicate_sql = Arc::new(predicate_sql);

    let mut handles = Vec::with_capacity(workers);
    for id in 0..workers {
        let worker = Worker {
            desc: desc.clone(),
            cursor: cursor.clone(),
            projection: projection.clone(),
            output_types: output_types.clone(),
            predicate_sql: predicate_sql.clone(),
            cancel: cancel.clone(),
            chunk_capacity: options.chunk_capacity,
            out: tx.clone(),
        };
        let handle = std::thread::Builder::new()
            .name(format!("postscan-worker-{id}"))
            .spawn(move || worker.run())?;
        handles.push(handle);
    }
    drop(tx);

    Ok(ScanStream {
        desc,
        rx,
        handles,
        cancel,
        bound: Some(bound),
        done: false,
    })
}

/// Iterator over the columnar chunks of a running scan.
///
/// Dropping the stream cancels the scan, joins the workers and releases
/// every connection.
pub struct ScanStream {
    desc: Arc<ScanDescriptor>,
    rx: mpsc::Receiver<Result<DataChunk>>,
    handles: Vec<JoinHandle<()>>,
    cancel: Arc<AtomicBool>,
    bound: Option<BoundTable>,
    done: bool,
}

impl ScanStream {
    /// The scan descriptor the chunks conform to.
    pub fn descriptor(&self) -> &ScanDescriptor {
        &self.desc
    }

    /// Request cooperative cancellation; workers observe the flag between
    /// tuples and between COPY messages.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    fn finish(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        if let Some(bound) = self.bound.take() {
            let _ = bound.close();
        }
    }
}

impl Iterator for ScanStream {
    type Item = Result<DataChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.rx.recv() {
            Ok(Ok(chunk)) => Some(Ok(chunk)),
            // a worker failure aborts the scan
            Ok(Err(e)) => {
                self.done = true;
                self.cancel();
                Some(Err(e))
            }
            // every sender gone: all workers exhausted
            Err(_) => {
                self.done = true;
                self.finish();
                None
            }
        }
    }
}

impl Drop for ScanStream {
    fn drop(&mut self) {
        self.cancel();
        // unblock workers parked on a full channel until they all exit
        while self.rx.recv().is_ok() {}
        self.finish();
    }
}
