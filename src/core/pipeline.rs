//! Running one pipeline stage over a record stream
//!
//! Records are pulled from the reader only as fast as the bounded window of
//! in-flight futures drains, so a slow routing provider throttles input reading
//! instead of letting work pile up.

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use catchment_common::Result;

use super::error::SkipReason;
use super::stream::{records, MalformedCounter, RecordWriter};

/// What processing one input record produced
#[derive(Debug)]
pub enum Outcome<T> {
    Emit(T),
    Skipped(SkipReason),
}

impl<T> Outcome<T> {
    /// Log a failure against `postcode` and turn it into a skip
    pub fn from_result(postcode: &str, result: std::result::Result<T, SkipReason>) -> Self {
        match result {
            Ok(value) => Outcome::Emit(value),
            Err(reason) => {
                reason.log(postcode);
                Outcome::Skipped(reason)
            }
        }
    }

    pub fn into_batch(self) -> Outcome<Vec<T>> {
        match self {
            Outcome::Emit(value) => Outcome::Emit(vec![value]),
            Outcome::Skipped(reason) => Outcome::Skipped(reason),
        }
    }

    pub fn emitted(self) -> Option<T> {
        match self {
            Outcome::Emit(value) => Some(value),
            Outcome::Skipped(_) => None,
        }
    }
}

/// Running totals for one stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    /// Input records that were processed
    pub processed: u64,
    /// Output records written
    pub emitted: u64,
    /// Input records that produced nothing
    pub skipped: u64,
    /// Input lines that were blank-free but unparsable
    pub malformed: u64,
}

/// Progress callback, invoked after every processed record
pub type ProgressCallback = Arc<dyn Fn(&StageCounts) + Send + Sync>;

pub struct StageOptions {
    /// Input records processed at the same time
    pub concurrency: usize,
    pub progress: Option<ProgressCallback>,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            progress: None,
        }
    }
}

/// Read `I` records, process them with bounded concurrency and write the output
///
/// Output order follows completion order, not input order.
pub async fn run_stage<I, O, R, W, F, Fut>(
    reader: R,
    writer: W,
    options: &StageOptions,
    process: F,
) -> Result<StageCounts>
where
    I: DeserializeOwned,
    O: Serialize,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(I) -> Fut,
    Fut: Future<Output = Outcome<Vec<O>>>,
{
    let malformed = MalformedCounter::default();
    let outcomes = records::<I, R>(reader, &malformed)
        .map(process)
        .buffer_unordered(options.concurrency.max(1));
    let mut outcomes = pin!(outcomes);

    let mut writer = RecordWriter::new(writer);
    let mut counts = StageCounts::default();

    while let Some(outcome) = outcomes.next().await {
        counts.processed += 1;
        match outcome {
            Outcome::Emit(batch) => {
                for record in &batch {
                    writer.write(record).await?;
                }
                writer.flush().await?;
                counts.emitted += batch.len() as u64;
            }
            Outcome::Skipped(_) => counts.skipped += 1,
        }
        counts.malformed = malformed.get();

        if let Some(progress) = &options.progress {
            progress(&counts);
        }
    }

    writer.flush().await?;
    counts.malformed = malformed.get();
    Ok(counts)
}

/// Write already computed records
pub async fn write_all<O, W>(writer: W, items: impl IntoIterator<Item = O>) -> Result<u64>
where
    O: Serialize,
    W: AsyncWrite + Unpin,
{
    let mut writer = RecordWriter::new(writer);
    let mut written = 0;
    for item in items {
        writer.write(&item).await?;
        written += 1;
    }
    writer.flush().await?;
    Ok(written)
}
