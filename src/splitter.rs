use std::cmp::max;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use command_executor::shutdown_mode::ShutdownMode;
use command_executor::thread_pool::ThreadPool;
use command_executor::thread_pool_builder::ThreadPoolBuilder;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::failure::FailureSlot;
use crate::line_record::LineRecord;
use crate::partition::Partition;
use crate::progress::Progress;
use crate::write_command::WritePartitionCommand;

/// Expected partition count for the input, used as the work queue capacity.
/// Bounds the memory held in flight without stalling a well estimated run.
pub(crate) fn queue_capacity(input_size: u64, partition_size_bytes: u64) -> usize {
    max(
        1,
        (input_size as f64 / partition_size_bytes as f64).round() as usize,
    )
}

/// The producer side of the split phase: streams the input line by line,
/// batches lines into partitions of roughly the configured byte size, sorts
/// each partition and hands it to the bounded writer pool.
pub(crate) struct Splitter<'a> {
    config: &'a Config,
    run_dir: &'a Path,
    progress: Arc<Progress>,
    part_files: Arc<Mutex<Vec<PathBuf>>>,
    cancel: CancelToken,
}

impl<'a> Splitter<'a> {
    pub(crate) fn new(
        config: &'a Config,
        run_dir: &'a Path,
        progress: Arc<Progress>,
        part_files: Arc<Mutex<Vec<PathBuf>>>,
        cancel: CancelToken,
    ) -> Splitter<'a> {
        Splitter {
            config,
            run_dir,
            progress,
            part_files,
            cancel,
        }
    }

    /// Run the producer to completion, then drain and join the writer pool.
    /// Returns once every partition of the input has been persisted.
    pub(crate) fn split(&self, input: &Path, input_size: u64) -> Result<(), anyhow::Error> {
        let capacity = queue_capacity(input_size, self.config.partition_size_bytes());
        log::info!(
            "Splitting {} into sorted partitions, writer tasks: {}, queue capacity: {}",
            input.display(),
            self.config.tasks(),
            capacity
        );

        let mut thread_pool_builder = ThreadPoolBuilder::new();
        let mut writer_pool = thread_pool_builder
            .with_name("partition-writers".to_string())
            .with_tasks(self.config.tasks())
            .with_queue_size(capacity)
            .with_shutdown_mode(ShutdownMode::CompletePending)
            .build()
            .unwrap();

        let failure = Arc::new(FailureSlot::new());
        let produced = self.produce(input, &mut writer_pool, &failure);

        writer_pool.shutdown();
        writer_pool.join()?;

        // A writer failure is the first observed one; the producer only
        // aborted in response to it.
        if let Some(error) = failure.take() {
            return Err(error.context("failed to persist sorted partitions"));
        }
        produced?;
        log::info!(
            "Finished splitting, {} partitions persisted",
            self.part_files.lock().unwrap().len()
        );
        Ok(())
    }

    fn produce(
        &self,
        input: &Path,
        writer_pool: &mut ThreadPool,
        failure: &Arc<FailureSlot>,
    ) -> Result<(), anyhow::Error> {
        let file = File::open(input).with_context(|| anyhow!("open {}", input.display()))?;
        let mut reader = BufReader::new(file);
        let mut records: Vec<LineRecord> = Vec::new();
        let mut buffered_bytes: u64 = 0;
        let mut index: usize = 0;

        loop {
            let mut line = String::new();
            let bytes = reader
                .read_line(&mut line)
                .with_context(|| anyhow!("read {}, partition {}", input.display(), index))?;
            if bytes == 0 {
                break;
            }
            trim_line_end(&mut line);
            buffered_bytes += line.len() as u64 + 1;
            records.push(LineRecord::new(line));

            if buffered_bytes >= self.config.partition_size_bytes() {
                self.submit_partition(writer_pool, failure, index, mem::take(&mut records))?;
                buffered_bytes = 0;
                index += 1;
            }
        }

        if !records.is_empty() {
            self.submit_partition(writer_pool, failure, index, records)?;
        }
        Ok(())
    }

    fn submit_partition(
        &self,
        writer_pool: &mut ThreadPool,
        failure: &Arc<FailureSlot>,
        index: usize,
        mut records: Vec<LineRecord>,
    ) -> Result<(), anyhow::Error> {
        if self.cancel.is_cancelled() {
            return Err(anyhow!("sort cancelled while splitting"));
        }
        if failure.has_failed() {
            // the slot holds the error that will be reported
            return Err(anyhow!("aborting split after a writer failure"));
        }

        // Vec::sort is stable, so equal-key lines keep their input order
        // within the partition.
        records.sort();
        let command = Box::new(WritePartitionCommand::new(
            Partition::new(index, records),
            self.run_dir.to_path_buf(),
            self.progress.clone(),
            self.part_files.clone(),
            failure.clone(),
            self.cancel.clone(),
        ));
        // blocks while the queue is at capacity - this is the backpressure
        // point between the producer and the writer pool
        writer_pool.submit(command);
        Ok(())
    }
}

pub(crate) fn trim_line_end(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
}
