use std::fs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use command_executor::command::Command;

use crate::cancel::CancelToken;
use crate::config::part_file_name;
use crate::failure::FailureSlot;
use crate::partition::Partition;
use crate::progress::Progress;

/// Work item executed by the writer pool: persist one sorted partition to its
/// deterministic file under the run directory.
///
/// The partition buffer is freed when the command is dropped, right after
/// execution. Errors land in the shared [FailureSlot]; once it is set the
/// remaining queued commands drain without writing.
pub(crate) struct WritePartitionCommand {
    partition: Partition,
    run_dir: PathBuf,
    progress: Arc<Progress>,
    part_files: Arc<Mutex<Vec<PathBuf>>>,
    failure: Arc<FailureSlot>,
    cancel: CancelToken,
}

impl WritePartitionCommand {
    pub(crate) fn new(
        partition: Partition,
        run_dir: PathBuf,
        progress: Arc<Progress>,
        part_files: Arc<Mutex<Vec<PathBuf>>>,
        failure: Arc<FailureSlot>,
        cancel: CancelToken,
    ) -> WritePartitionCommand {
        WritePartitionCommand {
            partition,
            run_dir,
            progress,
            part_files,
            failure,
            cancel,
        }
    }

    fn write_partition(&self) -> Result<(), anyhow::Error> {
        let path = self.run_dir.join(part_file_name(self.partition.index()));
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| anyhow!("remove stale partition file {}", path.display()))?;
        }

        let file = File::create(&path)
            .with_context(|| anyhow!("create partition file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let mut bytes: u64 = 0;
        for record in self.partition.records() {
            writeln!(writer, "{}", record.line())
                .with_context(|| anyhow!("write partition file {}", path.display()))?;
            bytes += record.line().len() as u64 + 1;
        }
        writer
            .flush()
            .with_context(|| anyhow!("flush partition file {}", path.display()))?;

        self.progress.add_bytes(bytes);
        self.part_files.lock().unwrap().push(path);
        Ok(())
    }
}

impl Command for WritePartitionCommand {
    fn execute(&self) -> Result<(), anyhow::Error> {
        if self.failure.has_failed() || self.cancel.is_cancelled() {
            return Ok(());
        }
        if let Err(e) = self.write_partition() {
            log::error!(
                "Failed to persist partition {}: {:#}",
                self.partition.index(),
                e
            );
            self.failure.record(e);
        } else {
            log::debug!(
                "Persisted partition {} with {} lines",
                self.partition.index(),
                self.partition.len()
            );
        }
        Ok(())
    }
}
