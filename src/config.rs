use std::path::PathBuf;

/// Resolved runtime configuration for one sort run. Built by
/// [crate::sort::Sort] from the user supplied settings; all defaults are
/// already applied here.
#[derive(Clone)]
pub(crate) struct Config {
    tmp: PathBuf,
    tmp_prefix: String,
    tasks: usize,
    partition_size_bytes: u64,
}

impl Config {
    pub(crate) fn new(
        tmp: PathBuf,
        tmp_prefix: String,
        tasks: usize,
        partition_size_bytes: u64,
    ) -> Config {
        Config {
            tmp,
            tmp_prefix,
            tasks,
            partition_size_bytes,
        }
    }

    /// Base directory under which the per-run temp directory is created.
    pub(crate) fn tmp(&self) -> &PathBuf {
        &self.tmp
    }

    pub(crate) fn tmp_prefix(&self) -> &str {
        &self.tmp_prefix
    }

    /// Number of concurrent partition writer tasks.
    pub(crate) fn tasks(&self) -> usize {
        self.tasks
    }

    pub(crate) fn partition_size_bytes(&self) -> u64 {
        self.partition_size_bytes
    }
}

/// Deterministic partition file name derived from the partition index.
pub(crate) fn part_file_name(index: usize) -> String {
    format!("part-{:06}.txt", index + 1)
}
