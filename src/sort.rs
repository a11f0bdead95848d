use std::cmp::max;
use std::fs;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::mem;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use rlimit::{getrlimit, setrlimit, Resource};
use tempfile::{Builder, TempDir};

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::line_record::LineRecord;
use crate::merger;
use crate::progress::{Phase, Progress};
use crate::splitter::{trim_line_end, Splitter};

const DEFAULT_PARTITION_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// External sort for line-oriented text files that do not fit in memory.
///
/// The input is split into bounded-size partitions, each partition is sorted
/// in memory and persisted by a pool of writer tasks, and the partition files
/// are k-way merged into the output. Lines are ordered by the parsed
/// `"<integer>. <text>"` key: text part first (byte order), numeric prefix
/// second. Lines that do not match the grammar sort by their whole text with
/// a zero prefix.
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use large_text_sort::sort::Sort;
///
/// fn sort_file(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
///     let mut sort = Sort::new(input, output);
///     // number of concurrent partition writers; the default uses all
///     // available CPU cores
///     sort.with_tasks(4);
///     // directory for intermediate partition files, preferably on the same
///     // file system as the output
///     sort.with_tmp_dir(tmp);
///     sort.sort()
/// }
/// ```
pub struct Sort {
    input: PathBuf,
    output: PathBuf,
    tmp: PathBuf,
    tasks: usize,
    partition_size_bytes: u64,
    progress: Arc<Progress>,
    cancel: CancelToken,
}

impl Sort {
    /// Create a default Sort definition.
    ///
    /// * intermediate files go to the system temp dir - std::env::temp_dir()
    /// * writer tasks default to the number of available CPU cores
    /// * the target partition size is 10 MiB
    pub fn new(input: PathBuf, output: PathBuf) -> Sort {
        Sort {
            input,
            output,
            tmp: std::env::temp_dir(),
            tasks: 0,
            partition_size_bytes: DEFAULT_PARTITION_SIZE_BYTES,
            progress: Arc::new(Progress::new()),
            cancel: CancelToken::new(),
        }
    }

    /// Set the directory for intermediate partition files. For large inputs
    /// it is recommended to use a dedicated directory on the same file system
    /// as the output.
    pub fn with_tmp_dir(&mut self, tmp: PathBuf) {
        self.tmp = tmp;
    }

    /// Set the number of writer tasks. The default of zero uses all available
    /// CPU cores.
    pub fn with_tasks(&mut self, tasks: usize) {
        self.tasks = tasks;
    }

    /// Set the target partition size in bytes. Each partition is sorted in
    /// memory, so this bounds the memory held by the producer.
    pub fn with_partition_size_bytes(&mut self, partition_size_bytes: u64) {
        self.partition_size_bytes = partition_size_bytes;
    }

    /// Set the target partition size in MiB.
    pub fn with_partition_size_mb(&mut self, partition_size_mb: u64) {
        self.partition_size_bytes = partition_size_mb * 1024 * 1024;
    }

    /// Shared progress state for this run. Pollers read
    /// [crate::progress::Progress::snapshot] until `finished` is set.
    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    /// Cancellation signal for this run. Cancelling makes the run fail at the
    /// next partition boundary or merge step, after best effort cleanup.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Sort the input file into the output file.
    ///
    /// Creates a uniquely named temp directory holding one file per
    /// partition; on return - success or failure - the temp artifacts have
    /// been removed best effort. The output file is created or overwritten.
    pub fn sort(&self) -> Result<(), anyhow::Error> {
        let config = self.create_config()?;
        match self.run(&config) {
            Ok(()) => {
                self.progress.complete("sort completed".to_string());
                log::info!("Finish external sort: {}", self.output.display());
                Ok(())
            }
            Err(e) => {
                self.progress.fail(format!("sort failed: {:#}", e));
                Err(e)
            }
        }
    }

    /// Verify that the input file is sorted under the line comparator.
    pub fn check(&self) -> Result<bool, anyhow::Error> {
        let file = File::open(&self.input)
            .with_context(|| anyhow!("open {}", self.input.display()))?;
        let mut reader = BufReader::new(file);
        let mut previous: Option<LineRecord> = None;
        loop {
            let mut line = String::new();
            let bytes = reader
                .read_line(&mut line)
                .with_context(|| anyhow!("read {}", self.input.display()))?;
            if bytes == 0 {
                break;
            }
            trim_line_end(&mut line);
            let current = LineRecord::new(line);
            if let Some(previous) = &previous {
                if previous > &current {
                    return Ok(false);
                }
            }
            previous = Some(current);
        }
        Ok(true)
    }

    fn run(&self, config: &Config) -> Result<(), anyhow::Error> {
        log::info!(
            "Start external sort: {} -> {}",
            self.input.display(),
            self.output.display()
        );
        let input_size = self
            .input
            .metadata()
            .with_context(|| anyhow!("input file {}", self.input.display()))?
            .len();

        let run_dir = Builder::new()
            .prefix(config.tmp_prefix())
            .tempdir_in(config.tmp())
            .with_context(|| anyhow!("create temp directory in {}", config.tmp().display()))?;
        let part_files: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));

        let result = self.split_and_merge(config, input_size, &run_dir, &part_files);

        self.progress.begin_phase(
            Phase::Cleaning,
            "removing temporary partition files".to_string(),
            0,
        );
        let recorded = mem::take(&mut *part_files.lock().unwrap());
        Self::remove_part_files(&recorded);

        match result {
            Ok(()) => {
                run_dir
                    .close()
                    .with_context(|| anyhow!("remove temp directory"))?;
                Ok(())
            }
            // the TempDir drop removes the run directory best effort
            Err(e) => Err(e),
        }
    }

    fn split_and_merge(
        &self,
        config: &Config,
        input_size: u64,
        run_dir: &TempDir,
        part_files: &Arc<Mutex<Vec<PathBuf>>>,
    ) -> Result<(), anyhow::Error> {
        self.progress.begin_phase(
            Phase::Splitting,
            format!("splitting {} into sorted partitions", self.input.display()),
            input_size,
        );
        let splitter = Splitter::new(
            config,
            run_dir.path(),
            self.progress.clone(),
            part_files.clone(),
            self.cancel.clone(),
        );
        splitter.split(&self.input, input_size)?;

        // writers finish out of order; sort the deterministic file names so
        // the merge sees sources in partition index order on every run
        let mut parts = part_files.lock().unwrap().clone();
        parts.sort();

        let (current_soft, current_hard) = Self::get_rlimits()?;
        let new_soft = max((parts.len() + 256) as u64, current_soft);
        log::info!(
            "Set rlimit NOFILE, soft: {}, hard: {} for {} merge readers",
            new_soft,
            current_hard,
            parts.len()
        );
        Self::set_rlimits(new_soft, current_hard)?;

        let mut total_part_bytes: u64 = 0;
        for path in &parts {
            total_part_bytes += path
                .metadata()
                .with_context(|| anyhow!("partition file {}", path.display()))?
                .len();
        }
        self.progress.begin_phase(
            Phase::Merging,
            format!(
                "merging {} sorted partitions into {}",
                parts.len(),
                self.output.display()
            ),
            total_part_bytes,
        );
        merger::merge_partitions(&parts, &self.output, &self.progress, &self.cancel)?;

        log::info!(
            "Restore rlimit NOFILE, soft: {}, hard: {}",
            current_soft,
            current_hard
        );
        Self::set_rlimits(current_soft, current_hard)?;
        Ok(())
    }

    fn create_config(&self) -> Result<Config, anyhow::Error> {
        if self.partition_size_bytes == 0 {
            return Err(anyhow!("partition size must be at least one byte"));
        }
        let tasks = if self.tasks == 0 {
            num_cpus::get()
        } else {
            self.tasks
        };
        Ok(Config::new(
            self.tmp.clone(),
            "large-text-sort-".to_string(),
            tasks,
            self.partition_size_bytes,
        ))
    }

    // deleting a partition file twice is not an error - cleanup must stay
    // idempotent
    fn remove_part_files(part_files: &[PathBuf]) {
        for path in part_files {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    log::warn!("Failed to remove partition file {}: {}", path.display(), e);
                }
            }
        }
    }

    fn get_rlimits() -> Result<(u64, u64), anyhow::Error> {
        getrlimit(Resource::NOFILE).with_context(|| "getrlimit")
    }

    fn set_rlimits(soft: u64, hard: u64) -> Result<(), anyhow::Error> {
        setrlimit(Resource::NOFILE, soft, hard)
            .with_context(|| format!("set rlimit NOFILE, soft: {}, hard: {}", soft, hard))?;
        Ok(())
    }
}
