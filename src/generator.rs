use std::fs;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use command_executor::command::Command;
use command_executor::shutdown_mode::ShutdownMode;
use command_executor::thread_pool_builder::ThreadPoolBuilder;
use rand::Rng;

use crate::failure::FailureSlot;
use crate::progress::{Phase, Progress};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const DEFAULT_TARGET_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_LINE_LENGTH: usize = 100;

/// Generate a random text file in the `"<number>. <text>"` grammar the
/// sorter consumes.
///
/// The target size is split across N part writers running on the same
/// bounded worker pool the sorter uses; each writer emits numbered random
/// lines until its byte quota is met, the parts are concatenated into the
/// final file and deleted. Line numbers are globally unique; line order
/// across parts is arbitrary, which makes the result a natural sort input.
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use large_text_sort::generator::Generate;
///
/// fn generate_input(path: PathBuf) -> Result<(), anyhow::Error> {
///     let mut generate = Generate::new(path);
///     generate.with_target_size_mb(1);
///     generate.with_max_line_length(80);
///     generate.generate()
/// }
/// ```
pub struct Generate {
    output: PathBuf,
    target_size_bytes: u64,
    max_line_length: usize,
    tasks: usize,
    progress: Arc<Progress>,
}

impl Generate {
    /// Create a default Generate definition: a 10 MiB target, lines of at
    /// most 100 characters, one part writer per available CPU core.
    pub fn new(output: PathBuf) -> Generate {
        Generate {
            output,
            target_size_bytes: DEFAULT_TARGET_SIZE_BYTES,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            tasks: 0,
            progress: Arc::new(Progress::new()),
        }
    }

    /// Set the target output size in bytes. The result may overshoot by at
    /// most one line per part writer.
    pub fn with_target_size_bytes(&mut self, target_size_bytes: u64) {
        self.target_size_bytes = target_size_bytes;
    }

    /// Set the target output size in MiB.
    pub fn with_target_size_mb(&mut self, target_size_mb: u64) {
        self.target_size_bytes = target_size_mb * 1024 * 1024;
    }

    /// Set the maximum random text length per line.
    pub fn with_max_line_length(&mut self, max_line_length: usize) {
        self.max_line_length = max_line_length;
    }

    /// Set the number of part writer tasks. The default of zero uses all
    /// available CPU cores.
    pub fn with_tasks(&mut self, tasks: usize) {
        self.tasks = tasks;
    }

    /// Shared progress state for this run, polled the same way as
    /// [crate::sort::Sort::progress].
    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    /// Write the random text file.
    pub fn generate(&self) -> Result<(), anyhow::Error> {
        match self.run() {
            Ok(()) => {
                self.progress.complete("generation completed".to_string());
                log::info!("Finish generating {}", self.output.display());
                Ok(())
            }
            Err(e) => {
                self.progress.fail(format!("generation failed: {:#}", e));
                Err(e)
            }
        }
    }

    fn run(&self) -> Result<(), anyhow::Error> {
        if self.target_size_bytes == 0 {
            return Err(anyhow!("target size must be at least one byte"));
        }
        if self.max_line_length == 0 {
            return Err(anyhow!("maximum line length must be at least one"));
        }
        let tasks = if self.tasks == 0 {
            num_cpus::get()
        } else {
            self.tasks
        };
        let quota = std::cmp::max(1, self.target_size_bytes / tasks as u64);

        let mut part_paths = Vec::with_capacity(tasks);
        for i in 0..tasks {
            part_paths.push(part_path(&self.output, i)?);
        }
        for path in part_paths.iter().chain(std::iter::once(&self.output)) {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| anyhow!("remove stale file {}", path.display()))?;
            }
        }

        log::info!(
            "Start generating {} in {} parts, target size: {} bytes",
            self.output.display(),
            tasks,
            self.target_size_bytes
        );
        self.progress.begin_phase(
            Phase::Splitting,
            format!("writing {} file parts in parallel", tasks),
            self.target_size_bytes,
        );

        let mut thread_pool_builder = ThreadPoolBuilder::new();
        let mut generator_pool = thread_pool_builder
            .with_name("part-generators".to_string())
            .with_tasks(tasks)
            .with_queue_size(tasks)
            .with_shutdown_mode(ShutdownMode::CompletePending)
            .build()
            .unwrap();

        let line_counter = Arc::new(AtomicU64::new(0));
        let failure = Arc::new(FailureSlot::new());
        for path in &part_paths {
            let command = Box::new(GeneratePartCommand {
                path: path.clone(),
                quota,
                max_line_length: self.max_line_length,
                line_counter: line_counter.clone(),
                progress: self.progress.clone(),
                failure: failure.clone(),
            });
            generator_pool.submit(command);
        }
        generator_pool.shutdown();
        generator_pool.join()?;
        if let Some(error) = failure.take() {
            return Err(error.context("failed to write file parts"));
        }

        self.concatenate_parts(&part_paths)?;

        self.progress
            .begin_phase(Phase::Cleaning, "removing file parts".to_string(), 0);
        for path in &part_paths {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| anyhow!("remove file part {}", path.display()))?;
            }
        }
        Ok(())
    }

    fn concatenate_parts(&self, part_paths: &[PathBuf]) -> Result<(), anyhow::Error> {
        let mut total: u64 = 0;
        for path in part_paths {
            total += path
                .metadata()
                .with_context(|| anyhow!("file part {}", path.display()))?
                .len();
        }
        self.progress.begin_phase(
            Phase::Merging,
            format!(
                "concatenating {} file parts into {}",
                part_paths.len(),
                self.output.display()
            ),
            total,
        );

        let file = File::create(&self.output)
            .with_context(|| anyhow!("create output {}", self.output.display()))?;
        let mut writer = BufWriter::new(file);
        for path in part_paths {
            let mut reader =
                File::open(path).with_context(|| anyhow!("open file part {}", path.display()))?;
            let copied = io::copy(&mut reader, &mut writer)
                .with_context(|| anyhow!("concatenate {}", path.display()))?;
            self.progress.add_bytes(copied);
        }
        writer
            .flush()
            .with_context(|| anyhow!("flush output {}", self.output.display()))?;
        Ok(())
    }
}

fn part_path(output: &Path, index: usize) -> Result<PathBuf, anyhow::Error> {
    let name = output
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("output path has no file name: {}", output.display()))?;
    Ok(output.with_file_name(format!("{}.part-{}", name, index + 1)))
}

/// Writes one file part: numbered random lines until the byte quota is met.
struct GeneratePartCommand {
    path: PathBuf,
    quota: u64,
    max_line_length: usize,
    line_counter: Arc<AtomicU64>,
    progress: Arc<Progress>,
    failure: Arc<FailureSlot>,
}

impl GeneratePartCommand {
    fn write_part(&self) -> Result<(), anyhow::Error> {
        let file = File::create(&self.path)
            .with_context(|| anyhow!("create file part {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        let mut rng = rand::thread_rng();
        let mut written: u64 = 0;

        while written < self.quota {
            let length = rng.gen_range(1..=self.max_line_length);
            let mut text = String::with_capacity(length);
            for _ in 0..length {
                text.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
            }
            let number = self.line_counter.fetch_add(1, Ordering::Relaxed) + 1;
            let line = format!("{}. {}", number, text);
            writeln!(writer, "{}", line)
                .with_context(|| anyhow!("write file part {}", self.path.display()))?;
            let bytes = line.len() as u64 + 1;
            written += bytes;
            self.progress.add_bytes(bytes);
        }
        writer
            .flush()
            .with_context(|| anyhow!("flush file part {}", self.path.display()))?;
        Ok(())
    }
}

impl Command for GeneratePartCommand {
    fn execute(&self) -> Result<(), anyhow::Error> {
        if self.failure.has_failed() {
            return Ok(());
        }
        if let Err(e) = self.write_part() {
            log::error!("Failed to write file part {}: {:#}", self.path.display(), e);
            self.failure.record(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::generator::part_path;

    #[test]
    fn test_part_path_naming() {
        let output = PathBuf::from("/data/random.txt");
        assert_eq!(
            part_path(&output, 0).unwrap(),
            PathBuf::from("/data/random.txt.part-1")
        );
        assert_eq!(
            part_path(&output, 7).unwrap(),
            PathBuf::from("/data/random.txt.part-8")
        );
    }
}
