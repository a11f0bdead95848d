use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};

use crate::cancel::CancelToken;
use crate::key::LineKey;
use crate::line_record::LineRecord;
use crate::progress::Progress;
use crate::splitter::trim_line_end;

/// Sequential reader over one sorted partition file, holding the current
/// head line. The raw head line is what gets written to the output, so
/// equal-key lines with different bytes survive the merge unchanged.
pub(crate) struct PartitionReader {
    path: PathBuf,
    reader: BufReader<File>,
    head: Option<LineRecord>,
}

impl PartitionReader {
    pub(crate) fn open(path: &Path) -> Result<PartitionReader, anyhow::Error> {
        let file = File::open(path).with_context(|| anyhow!("open {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let head = Self::read_record(&mut reader, path)?;
        Ok(PartitionReader {
            path: path.to_path_buf(),
            reader,
            head,
        })
    }

    pub(crate) fn head(&self) -> Option<&LineRecord> {
        self.head.as_ref()
    }

    /// Take the current head and position the reader at the next line.
    pub(crate) fn advance(&mut self) -> Result<Option<LineRecord>, anyhow::Error> {
        let next = Self::read_record(&mut self.reader, &self.path)?;
        Ok(std::mem::replace(&mut self.head, next))
    }

    fn read_record(
        reader: &mut BufReader<File>,
        path: &Path,
    ) -> Result<Option<LineRecord>, anyhow::Error> {
        let mut line = String::new();
        let bytes = reader
            .read_line(&mut line)
            .with_context(|| anyhow!("read {}", path.display()))?;
        if bytes == 0 {
            Ok(None)
        } else {
            trim_line_end(&mut line);
            Ok(Some(LineRecord::new(line)))
        }
    }
}

/// Merge individually sorted partition files into the output file.
///
/// The frontier maps each parsed key to the FIFO of sources currently
/// positioned at a line with that key, so the first source to report a key is
/// emitted first and duplicate keys are never collapsed. Each iteration emits
/// exactly one line and advances exactly one source. Returns the number of
/// lines written.
pub(crate) fn merge_partitions(
    part_files: &[PathBuf],
    output: &Path,
    progress: &Arc<Progress>,
    cancel: &CancelToken,
) -> Result<u64, anyhow::Error> {
    log::info!(
        "Merging {} sorted partitions into {}",
        part_files.len(),
        output.display()
    );

    let mut readers = Vec::with_capacity(part_files.len());
    for path in part_files {
        readers.push(PartitionReader::open(path)?);
    }

    let mut frontier: BTreeMap<LineKey, VecDeque<usize>> = BTreeMap::new();
    for (source, reader) in readers.iter().enumerate() {
        if let Some(head) = reader.head() {
            frontier
                .entry(LineKey::from(head))
                .or_default()
                .push_back(source);
        }
    }

    let file =
        File::create(output).with_context(|| anyhow!("create output {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let mut merged_len: u64 = 0;

    while let Some((key, mut sources)) = frontier.pop_first() {
        if cancel.is_cancelled() {
            return Err(anyhow!("sort cancelled while merging"));
        }

        let source = sources.pop_front().unwrap();
        if !sources.is_empty() {
            frontier.insert(key, sources);
        }

        if let Some(record) = readers[source].advance()? {
            writeln!(writer, "{}", record.line())
                .with_context(|| anyhow!("write output {}", output.display()))?;
            merged_len += 1;
            progress.add_bytes(record.line().len() as u64 + 1);
        }

        if let Some(next) = readers[source].head() {
            frontier
                .entry(LineKey::from(next))
                .or_default()
                .push_back(source);
        }
    }

    writer
        .flush()
        .with_context(|| anyhow!("flush output {}", output.display()))?;
    log::info!("Finished merging, merged length: {} lines", merged_len);
    Ok(merged_len)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::cancel::CancelToken;
    use crate::merger::merge_partitions;
    use crate::progress::Progress;

    fn write_part(dir: &tempfile::TempDir, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&path, content).unwrap();
        path
    }

    fn merge_to_lines(parts: &[PathBuf], dir: &tempfile::TempDir) -> Vec<String> {
        let output = dir.path().join("merged.txt");
        let progress = Arc::new(Progress::new());
        let lines =
            merge_partitions(parts, &output, &progress, &CancelToken::new()).unwrap();
        let content = fs::read_to_string(&output).unwrap();
        let result: Vec<String> = content.lines().map(|l| l.to_string()).collect();
        assert_eq!(lines as usize, result.len());
        result
    }

    #[test]
    fn test_merge_two_sorted_parts() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_part(&dir, "a.txt", &["2. apple", "1. banana"]);
        let b = write_part(&dir, "b.txt", &["1. apricot", "3. cherry"]);
        let merged = merge_to_lines(&[a, b], &dir);
        assert_eq!(
            merged,
            vec!["2. apple", "1. apricot", "1. banana", "3. cherry"]
        );
    }

    #[test]
    fn test_duplicate_keys_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_part(&dir, "a.txt", &["1. same", "1. same"]);
        let b = write_part(&dir, "b.txt", &["1. same"]);
        let merged = merge_to_lines(&[a, b], &dir);
        assert_eq!(merged, vec!["1. same", "1. same", "1. same"]);
    }

    #[test]
    fn test_first_source_with_key_is_emitted_first() {
        let dir = tempfile::tempdir().unwrap();
        // equal keys with different raw bytes: source order decides
        let a = write_part(&dir, "a.txt", &["01. same"]);
        let b = write_part(&dir, "b.txt", &["1. same"]);
        let merged = merge_to_lines(&[a, b], &dir);
        assert_eq!(merged, vec!["01. same", "1. same"]);
    }

    #[test]
    fn test_merge_single_part() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_part(&dir, "a.txt", &["1. alpha", "2. beta", "3. gamma"]);
        let merged = merge_to_lines(&[a], &dir);
        assert_eq!(merged, vec!["1. alpha", "2. beta", "3. gamma"]);
    }

    #[test]
    fn test_merge_with_empty_part() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_part(&dir, "a.txt", &["1. alpha"]);
        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "").unwrap();
        let merged = merge_to_lines(&[a, empty], &dir);
        assert_eq!(merged, vec!["1. alpha"]);
    }

    #[test]
    fn test_merge_no_parts_creates_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let merged = merge_to_lines(&[], &dir);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_cancelled_merge_fails() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_part(&dir, "a.txt", &["1. alpha"]);
        let output = dir.path().join("merged.txt");
        let progress = Arc::new(Progress::new());
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = merge_partitions(&[a], &output, &progress, &cancel);
        assert!(result.is_err());
    }
}
