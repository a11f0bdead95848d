//! This crate implements a parallel external sort for line-oriented text
//! files that are too large to sort in memory.
//!
//! The input is read once, split into bounded-size partitions that are sorted
//! in memory and persisted concurrently by a pool of writer tasks behind a
//! bounded queue, and the partition files are then k-way merged into a single
//! fully sorted output. Lines are expected to look like `"<number>. <text>"`
//! and are ordered by the text part first (plain byte order) and the numeric
//! prefix second; a line that does not match the grammar is still accepted
//! and sorts by its whole text with a zero prefix. Duplicate keys are never
//! collapsed - the output always holds exactly the input lines.
//!
//! Progress of a run is observable by polling
//! [progress::Progress::snapshot], and a run can be cancelled through
//! [cancel::CancelToken]. The [generator] module produces random input files
//! in the same line grammar, using the same partition/parallel-write/merge
//! shape as the sorter.
//!
//! # Examples
//! ```
//! use std::path::PathBuf;
//! use large_text_sort::sort::Sort;
//!
//! // parallel external sort
//! fn sort_file(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
//!     let mut sort = Sort::new(input, output);
//!
//!     // set the number of concurrent partition writers. The default is to
//!     // use all available cores.
//!     sort.with_tasks(2);
//!
//!     // set the maximum partition size. Each partition is sorted in memory
//!     // before it is persisted, so this bounds the memory of a run.
//!     sort.with_partition_size_mb(256);
//!
//!     // set the directory for intermediate partition files. The default is
//!     // the system temp dir - std::env::temp_dir(); for large files prefer
//!     // a dedicated directory on the same file system as the output.
//!     sort.with_tmp_dir(tmp);
//!
//!     sort.sort()
//! }
//! ```

pub(crate) mod config;
pub(crate) mod failure;
pub(crate) mod key;
pub(crate) mod line_record;
pub(crate) mod merger;
pub(crate) mod partition;
pub(crate) mod splitter;
pub(crate) mod write_command;

pub mod cancel;
pub mod generator;
pub mod progress;
pub mod sort;
