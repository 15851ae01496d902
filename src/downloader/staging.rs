//! Per-view staging files in the staging directory.
//!
//! - `feedview_<id>.jsonl.gz`: one JSON line per record, gzip compressed,
//!   one gzip member per downloaded page so appends never rewrite data
//! - `feedview_<id>_info.json`: the download watermark
//!
//! Blocking file I/O runs on the blocking pool.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use tokio::sync::mpsc;

use crate::error::{Error, ProcessError, Result};
use crate::types::StagingWatermark;

/// Lines buffered between the blocking reader and the processor
const READ_CHANNEL_CAPACITY: usize = 64;

/// Paths of the staging files of one feed view
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingFiles {
    /// Compressed JSON-lines data file
    pub data_path: PathBuf,
    /// Watermark file
    pub info_path: PathBuf,
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::other(e))
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl StagingFiles {
    /// Staging file paths for `feed_view_id` under `staging_dir`
    pub fn for_view(staging_dir: &Path, feed_view_id: &str) -> Self {
        Self {
            data_path: staging_dir.join(format!("feedview_{feed_view_id}.jsonl.gz")),
            info_path: staging_dir.join(format!("feedview_{feed_view_id}_info.json")),
        }
    }

    /// Delete both files; missing files are fine
    pub async fn reset(&self) -> Result<()> {
        remove_if_exists(&self.data_path).await?;
        remove_if_exists(&self.info_path).await
    }

    /// Delete the data file once it has been processed; the watermark stays
    pub async fn remove_data(&self) -> Result<()> {
        remove_if_exists(&self.data_path).await
    }

    /// Load the watermark, or start from the beginning if there is none
    pub async fn load_watermark(&self) -> Result<StagingWatermark> {
        let content = match tokio::fs::read(&self.info_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StagingWatermark::default()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&content) {
            Ok(mark) => Ok(mark),
            Err(e) => {
                tracing::warn!(
                    path = %self.info_path.display(),
                    error = %e,
                    "Unreadable staging watermark, downloading from the beginning"
                );
                Ok(StagingWatermark::default())
            }
        }
    }

    /// Persist the watermark (write to a temporary file, then rename)
    pub async fn save_watermark(&self, mark: &StagingWatermark) -> Result<()> {
        let tmp = self.info_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(mark)?).await?;
        tokio::fs::rename(&tmp, &self.info_path).await?;
        Ok(())
    }
}

/// Appends pages to a data file. The first page truncates unless the
/// download resumes from a watermark.
pub(crate) struct StagingWriter {
    path: PathBuf,
    append: bool,
}

impl StagingWriter {
    pub(crate) fn new(path: PathBuf, append: bool) -> Self {
        Self { path, append }
    }

    /// Write one page as a complete gzip member
    pub(crate) async fn write_page(&mut self, lines: Vec<String>) -> Result<()> {
        let path = self.path.clone();
        let append = self.append;
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let file = if append {
                OpenOptions::new().create(true).append(true).open(&path)?
            } else {
                File::create(&path)?
            };
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            for line in &lines {
                encoder.write_all(line.as_bytes())?;
                encoder.write_all(b"\n")?;
            }
            let mut out = encoder.finish()?;
            out.flush()?;
            out.get_ref().sync_data()
        })
        .await
        .map_err(join_error)??;
        self.append = true;
        Ok(())
    }
}

/// Read one line of at most `limit` bytes (newline excluded) into `buf`
///
/// Returns `Ok(false)` at end of input.
fn read_bounded_line<R: BufRead>(reader: &mut R, limit: usize, buf: &mut Vec<u8>) -> Result<bool> {
    buf.clear();
    let read = reader
        .by_ref()
        .take(limit as u64 + 1)
        .read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > limit {
        return Err(ProcessError::LineTooLong { limit }.into());
    }
    Ok(true)
}

/// Stream the non-empty lines of a data file from a blocking reader task.
///
/// A missing file yields no lines. Errors are sent in-band and end the stream;
/// dropping the receiver stops the reader.
pub(crate) fn spawn_line_reader(path: PathBuf, limit: usize) -> mpsc::Receiver<Result<String>> {
    let (tx, rx) = mpsc::channel(READ_CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || {
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return,
            Err(e) => {
                let _ = tx.blocking_send(Err(e.into()));
                return;
            }
        };
        let mut reader = BufReader::new(MultiGzDecoder::new(BufReader::new(file)));
        let mut buf = Vec::new();
        loop {
            let line = match read_bounded_line(&mut reader, limit, &mut buf) {
                Ok(false) => return,
                Ok(true) if buf.iter().all(u8::is_ascii_whitespace) => continue,
                Ok(true) => String::from_utf8(std::mem::take(&mut buf)).map_err(|e| {
                    Error::from(ProcessError::InvalidStagedRecord(format!("not UTF-8: {e}")))
                }),
                Err(e) => Err(e),
            };
            let stop = line.is_err();
            if tx.blocking_send(line).is_err() || stop {
                return;
            }
        }
    });
    rx
}
