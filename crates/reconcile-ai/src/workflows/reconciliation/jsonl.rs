//! Append-only JSON-lines files shared by the durable audit, accuracy and ledger stores.
//!
//! A crash partway through an append leaves an unterminated final line. Opening a log cuts
//! such a line off when it does not parse; a bad line anywhere else is reported as
//! corruption. A failed append is rolled back to the previous length, and the writer
//! refuses further appends when that rollback fails too.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;

#[derive(Debug)]
pub(crate) enum ReplayError {
    Io(io::Error),
    Corrupt { line: usize, details: String },
}

impl From<io::Error> for ReplayError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug)]
struct Writer {
    file: File,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct JsonLinesFile {
    path: PathBuf,
    writer: Mutex<Writer>,
}

struct Replay<T> {
    rows: Vec<T>,
    keep: usize,
    unterminated: bool,
}

impl JsonLinesFile {
    /// Open (creating if needed) and replay every row already in the file.
    pub(crate) fn open<T: DeserializeOwned>(
        path: impl AsRef<Path>,
    ) -> Result<(Self, Vec<T>), ReplayError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let replay = replay::<T>(&bytes)?;
        if replay.keep < bytes.len() {
            tracing::warn!(
                path = %path.display(),
                discarded_bytes = bytes.len() - replay.keep,
                "dropping torn final line"
            );
            file.set_len(replay.keep as u64)?;
            file.sync_data()?;
        } else if replay.unterminated {
            file.write_all(b"\n")?;
            file.sync_data()?;
        }

        let log = Self {
            path,
            writer: Mutex::new(Writer {
                file,
                closed: false,
            }),
        };
        Ok((log, replay.rows))
    }

    /// Rows of an existing file without opening it for writing. A torn final line is
    /// skipped but left on disk.
    pub(crate) fn read<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>, ReplayError> {
        let bytes = fs::read(path)?;
        Ok(replay::<T>(&bytes)?.rows)
    }

    #[cfg(test)]
    pub(crate) fn from_file(path: impl Into<PathBuf>, file: File) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(Writer {
                file,
                closed: false,
            }),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Append one serialized row and sync it. `line` must not contain a newline.
    pub(crate) fn append_line(&self, line: &str) -> io::Result<()> {
        let mut guard = self.writer.lock().expect("json-lines writer poisoned");
        let Writer { file, closed } = &mut *guard;
        if *closed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "{} stopped accepting appends after a failed write; reopen it to recover",
                    self.path.display()
                ),
            ));
        }

        let start = file.metadata()?.len();
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');

        let written = file.write_all(&bytes).and_then(|()| file.sync_data());
        if let Err(err) = written {
            match file.set_len(start) {
                Ok(()) => tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "append failed; log rolled back"
                ),
                Err(rollback) => {
                    *closed = true;
                    tracing::error!(
                        path = %self.path.display(),
                        error = %err,
                        rollback_error = %rollback,
                        "append failed and could not be rolled back; log closed"
                    );
                }
            }
            return Err(err);
        }
        Ok(())
    }
}

fn replay<T: DeserializeOwned>(bytes: &[u8]) -> Result<Replay<T>, ReplayError> {
    let mut rows = Vec::new();
    let mut offset = 0;
    let mut unterminated = false;

    for (index, segment) in bytes.split_inclusive(|byte| *byte == b'\n').enumerate() {
        let terminated = segment.last() == Some(&b'\n');
        if !segment.iter().all(u8::is_ascii_whitespace) {
            match serde_json::from_slice::<T>(segment) {
                Ok(row) => rows.push(row),
                Err(_) if !terminated => break,
                Err(err) => {
                    return Err(ReplayError::Corrupt {
                        line: index + 1,
                        details: err.to_string(),
                    })
                }
            }
            unterminated = !terminated;
        }
        offset += segment.len();
    }

    Ok(Replay {
        rows,
        keep: offset,
        unterminated,
    })
}
