use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use bourse_core::{Symbol, Trade, TradeKey};
use bourse_ports::{StorageError, TradeJournal};
use parking_lot::Mutex;

use super::{JournalRecord, JournalState};

struct FileInner {
    file: File,
    /// Length of the file up to the last complete record
    len: u64,
    state: JournalState,
}

/// Append-only JSON-lines trade journal
///
/// Each append is written in one `write_all` and flushed before the call
/// returns; with `sync_on_append` it is also fsynced. A record without its
/// trailing newline can only come from an interrupted write, so it is
/// discarded on open.
pub struct FileTradeJournal {
    path: PathBuf,
    sync_on_append: bool,
    inner: Mutex<FileInner>,
}

impl FileTradeJournal {
    /// Open or create the journal at `path` and replay its contents
    pub fn open(path: impl AsRef<Path>, sync_on_append: bool) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let (state, valid_len) = replay(&contents, &path)?;
        if valid_len < contents.len() {
            log::warn!(
                "Discarding {} byte(s) of torn record at the end of trade journal {}",
                contents.len() - valid_len,
                path.display()
            );
            file.set_len(valid_len as u64)?;
        }

        log::info!(
            "Opened trade journal {} ({} unsettled trade(s))",
            path.display(),
            state.pending.len()
        );

        Ok(Self {
            path,
            sync_on_append,
            inner: Mutex::new(FileInner {
                file,
                len: valid_len as u64,
                state,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, records: Vec<JournalRecord>) -> Result<(), StorageError> {
        let mut buf = Vec::new();
        for record in &records {
            serde_json::to_writer(&mut buf, record)
                .map_err(|e| StorageError::permanent(format!("encode journal record: {e}")))?;
            buf.push(b'\n');
        }

        let mut inner = self.inner.lock();
        if let Err(err) = write_durably(&mut inner.file, &buf, self.sync_on_append) {
            // Cut off whatever part of the batch reached the file
            let len = inner.len;
            if let Err(truncate_err) = inner.file.set_len(len) {
                log::error!(
                    "Could not roll back partial write to {}: {}",
                    self.path.display(),
                    truncate_err
                );
            }
            return Err(err);
        }

        inner.len += buf.len() as u64;
        for record in records {
            inner.state.apply(record);
        }
        Ok(())
    }
}

fn write_durably(file: &mut File, buf: &[u8], sync: bool) -> Result<(), StorageError> {
    file.write_all(buf)?;
    file.flush()?;
    if sync {
        file.sync_data()?;
    }
    Ok(())
}

/// Rebuild state from raw journal bytes
///
/// Returns the state and the length of the valid prefix.
fn replay(contents: &[u8], path: &Path) -> Result<(JournalState, usize), StorageError> {
    let mut state = JournalState::default();
    let mut offset = 0;

    while offset < contents.len() {
        let rest = &contents[offset..];
        let Some(end) = rest.iter().position(|b| *b == b'\n') else {
            // Unterminated tail
            break;
        };
        let line = &rest[..end];
        let consumed = end + 1;

        if line.iter().all(u8::is_ascii_whitespace) {
            offset += consumed;
            continue;
        }

        match serde_json::from_slice::<JournalRecord>(line) {
            Ok(record) => state.apply(record),
            Err(err) if offset + consumed == contents.len() => {
                log::warn!(
                    "Unreadable final record in {}: {}",
                    path.display(),
                    err
                );
                break;
            }
            Err(err) => {
                return Err(StorageError::permanent(format!(
                    "corrupt record at byte {} of {}: {}",
                    offset,
                    path.display(),
                    err
                )));
            }
        }
        offset += consumed;
    }

    Ok((state, offset))
}

impl TradeJournal for FileTradeJournal {
    fn append(&self, trades: &[Trade]) -> Result<(), StorageError> {
        if trades.is_empty() {
            return Ok(());
        }
        let records = trades
            .iter()
            .map(|trade| JournalRecord::Matched {
                trade: trade.clone(),
            })
            .collect();
        self.write(records)
    }

    fn mark_settled(&self, key: &TradeKey) -> Result<(), StorageError> {
        self.write(vec![JournalRecord::Settled { key: *key }])
    }

    fn is_settled(&self, key: &TradeKey) -> Result<bool, StorageError> {
        Ok(self.inner.lock().state.settled.contains(key))
    }

    fn unsettled(&self) -> Result<Vec<Trade>, StorageError> {
        Ok(self.inner.lock().state.unsettled())
    }

    fn last_sequence(&self, symbol: &Symbol) -> Result<u64, StorageError> {
        Ok(self.inner.lock().state.last_sequence(symbol))
    }
}
