//! Bounded on-disk archive of serializable objects
//!
//! An [`Archive`] turns a stream of objects into an append-only sequence of
//! postcard-encoded blocks, trimming the oldest entries from the front of the
//! file once a high-water count is reached. All file I/O runs on a dedicated
//! task per archive; callers only serialize and enqueue.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::block_file::{BlockFile, INVALID_BLOCK_LENGTH, ReadBlock};
use crate::error::ArchiveError;

/// Upper bound on bytes moved per copy pass while trimming.
const TRIM_CHUNK_SIZE: u64 = 1024 * 1024;

enum Command<T> {
    Append(Vec<u8>),
    ReadAll(oneshot::Sender<Vec<T>>),
    Clear(oneshot::Sender<()>),
    Flush(oneshot::Sender<()>),
}

/// Handle to a bounded archive of `T` values backed by one file.
///
/// Handles are cheap to clone; all of them feed the same I/O task, which
/// totally orders appends, reads, trims, and clears. Dropping the last handle
/// shuts the task down after it drains outstanding work.
pub struct Archive<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
    path: PathBuf,
    max_object_count: u64,
    trimmed_object_count: u64,
}

impl<T> Clone for Archive<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            path: self.path.clone(),
            max_object_count: self.max_object_count,
            trimmed_object_count: self.trimmed_object_count,
        }
    }
}

impl<T> Archive<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Open or create the archive at `path` and spawn its I/O task.
    ///
    /// Once `max_object_count` objects are stored, the oldest are trimmed
    /// away until `trimmed_object_count` remain. Existing file content is
    /// counted with a block-length walk (no payloads are decoded); a torn
    /// trailing write from a crash is cut back to the last complete block.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `trimmed_object_count > max_object_count` or
    /// `max_object_count == 0`. Both are configuration bugs.
    pub async fn open(
        path: impl AsRef<Path>,
        max_object_count: u64,
        trimmed_object_count: u64,
    ) -> Result<Self, ArchiveError> {
        assert!(max_object_count > 0, "max_object_count must be nonzero");
        assert!(
            trimmed_object_count <= max_object_count,
            "trimmed_object_count must not exceed max_object_count"
        );

        let path = path.as_ref().to_path_buf();
        let mut file = BlockFile::open(&path).await?;
        let object_count = recover_valid_prefix(&mut file).await?;

        debug!(
            path = %path.display(),
            objects = object_count,
            "Opened archive"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker::<T> {
            file,
            path: path.clone(),
            object_count,
            max_object_count,
            trimmed_object_count,
            _marker: PhantomData,
        };
        tokio::spawn(worker.run(rx));

        Ok(Self {
            tx,
            path,
            max_object_count,
            trimmed_object_count,
        })
    }

    /// Serialize `object` now, on the calling thread, and enqueue the write.
    ///
    /// Returns as soon as the payload is handed to the I/O task, so the
    /// object's state at call time is what lands on disk, in call order.
    pub fn append(&self, object: &T) -> Result<(), ArchiveError> {
        let payload =
            postcard::to_allocvec(object).map_err(|e| ArchiveError::Serialization(e.to_string()))?;
        self.tx
            .send(Command::Append(payload))
            .map_err(|_| ArchiveError::Closed)
    }

    /// Read every stored object, oldest first.
    ///
    /// Reading stops silently at the first corrupt or undecodable block;
    /// whatever valid prefix exists is returned.
    pub async fn read_all(&self) -> Result<Vec<T>, ArchiveError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::ReadAll(reply_tx))
            .map_err(|_| ArchiveError::Closed)?;
        reply_rx.await.map_err(|_| ArchiveError::Closed)
    }

    /// Truncate the file to empty without deleting it.
    pub async fn clear(&self) -> Result<(), ArchiveError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Clear(reply_tx))
            .map_err(|_| ArchiveError::Closed)?;
        reply_rx.await.map_err(|_| ArchiveError::Closed)
    }

    /// Wait until every previously enqueued write has hit the file and the
    /// file's data is synced to the filesystem.
    pub async fn flush(&self) -> Result<(), ArchiveError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply_tx))
            .map_err(|_| ArchiveError::Closed)?;
        reply_rx.await.map_err(|_| ArchiveError::Closed)
    }

    /// Enqueue a flush without waiting for it.
    pub fn request_flush(&self) -> Result<(), ArchiveError> {
        let (reply_tx, _) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply_tx))
            .map_err(|_| ArchiveError::Closed)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count at which a trim fires.
    pub fn max_object_count(&self) -> u64 {
        self.max_object_count
    }

    /// Count a trim reduces the archive to.
    pub fn trimmed_object_count(&self) -> u64 {
        self.trimmed_object_count
    }
}

/// Walk the block lengths from the start of `file`, returning how many
/// complete blocks it holds. Trailing bytes that do not form a complete block
/// are truncated away, and the offset is left at the end of the file.
async fn recover_valid_prefix(file: &mut BlockFile) -> Result<u64, ArchiveError> {
    file.seek_to(0).await?;
    let mut count = 0u64;

    loop {
        let block_start = file.offset();
        let length = file.read_block_length().await?;
        if length == INVALID_BLOCK_LENGTH || length == 0 {
            file.seek_to(block_start).await?;
            break;
        }
        if !file.seek_forward(length).await? {
            file.seek_to(block_start).await?;
            break;
        }
        count += 1;
    }

    let valid_end = file.offset();
    if valid_end < file.len() {
        warn!(
            path = %file.path().display(),
            valid_end = valid_end,
            file_len = file.len(),
            "Dropping incomplete trailing block"
        );
        file.truncate_to(valid_end).await?;
    }
    file.seek_to_end().await?;

    Ok(count)
}

struct Worker<T> {
    file: BlockFile,
    path: PathBuf,
    object_count: u64,
    max_object_count: u64,
    trimmed_object_count: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Worker<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command<T>>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Append(payload) => self.append(&payload).await,
                Command::ReadAll(reply) => {
                    let _ = reply.send(self.read_all().await);
                }
                Command::Clear(reply) => {
                    self.clear().await;
                    let _ = reply.send(());
                }
                Command::Flush(reply) => {
                    if let Err(error) = self.file.sync().await {
                        warn!(path = %self.path.display(), error = %error, "Flush failed");
                    }
                    let _ = reply.send(());
                }
            }
        }

        // Last handle gone; leave whatever was written durable.
        if let Err(error) = self.file.sync().await {
            warn!(path = %self.path.display(), error = %error, "Final sync failed");
        }
        debug!(path = %self.path.display(), "Archive task exiting");
    }

    /// Persistence is best effort: an append that fails leaves the in-memory
    /// side of the system authoritative, so errors are logged and swallowed.
    async fn append(&mut self, payload: &[u8]) {
        if let Err(error) = self.try_append(payload).await {
            warn!(
                path = %self.path.display(),
                error = %error,
                "Failed to append block, dropping entry"
            );
        }
    }

    async fn try_append(&mut self, payload: &[u8]) -> Result<(), ArchiveError> {
        self.file.seek_to_end().await?;
        self.file.write_block(payload).await?;
        self.object_count += 1;

        if self.object_count >= self.max_object_count {
            self.trim().await?;
        }
        Ok(())
    }

    /// Drop the oldest blocks until `trimmed_object_count` remain.
    async fn trim(&mut self) -> Result<(), ArchiveError> {
        let excess = self.object_count.saturating_sub(self.trimmed_object_count);
        if excess == 0 {
            return Ok(());
        }

        self.file.seek_to(0).await?;
        let mut dropped = 0u64;
        while dropped < excess {
            let length = self.file.read_block_length().await?;
            if length == INVALID_BLOCK_LENGTH || length == 0 {
                break;
            }
            if !self.file.seek_forward(length).await? {
                break;
            }
            dropped += 1;
        }

        let cut = self.file.offset();
        self.file.truncate_from_start(cut, TRIM_CHUNK_SIZE).await?;
        self.object_count -= dropped;

        debug!(
            path = %self.path.display(),
            dropped = dropped,
            remaining = self.object_count,
            "Trimmed archive"
        );
        Ok(())
    }

    async fn read_all(&mut self) -> Vec<T> {
        let mut objects = Vec::new();

        if let Err(error) = self.file.seek_to(0).await {
            warn!(path = %self.path.display(), error = %error, "Seek failed, returning no objects");
            return objects;
        }

        loop {
            match self.file.read_block().await {
                Ok(ReadBlock::Data(payload)) => match postcard::from_bytes(&payload) {
                    Ok(object) => objects.push(object),
                    Err(error) => {
                        warn!(
                            path = %self.path.display(),
                            offset = self.file.offset(),
                            error = %error,
                            "Undecodable block, stopping read"
                        );
                        break;
                    }
                },
                Ok(ReadBlock::EndOfFile) => break,
                Ok(ReadBlock::Corrupt) => {
                    warn!(
                        path = %self.path.display(),
                        offset = self.file.offset(),
                        "Corrupt block, stopping read"
                    );
                    break;
                }
                Err(error) => {
                    warn!(path = %self.path.display(), error = %error, "Read failed, stopping");
                    break;
                }
            }
        }

        objects
    }

    async fn clear(&mut self) {
        if let Err(error) = self.file.truncate_to(0).await {
            warn!(path = %self.path.display(), error = %error, "Clear failed");
        }
        self.object_count = 0;
    }
}
