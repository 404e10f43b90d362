//! Length-prefixed block framing over a seekable file
//!
//! Every block on disk is a 4-byte big-endian length field followed by that
//! many payload bytes. There is no file header and no checksum; a block is
//! trusted exactly as far as its length field stays within the file, which is
//! enough to detect the torn trailing write a crash leaves behind.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::ArchiveError;

/// Width of the length field preceding every block.
pub const BLOCK_LENGTH_WIDTH: u64 = 4;

/// Reserved length value reported when a complete length field cannot be
/// read at the current offset. Never written by [`BlockFile::write_block`].
pub const INVALID_BLOCK_LENGTH: u32 = u32::MAX;

/// Outcome of reading one block at the current offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadBlock {
    /// A complete block; the offset now points at the next block.
    Data(Vec<u8>),
    /// The offset sits exactly at the end of the file.
    EndOfFile,
    /// The bytes at the offset are not a complete block. The offset is left
    /// where it was so callers keep the position of the first invalid byte.
    Corrupt,
}

/// A file of length-prefixed blocks with an explicitly tracked offset.
///
/// The file is assumed to be exclusively owned by this handle; the tracked
/// length is only correct while nothing else writes to the path.
pub struct BlockFile {
    file: File,
    path: PathBuf,
    offset: u64,
    len: u64,
}

impl BlockFile {
    /// Open the file at `path`, creating it (and its parent directory) if
    /// missing. Existing content is left untouched; the offset starts at 0.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArchiveError::Io(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| ArchiveError::Io(e.to_string()))?;

        let metadata = file
            .metadata()
            .await
            .map_err(|e| ArchiveError::Io(e.to_string()))?;

        Ok(Self {
            file,
            path,
            offset: 0,
            len: metadata.len(),
        })
    }

    /// Current offset in bytes.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Tracked file length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the file holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path this file was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.offset)
    }

    /// Move the offset to an absolute position.
    pub async fn seek_to(&mut self, offset: u64) -> Result<(), ArchiveError> {
        self.file
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| ArchiveError::Io(e.to_string()))?;
        self.offset = offset;
        Ok(())
    }

    /// Move the offset to the end of the file, returning it.
    pub async fn seek_to_end(&mut self) -> Result<u64, ArchiveError> {
        let end = self.len;
        self.seek_to(end).await?;
        Ok(end)
    }

    /// Write one block (length field plus payload) at the current offset,
    /// overwriting whatever is there. Callers appending must seek to the end
    /// of the file first. The offset ends up just past the written block.
    pub async fn write_block(&mut self, data: &[u8]) -> Result<(), ArchiveError> {
        debug_assert!(!data.is_empty(), "blocks must carry at least one byte");

        let len_bytes = (data.len() as u32).to_be_bytes();
        self.file
            .write_all(&len_bytes)
            .await
            .map_err(|e| ArchiveError::Io(e.to_string()))?;
        self.file
            .write_all(data)
            .await
            .map_err(|e| ArchiveError::Io(e.to_string()))?;

        self.offset += BLOCK_LENGTH_WIDTH + data.len() as u64;
        self.len = self.len.max(self.offset);
        Ok(())
    }

    /// Read the length field at the current offset, advancing past it.
    ///
    /// Returns [`INVALID_BLOCK_LENGTH`] without moving the offset when fewer
    /// than [`BLOCK_LENGTH_WIDTH`] bytes remain.
    pub async fn read_block_length(&mut self) -> Result<u32, ArchiveError> {
        if self.remaining() < BLOCK_LENGTH_WIDTH {
            return Ok(INVALID_BLOCK_LENGTH);
        }

        let mut len_buf = [0u8; 4];
        self.file
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| ArchiveError::Io(e.to_string()))?;
        self.offset += BLOCK_LENGTH_WIDTH;

        Ok(u32::from_be_bytes(len_buf))
    }

    /// Advance the offset by `block_length` bytes.
    ///
    /// Returns `false` and leaves the offset untouched if `block_length` is
    /// the invalid-length sentinel or reaches past the end of the file.
    pub async fn seek_forward(&mut self, block_length: u32) -> Result<bool, ArchiveError> {
        if block_length == INVALID_BLOCK_LENGTH || u64::from(block_length) > self.remaining() {
            return Ok(false);
        }

        let target = self.offset + u64::from(block_length);
        self.seek_to(target).await?;
        Ok(true)
    }

    /// Read the block at the current offset.
    ///
    /// Zero-length fields are treated as corruption; no written block is ever
    /// empty. On [`ReadBlock::Corrupt`] the offset is restored to the start
    /// of the failed block.
    pub async fn read_block(&mut self) -> Result<ReadBlock, ArchiveError> {
        let start = self.offset;
        if self.remaining() == 0 {
            return Ok(ReadBlock::EndOfFile);
        }

        let block_length = self.read_block_length().await?;
        if block_length == INVALID_BLOCK_LENGTH || block_length == 0 {
            self.seek_to(start).await?;
            return Ok(ReadBlock::Corrupt);
        }

        if u64::from(block_length) > self.remaining() {
            self.seek_to(start).await?;
            return Ok(ReadBlock::Corrupt);
        }

        let mut payload = vec![0u8; block_length as usize];
        self.file
            .read_exact(&mut payload)
            .await
            .map_err(|e| ArchiveError::Io(e.to_string()))?;
        self.offset += u64::from(block_length);

        Ok(ReadBlock::Data(payload))
    }

    /// Remove the first `offset` bytes of the file, shifting the rest down to
    /// position 0 by copying in chunks of at most `max_chunk_size` bytes.
    /// A `max_chunk_size` of 0 copies everything in one pass. The offset is
    /// left at the new end of the file.
    pub async fn truncate_from_start(
        &mut self,
        offset: u64,
        max_chunk_size: u64,
    ) -> Result<(), ArchiveError> {
        if offset == 0 {
            return Ok(());
        }
        if offset >= self.len {
            return self.truncate_to(0).await;
        }

        let to_move = self.len - offset;
        let chunk_size = if max_chunk_size == 0 {
            to_move
        } else {
            max_chunk_size.min(to_move)
        };
        let mut buffer = vec![0u8; chunk_size as usize];

        let mut read_pos = offset;
        let mut write_pos = 0u64;
        while read_pos < self.len {
            let count = chunk_size.min(self.len - read_pos) as usize;
            let chunk = &mut buffer[..count];

            self.file
                .seek(SeekFrom::Start(read_pos))
                .await
                .map_err(|e| ArchiveError::Io(e.to_string()))?;
            self.file
                .read_exact(chunk)
                .await
                .map_err(|e| ArchiveError::Io(e.to_string()))?;

            self.file
                .seek(SeekFrom::Start(write_pos))
                .await
                .map_err(|e| ArchiveError::Io(e.to_string()))?;
            self.file
                .write_all(chunk)
                .await
                .map_err(|e| ArchiveError::Io(e.to_string()))?;

            read_pos += count as u64;
            write_pos += count as u64;
        }

        self.offset = write_pos;
        self.truncate_to(write_pos).await
    }

    /// Shrink the file to `new_len` bytes, clamping the offset to it.
    pub async fn truncate_to(&mut self, new_len: u64) -> Result<(), ArchiveError> {
        self.file
            .set_len(new_len)
            .await
            .map_err(|e| ArchiveError::Io(e.to_string()))?;
        self.len = new_len;
        if self.offset > new_len {
            self.seek_to(new_len).await?;
        }
        Ok(())
    }

    /// Push written data down to the filesystem.
    pub async fn sync(&mut self) -> Result<(), ArchiveError> {
        self.file
            .sync_data()
            .await
            .map_err(|e| ArchiveError::Io(e.to_string()))
    }
}
