//! # blackbox-archive
//!
//! Bounded, corruption-tolerant on-disk archives of serializable objects.
//!
//! The on-disk format is a headerless sequence of `[length: u32 BE][payload]`
//! blocks, one postcard-encoded object per block, oldest first. Reads stop at
//! the first block that does not fit inside the file, so a crash mid-write
//! costs at most the entry being written.
//!
//! ## Example
//!
//! ```rust,ignore
//! use blackbox_archive::Archive;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), blackbox_archive::ArchiveError> {
//!     // Keep at most 1000 entries; trim back to 500 when full.
//!     let archive: Archive<String> = Archive::open("./data/notes.data", 1000, 500).await?;
//!
//!     archive.append(&"hello".to_string())?;
//!     archive.flush().await?;
//!
//!     let notes = archive.read_all().await?;
//!     assert_eq!(notes.last().map(String::as_str), Some("hello"));
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod block_file;
pub mod error;

// Re-exports
pub use archive::Archive;
pub use block_file::{BLOCK_LENGTH_WIDTH, BlockFile, INVALID_BLOCK_LENGTH, ReadBlock};
pub use error::ArchiveError;
