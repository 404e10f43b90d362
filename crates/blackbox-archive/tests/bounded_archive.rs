//! Durability and corruption behavior of the archive across process restarts,
//! simulated by reopening a fresh handle on the same file.

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use blackbox_archive::Archive;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    sequence: u32,
    body: String,
}

fn record(sequence: u32) -> Record {
    Record {
        sequence,
        body: format!("record {}", sequence),
    }
}

#[tokio::test]
async fn trimmed_archive_survives_restart_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("records.data");

    {
        let archive: Archive<Record> = Archive::open(&path, 5, 2).await.unwrap();
        for sequence in 0..5 {
            archive.append(&record(sequence)).unwrap();
        }
        archive.flush().await.unwrap();

        // Trim fired on the fifth append, keeping the two most recent.
        let live = archive.read_all().await.unwrap();
        assert_eq!(live, vec![record(3), record(4)]);
    }

    let reopened: Archive<Record> = Archive::open(&path, 5, 2).await.unwrap();
    let restored = reopened.read_all().await.unwrap();
    assert_eq!(restored, vec![record(3), record(4)]);
}

#[tokio::test]
async fn truncated_final_block_reads_as_shorter_history() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("records.data");

    {
        let archive: Archive<Record> = Archive::open(&path, 100, 50).await.unwrap();
        for sequence in 0..3 {
            archive.append(&record(sequence)).unwrap();
        }
        archive.flush().await.unwrap();
    }

    // Tear off the tail of the last block, as a crash mid-write would.
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

    let reopened: Archive<Record> = Archive::open(&path, 100, 50).await.unwrap();
    let survivors = reopened.read_all().await.unwrap();
    assert_eq!(survivors, vec![record(0), record(1)]);
}

#[tokio::test]
async fn appends_after_torn_write_stay_readable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("records.data");

    {
        let archive: Archive<Record> = Archive::open(&path, 100, 50).await.unwrap();
        archive.append(&record(0)).unwrap();
        archive.append(&record(1)).unwrap();
        archive.flush().await.unwrap();
    }

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();

    // Opening recovers the valid prefix, so new appends land on a clean
    // block boundary instead of extending the torn one.
    let reopened: Archive<Record> = Archive::open(&path, 100, 50).await.unwrap();
    reopened.append(&record(2)).unwrap();
    reopened.flush().await.unwrap();

    assert_eq!(
        reopened.read_all().await.unwrap(),
        vec![record(0), record(2)]
    );

    let fresh: Archive<Record> = Archive::open(&path, 100, 50).await.unwrap();
    assert_eq!(fresh.read_all().await.unwrap(), vec![record(0), record(2)]);
}

#[tokio::test]
async fn clear_empties_the_file_across_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("records.data");

    {
        let archive: Archive<Record> = Archive::open(&path, 10, 5).await.unwrap();
        for sequence in 0..4 {
            archive.append(&record(sequence)).unwrap();
        }
        archive.clear().await.unwrap();
        archive.flush().await.unwrap();
    }

    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

    let reopened: Archive<Record> = Archive::open(&path, 10, 5).await.unwrap();
    assert!(reopened.read_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn interleaved_handles_share_one_ordered_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("records.data");

    let archive: Archive<Record> = Archive::open(&path, 100, 50).await.unwrap();
    let second = archive.clone();

    archive.append(&record(0)).unwrap();
    second.append(&record(1)).unwrap();
    archive.append(&record(2)).unwrap();

    assert_eq!(
        archive.read_all().await.unwrap(),
        vec![record(0), record(1), record(2)]
    );
}
