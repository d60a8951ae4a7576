//! Local beatmap database scanner
//!
//! Resolves a beatmap's on-disk path from its content hash by walking the
//! versioned record stream of `osu!.db`. Only the hash, file name, folder
//! name and mode byte are ever materialized; every other field is skipped
//! at its declared length. The scan is O(records) with O(1) extra memory
//! and keeps no state between lookups.

use crate::cursor::ByteCursor;
use crate::error::FetchError;
use osufetch_types::GameMode;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Databases written before this revision carry an extra 4-byte field
/// per record.
const LEGACY_FIELD_VERSION: u32 = 20191106;

/// Read-only scanner over a local beatmap database file.
#[derive(Clone)]
pub struct DatabaseScanner {
    db_path: PathBuf,
}

impl DatabaseScanner {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// Resolve the `songs_root/folder/file` path of the standard-mode
    /// record whose hash matches `target_hash`.
    ///
    /// Returns `Ok(None)` when no record matches; a file whose record
    /// boundaries are violated surfaces a decode (IO) error.
    pub fn resolve_beatmap_path(
        &self,
        songs_root: &Path,
        target_hash: &str,
    ) -> Result<Option<PathBuf>, FetchError> {
        let file = File::open(&self.db_path)?;
        let mut cursor = ByteCursor::new(BufReader::new(file));
        let result = scan(&mut cursor, songs_root, target_hash)?;
        if result.is_none() {
            debug!("no local record for hash {}", target_hash);
        }
        Ok(result)
    }
}

fn scan<R: Read>(
    cursor: &mut ByteCursor<R>,
    songs_root: &Path,
    target_hash: &str,
) -> Result<Option<PathBuf>, FetchError> {
    let version = cursor.read_u32()?;
    // folder count, account-unlocked flag and unlock date
    cursor.skip(13)?;
    // player name
    cursor.skip_string()?;

    let record_count = cursor.read_u32()?;
    debug!(
        "scanning {} records (database version {})",
        record_count, version
    );

    for _ in 0..record_count {
        if version < LEGACY_FIELD_VERSION {
            cursor.skip(4)?;
        }
        // artist, artist unicode, title, title unicode, creator,
        // difficulty name, audio file
        for _ in 0..7 {
            cursor.skip_string()?;
        }

        let hash = cursor.read_string()?;
        let file_name = cursor.read_string()?;

        cursor.skip(39)?;
        // four star-rating tables, 14 bytes per entry
        for _ in 0..4 {
            let entries = cursor.read_u32()?;
            cursor.skip(14 * u64::from(entries))?;
        }
        cursor.skip(12)?;
        // timing points, 17 bytes each
        let timing_points = cursor.read_u32()?;
        cursor.skip(17 * u64::from(timing_points))?;
        cursor.skip(22)?;

        let mode = cursor.read_u8()?;

        cursor.skip_string()?;
        cursor.skip_string()?;
        cursor.skip(2)?;
        cursor.skip_string()?;
        cursor.skip(10)?;

        let folder_name = cursor.read_string()?;

        if GameMode::from_byte(mode) == Some(GameMode::Standard) && hash == target_hash {
            return Ok(Some(songs_root.join(folder_name).join(file_name)));
        }

        cursor.skip(18)?;
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn push_u32(buf: &mut Vec<u8>, value: u32) {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    fn push_string(buf: &mut Vec<u8>, value: &str) {
        buf.push(0x0b);
        let mut len = value.len() as u64;
        loop {
            let mut byte = (len & 0x7f) as u8;
            len >>= 7;
            if len != 0 {
                byte |= 0x80;
            }
            buf.push(byte);
            if len == 0 {
                break;
            }
        }
        buf.extend_from_slice(value.as_bytes());
    }

    #[derive(Clone)]
    struct TestRecord<'a> {
        hash: &'a str,
        file_name: &'a str,
        folder_name: &'a str,
        mode: u8,
    }

    fn push_record(buf: &mut Vec<u8>, version: u32, record: &TestRecord) {
        if version < LEGACY_FIELD_VERSION {
            push_u32(buf, 0xdead_beef);
        }
        for label in ["artist", "artist!", "title", "title!", "creator", "diff", "audio.mp3"] {
            push_string(buf, label);
        }
        push_string(buf, record.hash);
        push_string(buf, record.file_name);
        buf.extend_from_slice(&[0u8; 39]);
        // star-rating tables with uneven entry counts
        for entries in [2u32, 0, 1, 3] {
            push_u32(buf, entries);
            buf.extend_from_slice(&vec![0u8; 14 * entries as usize]);
        }
        buf.extend_from_slice(&[0u8; 12]);
        push_u32(buf, 2);
        buf.extend_from_slice(&[0u8; 17 * 2]);
        buf.extend_from_slice(&[0u8; 22]);
        buf.push(record.mode);
        push_string(buf, "source");
        push_string(buf, "tags");
        buf.extend_from_slice(&[0u8; 2]);
        push_string(buf, "letterbox");
        buf.extend_from_slice(&[0u8; 10]);
        push_string(buf, record.folder_name);
        buf.extend_from_slice(&[0u8; 18]);
    }

    fn build_database(version: u32, records: &[TestRecord]) -> Vec<u8> {
        let mut buf = Vec::new();
        push_u32(&mut buf, version);
        buf.extend_from_slice(&[0u8; 13]);
        push_string(&mut buf, "player");
        push_u32(&mut buf, records.len() as u32);
        for record in records {
            push_record(&mut buf, version, record);
        }
        buf
    }

    fn scan_bytes(bytes: &[u8], hash: &str) -> Result<Option<PathBuf>, FetchError> {
        let mut cursor = ByteCursor::new(Cursor::new(bytes));
        scan(&mut cursor, Path::new("songs"), hash)
    }

    #[test]
    fn resolves_matching_standard_record() {
        let db = build_database(
            20200101,
            &[TestRecord {
                hash: "abc123",
                file_name: "Artist - Title [Normal].osu",
                folder_name: "123 Artist - Title",
                mode: 0,
            }],
        );

        let path = scan_bytes(&db, "abc123").unwrap().unwrap();
        assert_eq!(
            path,
            Path::new("songs")
                .join("123 Artist - Title")
                .join("Artist - Title [Normal].osu")
        );
    }

    #[test]
    fn unmatched_hash_is_not_found() {
        let db = build_database(
            20200101,
            &[TestRecord {
                hash: "abc123",
                file_name: "a.osu",
                folder_name: "a",
                mode: 0,
            }],
        );

        assert!(scan_bytes(&db, "zzz").unwrap().is_none());
    }

    #[test]
    fn matching_hash_with_non_standard_mode_is_not_found() {
        let db = build_database(
            20200101,
            &[TestRecord {
                hash: "abc123",
                file_name: "a.osu",
                folder_name: "a",
                mode: 3,
            }],
        );

        assert!(scan_bytes(&db, "abc123").unwrap().is_none());
    }

    #[test]
    fn match_in_later_record_is_reached() {
        let db = build_database(
            20200101,
            &[
                TestRecord {
                    hash: "first",
                    file_name: "first.osu",
                    folder_name: "one",
                    mode: 0,
                },
                TestRecord {
                    hash: "second",
                    file_name: "second.osu",
                    folder_name: "two",
                    mode: 0,
                },
            ],
        );

        let path = scan_bytes(&db, "second").unwrap().unwrap();
        assert_eq!(path, Path::new("songs").join("two").join("second.osu"));
    }

    #[test]
    fn legacy_version_skips_extra_field_per_record() {
        let record = TestRecord {
            hash: "abc123",
            file_name: "a.osu",
            folder_name: "folder",
            mode: 0,
        };

        // Same logical record; 20191105 carries 4 extra bytes, 20191107
        // does not. Both must land on the same field boundaries.
        for version in [20191105, 20191107] {
            let db = build_database(version, &[record.clone()]);
            let path = scan_bytes(&db, "abc123").unwrap().unwrap();
            assert_eq!(path, Path::new("songs").join("folder").join("a.osu"));
        }
    }

    #[test]
    fn truncated_record_is_a_decode_error() {
        let mut db = build_database(
            20200101,
            &[TestRecord {
                hash: "abc123",
                file_name: "a.osu",
                folder_name: "a",
                mode: 0,
            }],
        );
        db.truncate(db.len() - 40);

        assert!(scan_bytes(&db, "no-such-hash").is_err());
    }

    #[test]
    fn scanner_reads_from_disk() {
        let db = build_database(
            20200101,
            &[TestRecord {
                hash: "abc123",
                file_name: "a.osu",
                folder_name: "folder",
                mode: 0,
            }],
        );

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("osu!.db");
        std::fs::write(&db_path, &db).unwrap();

        let scanner = DatabaseScanner::new(&db_path);
        let path = scanner
            .resolve_beatmap_path(Path::new("songs"), "abc123")
            .unwrap()
            .unwrap();
        assert_eq!(path, Path::new("songs").join("folder").join("a.osu"));
        assert!(scanner
            .resolve_beatmap_path(Path::new("songs"), "zzz")
            .unwrap()
            .is_none());
    }
}
