//! Foundational low-level utilities shared across the WeChat bridge crates.
//!
//! Provides atomic file-write helpers and unix-time utilities used by cache
//! persistence and token/media expiry calculations.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::current_unix_timestamp;

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    #[test]
    fn unix_timestamp_is_monotonic_enough() {
        let first = current_unix_timestamp();
        let second = current_unix_timestamp();
        assert!(second >= first);
    }

    #[test]
    fn write_text_atomic_writes_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("entry.json");
        write_text_atomic(&path, "{\"token\":\"t\"}").expect("write");
        let contents = read_to_string(&path).expect("read");
        assert_eq!(contents, "{\"token\":\"t\"}");
    }

    #[test]
    fn write_text_atomic_overwrites_existing_entry() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("entry.json");
        write_text_atomic(&path, "first").expect("first write");
        write_text_atomic(&path, "second").expect("second write");
        let contents = read_to_string(&path).expect("read");
        assert_eq!(contents, "second");
    }

    #[test]
    fn write_text_atomic_leaves_no_staging_file_behind() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("entry.json");
        write_text_atomic(&path, "{}").expect("write");
        let entries: Vec<_> = std::fs::read_dir(tempdir.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("entry.json")]);
    }

    #[test]
    fn write_text_atomic_rejects_directory_target() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        assert!(write_text_atomic(tempdir.path(), "{}").is_err());
    }
}
