//! Low-level utilities shared across Herald crates.
//!
//! Provides the atomic text write used by persisted sync state and the unix
//! time helpers stamped into cache records.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    #[test]
    fn unit_time_utils_seconds_and_millis_agree() {
        let now_s = current_unix_timestamp();
        let now_ms = current_unix_timestamp_ms();
        let now_ms_s = now_ms / 1_000;
        assert!(now_ms_s >= now_s);
        assert!(now_ms_s <= now_s.saturating_add(1));
    }

    #[test]
    fn functional_write_text_atomic_replaces_existing_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("state").join("cache.json");
        write_text_atomic(&path, "first").expect("first write");
        write_text_atomic(&path, "second").expect("second write");
        let contents = read_to_string(&path).expect("read");
        assert_eq!(contents, "second");
    }

    #[test]
    fn regression_write_text_atomic_rejects_directory_destination() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let error = write_text_atomic(tempdir.path(), "payload").expect_err("directory target");
        assert!(error.to_string().contains("is a directory"));
    }
}
