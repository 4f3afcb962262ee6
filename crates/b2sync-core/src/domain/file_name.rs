//! Remote file-name rules
//!
//! Names stored in a bucket are `/`-separated UTF-8 strings with a few
//! additional restrictions. Local scanning uses these rules to skip entries
//! that could never be uploaded.

use super::errors::DomainError;

/// Maximum length of a whole name, in UTF-8 bytes.
pub const MAX_FILE_NAME_BYTES: usize = 1000;

/// Maximum length of one `/`-separated segment, in UTF-8 bytes.
pub const MAX_SEGMENT_BYTES: usize = 250;

/// Check that `name` is acceptable as a remote file name.
///
/// # Errors
///
/// Returns [`DomainError::InvalidFileName`] describing the first rule that
/// `name` breaks.
pub fn validate_file_name(name: &str) -> Result<(), DomainError> {
    let invalid = |msg: &str| Err(DomainError::InvalidFileName(msg.to_string()));

    if name.is_empty() {
        return invalid("file name too short (0 utf-8 bytes)");
    }
    if name.len() > MAX_FILE_NAME_BYTES {
        return invalid("file name too long (more than 1000 utf-8 bytes)");
    }
    if name.starts_with('/') {
        return invalid("file names must not start with '/'");
    }
    if name.ends_with('/') {
        return invalid("file names must not end with '/'");
    }
    if name.contains('\\') {
        return invalid("file names must not contain '\\'");
    }
    if name.contains("//") {
        return invalid("file names must not contain '//'");
    }
    if name.contains('\u{7f}') {
        return invalid("file names must not contain DEL");
    }
    if name.split('/').any(|segment| segment.len() > MAX_SEGMENT_BYTES) {
        return invalid("file names segments (between '/') can be at most 250 utf-8 bytes");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(name: &str) -> String {
        match validate_file_name(name) {
            Err(DomainError::InvalidFileName(msg)) => msg,
            other => panic!("expected InvalidFileName for {name:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_accepts_ordinary_names() {
        assert!(validate_file_name("a.txt").is_ok());
        assert!(validate_file_name("dir/sub/file name.bin").is_ok());
        assert!(validate_file_name("ünïcödé").is_ok());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(message("").contains("too short"));
    }

    #[test]
    fn test_rejects_separators() {
        assert!(message("/abs").contains("start with"));
        assert!(message("dir/").contains("end with"));
        assert!(message("a\\b").contains("'\\'"));
        assert!(message("a//b").contains("'//'"));
    }

    #[test]
    fn test_rejects_del() {
        assert!(message("bad\u{7f}name").contains("DEL"));
    }

    #[test]
    fn test_length_limits() {
        let segment = "x".repeat(MAX_SEGMENT_BYTES);
        assert!(validate_file_name(&segment).is_ok());
        assert!(message(&format!("{segment}x")).contains("segments"));

        // Four segments of 250 bytes plus separators exceed 1000 bytes.
        let long = vec![segment.as_str(); 4].join("/");
        assert!(message(&long).contains("too long"));
    }
}
