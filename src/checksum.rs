//! Checksum-line parsing and filename rules.
//!
//! Uploads carry the line `sha512sum` prints for the file:
//!
//! ```text
//! <128 lowercase hex digits> <mode> <filename>
//! ```
//!
//! where `<mode>` is `*` (binary) or a space (text).  The line is stored
//! verbatim next to the committed file, so the parsed form keeps the raw
//! text as well.

use crate::errors::UploadError;

/// Length of a hex-encoded SHA-512 digest.
pub const DIGEST_HEX_LEN: usize = 128;

/// Shortest accepted filename, in characters.
pub const MIN_FILENAME_LEN: usize = 4;

/// Mode flag between digest and filename.  Parsed but not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestMode {
    /// `*` -- the file was read in binary mode.
    Binary,
    /// ` ` -- the file was read in text mode.
    Text,
}

/// A parsed checksum line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumLine {
    /// Lowercase hex digest.
    pub digest: String,
    pub mode: DigestMode,
    /// Filename named by the line.
    pub filename: String,
    /// The line exactly as submitted.
    pub raw: String,
}

impl ChecksumLine {
    /// Parse a checksum line.
    ///
    /// The filename runs from after the mode flag to the first line break;
    /// anything after a line break is ignored for parsing but kept in `raw`.
    pub fn parse(line: &str) -> Result<Self, UploadError> {
        let bytes = line.as_bytes();
        if bytes.len() < DIGEST_HEX_LEN + 3 {
            return Err(UploadError::BadChecksumLine);
        }

        let digest = &bytes[..DIGEST_HEX_LEN];
        if !digest.iter().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(UploadError::BadChecksumLine);
        }
        if bytes[DIGEST_HEX_LEN] != b' ' {
            return Err(UploadError::BadChecksumLine);
        }
        let mode = match bytes[DIGEST_HEX_LEN + 1] {
            b'*' => DigestMode::Binary,
            b' ' => DigestMode::Text,
            _ => return Err(UploadError::BadChecksumLine),
        };

        // All bytes up to here are ASCII, so this is a char boundary.
        let rest = &line[DIGEST_HEX_LEN + 2..];
        let filename = rest.split('\n').next().unwrap_or_default();
        if filename.is_empty() {
            return Err(UploadError::BadChecksumLine);
        }

        Ok(Self {
            digest: line[..DIGEST_HEX_LEN].to_string(),
            mode,
            filename: filename.to_string(),
            raw: line.to_string(),
        })
    }
}

/// Check a filename is usable as a single path segment.
///
/// The length rule is checked before the separator rule.
pub fn validate_filename(filename: &str) -> Result<(), UploadError> {
    if filename.chars().count() < MIN_FILENAME_LEN {
        return Err(UploadError::FilenameLength);
    }
    if filename.contains(['/', '\\']) {
        return Err(UploadError::FilenameSlash);
    }
    Ok(())
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// SHA-512 of 64 KiB of `0`.
    const HASH: &str = "5b42c8db4346cf5fdcb8a2299fdc557b336b8e599a31ff0f13089742bf83b27ad358c94f255a716230c35eed1bc390b95e3bb07b3c545f0c42269da84a104a07";

    #[test]
    fn test_parse_text_mode() {
        let line = format!("{HASH}  a-file");
        let parsed = ChecksumLine::parse(&line).unwrap();
        assert_eq!(parsed.digest, HASH);
        assert_eq!(parsed.mode, DigestMode::Text);
        assert_eq!(parsed.filename, "a-file");
        assert_eq!(parsed.raw, line);
    }

    #[test]
    fn test_parse_binary_mode() {
        let parsed = ChecksumLine::parse(&format!("{HASH} *a-file.tar.gz")).unwrap();
        assert_eq!(parsed.mode, DigestMode::Binary);
        assert_eq!(parsed.filename, "a-file.tar.gz");
    }

    #[test]
    fn test_parse_keeps_leading_space_in_filename() {
        let parsed = ChecksumLine::parse(&format!("{HASH}   a-file")).unwrap();
        assert_eq!(parsed.mode, DigestMode::Text);
        assert_eq!(parsed.filename, " a-file");
    }

    #[test]
    fn test_parse_stops_at_newline() {
        let line = format!("{HASH}  a-file\n");
        let parsed = ChecksumLine::parse(&line).unwrap();
        assert_eq!(parsed.filename, "a-file");
        assert_eq!(parsed.raw, line);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            ChecksumLine::parse("123"),
            Err(UploadError::BadChecksumLine)
        ));
        // Uppercase hex.
        let upper = HASH.to_uppercase();
        assert!(ChecksumLine::parse(&format!("{upper}  a-file")).is_err());
        // Short digest.
        assert!(ChecksumLine::parse(&format!("{}  a-file", &HASH[1..])).is_err());
        // Bad mode flag.
        assert!(ChecksumLine::parse(&format!("{HASH} xa-file")).is_err());
        // Missing filename.
        assert!(ChecksumLine::parse(&format!("{HASH}  ")).is_err());
        assert!(ChecksumLine::parse(&format!("{HASH}  \na-file")).is_err());
        // Tab instead of space.
        assert!(ChecksumLine::parse(&format!("{HASH}\t a-file")).is_err());
    }

    #[test]
    fn test_parse_non_ascii_filename() {
        let parsed = ChecksumLine::parse(&format!("{HASH}  ünïcødé")).unwrap();
        assert_eq!(parsed.filename, "ünïcødé");
    }

    #[test]
    fn test_validate_filename_length() {
        assert!(matches!(
            validate_filename("abc"),
            Err(UploadError::FilenameLength)
        ));
        assert!(validate_filename("abcd").is_ok());
        // Length counts characters, not bytes.
        assert!(matches!(
            validate_filename("äöü"),
            Err(UploadError::FilenameLength)
        ));
    }

    #[test]
    fn test_validate_filename_separators() {
        assert!(matches!(
            validate_filename("abc/"),
            Err(UploadError::FilenameSlash)
        ));
        assert!(matches!(
            validate_filename("abc\\"),
            Err(UploadError::FilenameSlash)
        ));
        assert!(matches!(
            validate_filename("../../etc/passwd"),
            Err(UploadError::FilenameSlash)
        ));
    }

    #[test]
    fn test_validate_filename_length_checked_first() {
        assert!(matches!(
            validate_filename("a/"),
            Err(UploadError::FilenameLength)
        ));
    }
}
