//! Upload form validation.
//!
//! The handler collects the multipart fields into an [`UploadForm`] while
//! streaming the file part to staging; [`UploadForm::validate`] then turns
//! it into an [`UploadRequest`] or the first applicable rejection, in this
//! order: missing file, missing/invalid fields, malformed checksum line,
//! filename length, filename separators, filename mismatch.

use std::collections::HashMap;

use crate::checksum::{validate_filename, ChecksumLine};
use crate::errors::UploadError;
use crate::storage::staging::StagedPayload;

/// Form field naming the project.
pub const FIELD_PROJECT: &str = "project";
/// Form field naming the version.
pub const FIELD_VERSION: &str = "version";
/// Form field carrying the checksum line.
pub const FIELD_SHA512: &str = "sha512";
/// Optional form field requesting archive extraction.
pub const FIELD_EXTRACT: &str = "extract";
/// Multipart part carrying the payload.
pub const PART_FILE: &str = "file";

/// The `file` part after staging.
#[derive(Debug)]
pub struct FilePart {
    /// Filename reported in the part's `Content-Disposition`.
    pub filename: String,
    pub staged: StagedPayload,
}

/// Raw multipart input, before validation.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<FilePart>,
    pub fields: HashMap<String, String>,
}

/// A structurally valid upload whose payload is staged but not yet verified.
#[derive(Debug)]
pub struct UploadRequest {
    pub project: String,
    pub version: String,
    pub checksum: ChecksumLine,
    pub filename: String,
    pub staged: StagedPayload,
    pub extract: bool,
}

impl UploadRequest {
    /// Name of the version directory, `{project}-{version}`.
    pub fn version_dir_name(&self) -> String {
        format!("{}-{}", self.project, self.version)
    }
}

impl UploadForm {
    /// Record a text field.  The first occurrence of a name wins.
    pub fn insert_field(&mut self, name: String, value: String) {
        self.fields.entry(name).or_insert(value);
    }

    /// Validate the collected form.
    ///
    /// On rejection the staged payload is dropped, which removes its
    /// temporary file.
    pub fn validate(mut self) -> Result<UploadRequest, UploadError> {
        let file = self.file.take().ok_or(UploadError::NoFile)?;

        let project = self.take_segment(FIELD_PROJECT)?;
        let version = self.take_segment(FIELD_VERSION)?;
        let line = self
            .fields
            .remove(FIELD_SHA512)
            .ok_or(UploadError::BadForm)?;

        let checksum = ChecksumLine::parse(&line)?;
        validate_filename(&checksum.filename)?;
        if checksum.filename != file.filename {
            return Err(UploadError::FilenameMismatch);
        }

        let extract = self
            .fields
            .get(FIELD_EXTRACT)
            .is_some_and(|v| is_truthy(v));

        Ok(UploadRequest {
            project,
            version,
            checksum,
            filename: file.filename,
            staged: file.staged,
            extract,
        })
    }

    /// Take a field that will become a directory name.
    fn take_segment(&mut self, name: &str) -> Result<String, UploadError> {
        let value = self.fields.remove(name).ok_or(UploadError::BadForm)?;
        if !is_safe_segment(&value) || (name == FIELD_PROJECT && value.starts_with('.')) {
            return Err(UploadError::BadForm);
        }
        Ok(value)
    }
}

/// `1` or `true`, ignoring case and surrounding whitespace.
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// A non-empty single path component that cannot climb out of its parent.
fn is_safe_segment(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0'])
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::staging::Stager;

    const HASH: &str = "5b42c8db4346cf5fdcb8a2299fdc557b336b8e599a31ff0f13089742bf83b27ad358c94f255a716230c35eed1bc390b95e3bb07b3c545f0c42269da84a104a07";

    async fn staged(dir: &std::path::Path) -> StagedPayload {
        let mut stager = Stager::create(dir).unwrap();
        stager.write(b"payload").await.unwrap();
        stager.finish().await.unwrap()
    }

    async fn form(dir: &std::path::Path, fields: &[(&str, &str)]) -> UploadForm {
        let mut form = UploadForm {
            file: Some(FilePart {
                filename: "a-file".to_string(),
                staged: staged(dir).await,
            }),
            ..Default::default()
        };
        for (k, v) in fields {
            form.insert_field(k.to_string(), v.to_string());
        }
        form
    }

    fn reason(result: Result<UploadRequest, UploadError>) -> &'static str {
        match result {
            Ok(_) => "OK",
            Err(e) => e.code(),
        }
    }

    #[tokio::test]
    async fn test_missing_file() {
        let form = UploadForm::default();
        assert_eq!(reason(form.validate()), "NOFILE");
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let line = format!("{HASH}  a-file");
        assert_eq!(reason(form(dir.path(), &[]).await.validate()), "BADFORM");
        assert_eq!(
            reason(
                form(dir.path(), &[("project", "abc"), ("sha512", &line)])
                    .await
                    .validate()
            ),
            "BADFORM"
        );
        assert_eq!(
            reason(
                form(dir.path(), &[("project", "abc"), ("version", "1.0")])
                    .await
                    .validate()
            ),
            "BADFORM"
        );
    }

    #[tokio::test]
    async fn test_rejected_form_removes_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let form = form(dir.path(), &[]).await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert!(form.validate().is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unsafe_segments_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let line = format!("{HASH}  a-file");
        for (project, version) in [
            ("..", "1.0"),
            ("abc", ".."),
            ("a/b", "1.0"),
            ("abc", "1\\0"),
            ("", "1.0"),
            (".staging", "1.0"),
        ] {
            let result = form(
                dir.path(),
                &[("project", project), ("version", version), ("sha512", &line)],
            )
            .await
            .validate();
            assert_eq!(reason(result), "BADFORM", "{project:?} {version:?}");
        }
    }

    #[tokio::test]
    async fn test_validation_order() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("123".to_string(), "BADFORM_SHA512"),
            (format!("{HASH}  abc"), "BADFILENAME_LENGTH"),
            (format!("{HASH}  abc/"), "BADFILENAME_SLASH"),
            (format!("{HASH}  abc\\"), "BADFILENAME_SLASH"),
            (format!("{HASH}  abcwd"), "BADSHA512_FILENAME"),
            (format!("{HASH}  a-file"), "OK"),
        ];
        for (line, expected) in cases {
            let result = form(
                dir.path(),
                &[("project", "abc"), ("version", "1.0"), ("sha512", &line)],
            )
            .await
            .validate();
            assert_eq!(reason(result), expected, "{line}");
        }
    }

    #[tokio::test]
    async fn test_valid_request() {
        let dir = tempfile::tempdir().unwrap();
        let line = format!("{HASH}  a-file");
        let request = form(
            dir.path(),
            &[
                ("project", "abc"),
                ("version", "1.0"),
                ("sha512", &line),
                ("extract", "TRUE"),
            ],
        )
        .await
        .validate()
        .unwrap();
        assert_eq!(request.project, "abc");
        assert_eq!(request.version, "1.0");
        assert_eq!(request.filename, "a-file");
        assert_eq!(request.checksum.raw, line);
        assert_eq!(request.version_dir_name(), "abc-1.0");
        assert!(request.extract);
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(is_truthy("True"));
        assert!(is_truthy("TRUE"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("yes"));
        assert!(!is_truthy(""));
        assert!(!is_truthy("false"));
    }

    #[test]
    fn test_first_field_wins() {
        let mut form = UploadForm::default();
        form.insert_field("project".into(), "abc".into());
        form.insert_field("project".into(), "def".into());
        assert_eq!(form.fields["project"], "abc");
    }
}
