//! Upload rejection codes.
//!
//! Every variant maps to one of the plain-text reason codes clients
//! match on (`NOAUTH`, `BADSHA512_HASH`, ...).  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(UploadError::DigestMismatch)`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

/// Upload rejection reasons expressed as a Rust enum.
#[derive(Debug, Error)]
pub enum UploadError {
    /// No usable `Authorization` header was sent.
    #[error("no credentials supplied")]
    NoAuth,

    /// The supplied token is not an accepted upload token.
    #[error("credentials rejected")]
    BadAuth,

    /// The request carried no `file` part.
    #[error("no file part in request")]
    NoFile,

    /// A required form field is missing or unusable as a path segment.
    #[error("missing or invalid form field")]
    BadForm,

    /// The `sha512` field is not a checksum line.
    #[error("malformed checksum line")]
    BadChecksumLine,

    /// The checksum-line filename is shorter than four characters.
    #[error("filename too short")]
    FilenameLength,

    /// The checksum-line filename contains `/` or `\`.
    #[error("filename contains a path separator")]
    FilenameSlash,

    /// The checksum-line filename differs from the uploaded part's filename.
    #[error("checksum line names a different file than the upload")]
    FilenameMismatch,

    /// The payload digest does not equal the claimed digest.
    #[error("payload digest does not match checksum line")]
    DigestMismatch,

    /// Extraction was requested but the committed file is not a readable archive.
    #[error("committed file is not a valid archive")]
    BadArchive,

    /// Filesystem or transport failure; never caused by client input.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl UploadError {
    /// Return the reason code sent as the response body.
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::NoAuth => "NOAUTH",
            UploadError::BadAuth => "BADAUTH",
            UploadError::NoFile => "NOFILE",
            UploadError::BadForm => "BADFORM",
            UploadError::BadChecksumLine => "BADFORM_SHA512",
            UploadError::FilenameLength => "BADFILENAME_LENGTH",
            UploadError::FilenameSlash => "BADFILENAME_SLASH",
            UploadError::FilenameMismatch => "BADSHA512_FILENAME",
            UploadError::DigestMismatch => "BADSHA512_HASH",
            UploadError::BadArchive => "BAD_TAR_FILE",
            UploadError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::NoAuth | UploadError::BadAuth => StatusCode::UNAUTHORIZED,
            UploadError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        if let UploadError::Internal(err) = &self {
            error!("Upload failed: {:#}", err);
        }

        (
            self.status_code(),
            [("content-type", "text/plain; charset=utf-8")],
            self.code(),
        )
            .into_response()
    }
}

// -- Tests --------------------------------------------------------------------
