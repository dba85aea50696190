//! `POST /` -- checksum-verified upload.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{debug, warn};

use crate::errors::UploadError;
use crate::metrics::{BYTES_RECEIVED_TOTAL, UPLOADS_TOTAL};
use crate::request::{FilePart, UploadForm, PART_FILE};
use crate::storage::staging::StagedPayload;
use crate::AppState;

/// Accept, verify and publish one upload.
///
/// Authentication has already run in the server middleware.  The file
/// part is staged as soon as it is seen, whatever its position in the
/// body; form validation then runs before the digest verdict, so
/// rejection codes do not depend on part order.
#[utoipa::path(
    post,
    path = "/",
    tag = "Upload",
    operation_id = "Upload",
    responses(
        (status = 200, description = "Upload committed (`OK`)"),
        (status = 400, description = "Rejected: NOFILE, BADFORM, BADFORM_SHA512, BADFILENAME_LENGTH, BADFILENAME_SLASH, BADSHA512_FILENAME, BADSHA512_HASH or BAD_TAR_FILE"),
        (status = 401, description = "NOAUTH or BADAUTH"),
        (status = 500, description = "Internal error")
    )
)]
pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, UploadError> {
    let result = handle_upload(state, multipart).await;
    let outcome = match &result {
        Ok(_) => "OK",
        Err(e) => {
            if !matches!(e, UploadError::Internal(_)) {
                warn!("Upload rejected: {}", e.code());
            }
            e.code()
        }
    };
    counter!(UPLOADS_TOTAL, "outcome" => outcome).increment(1);
    result
}

async fn handle_upload(
    state: Arc<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, UploadError> {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            debug!("Not a multipart body: {}", rejection);
            return Err(UploadError::NoFile);
        }
    };

    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .context("reading multipart body")?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        // Only a part with a filename counts as the file; a bare `file`
        // text field does not.
        let filename = field.file_name().map(str::to_owned);
        match filename {
            Some(filename) if name == PART_FILE && form.file.is_none() => {
                let staged = stage_field(&state, field).await?;
                form.file = Some(FilePart { filename, staged });
            }
            Some(_) => {}
            None => {
                let value = field.text().await.context("reading form field")?;
                form.insert_field(name, value);
            }
        }
    }

    let request = form.validate()?;

    if !request.staged.matches(&request.checksum.digest) {
        debug!(
            "Digest mismatch for {}: got {}",
            request.filename,
            request.staged.digest()
        );
        return Err(UploadError::DigestMismatch);
    }

    let store = state.store.clone();
    let published = tokio::task::spawn_blocking(move || store.publish(request))
        .await
        .context("commit task failed")??;

    if let Some(count) = published.extracted {
        debug!("Extracted {} entries into {}", count, published.dir.display());
    }

    Ok((StatusCode::OK, [("content-type", "text/plain; charset=utf-8")], "OK").into_response())
}

/// Stream one part into staging.  A read error drops the stager, which
/// removes the partial file.
async fn stage_field(state: &AppState, mut field: Field<'_>) -> Result<StagedPayload, UploadError> {
    let mut stager = state.store.stager()?;
    while let Some(chunk) = field.chunk().await.context("reading upload body")? {
        stager
            .write(&chunk)
            .await
            .context("writing staged upload")?;
    }
    let staged = stager.finish().await?;
    counter!(BYTES_RECEIVED_TOTAL).increment(staged.size());
    Ok(staged)
}
