use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Extension,
};
use bytes::Bytes;
use http::{header, HeaderValue, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use sharefs_common::{EntryType, ENTRY_TYPE_HEADER, JSON_CONTENT_TYPE};
use tracing::{error, info};

use crate::access::RequestContext;
use crate::fs::{FileSystem, FsError, ReadOutcome};
use crate::resolver::PathError;

#[derive(Debug, Default, Deserialize)]
pub struct ReadParams {
    info: Option<String>,
}

impl ReadParams {
    fn info_requested(&self) -> bool {
        self.info.as_deref().is_some_and(is_truthy)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Percent-decoded request path.
fn request_path(uri: &Uri) -> Result<String, FsError> {
    urlencoding::decode(uri.path())
        .map(|path| path.into_owned())
        .map_err(|_| FsError::InvalidPath(PathError::Encoding))
}

#[tracing::instrument(skip(fs))]
pub async fn read(
    State(fs): State<Arc<FileSystem>>,
    uri: Uri,
    Query(params): Query<ReadParams>,
) -> Result<Response, FsError> {
    let path = request_path(&uri)?;

    if params.info_requested() {
        let entry = fs.info(&path).await?;
        return Ok(json_body(StatusCode::OK, &entry));
    }

    let response = match fs.read(&path).await? {
        ReadOutcome::Listing(entries) if entries.is_empty() => {
            with_entry_type(StatusCode::NO_CONTENT.into_response(), EntryType::Directory)
        }
        ReadOutcome::Listing(entries) => {
            with_entry_type(json_body(StatusCode::OK, &entries), EntryType::Directory)
        }
        ReadOutcome::File { contents, .. } if contents.is_empty() => {
            with_entry_type(StatusCode::NO_CONTENT.into_response(), EntryType::File)
        }
        ReadOutcome::File { name, contents } => {
            let mime = mime_guess::from_path(&name).first_or_octet_stream();
            let response = (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime.essence_str().to_string())],
                Bytes::from(contents),
            )
                .into_response();
            with_entry_type(response, EntryType::File)
        }
    };
    Ok(response)
}

#[tracing::instrument(skip(fs, ctx), fields(account = %ctx.account_name()))]
pub async fn create_directory(
    State(fs): State<Arc<FileSystem>>,
    Extension(ctx): Extension<RequestContext>,
    uri: Uri,
) -> Result<Response, FsError> {
    let path = request_path(&uri)?;
    let entry = fs.create_directory(&path).await?;
    info!(path = %path, "directory created");
    Ok(json_body(StatusCode::OK, &entry))
}

#[tracing::instrument(skip(fs, ctx, body), fields(account = %ctx.account_name(), size = body.len()))]
pub async fn write_file(
    State(fs): State<Arc<FileSystem>>,
    Extension(ctx): Extension<RequestContext>,
    uri: Uri,
    body: Bytes,
) -> Result<Response, FsError> {
    let path = request_path(&uri)?;
    let entry = fs.write_file(&path, &body).await?;
    info!(path = %path, size = entry.size, "file written");
    Ok(json_body(StatusCode::OK, &entry))
}

#[tracing::instrument(skip(fs, ctx), fields(account = %ctx.account_name()))]
pub async fn delete(
    State(fs): State<Arc<FileSystem>>,
    Extension(ctx): Extension<RequestContext>,
    uri: Uri,
) -> Result<Response, FsError> {
    let path = request_path(&uri)?;
    let entry = fs.delete(&path).await?;
    info!(path = %path, "entry deleted");
    Ok(json_body(StatusCode::OK, &entry))
}

fn with_entry_type(mut response: Response, entry_type: EntryType) -> Response {
    response.headers_mut().insert(
        ENTRY_TYPE_HEADER,
        HeaderValue::from_static(entry_type.marker()),
    );
    response
}

/// Serializes `value` with the charset-qualified JSON content type.
pub fn json_body<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (status, [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response(),
        Err(err) => {
            error!("failed to encode response body: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn error_body(status: StatusCode, message: &str) -> Response {
    json_body(status, &serde_json::json!({ "error": message }))
}

impl IntoResponse for FsError {
    fn into_response(self) -> Response {
        match self {
            FsError::InvalidPath(err) => error_body(StatusCode::BAD_REQUEST, &err.to_string()),
            FsError::NotFound => error_body(StatusCode::NOT_FOUND, "not found"),
            FsError::AlreadyExists => error_body(StatusCode::CONFLICT, "already exists"),
            FsError::IsDirectory => error_body(StatusCode::CONFLICT, "is a directory"),
            FsError::Io(err) => {
                // The io error can carry absolute paths; keep it server-side.
                error!("filesystem operation failed: {}", err);
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}
