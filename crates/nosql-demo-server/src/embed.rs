use axum::extract::Path;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use rust_embed::Embed;

use crate::error::AppError;

#[derive(Embed)]
#[folder = "$CARGO_MANIFEST_DIR/assets/"]
struct PageAssets;

/// GET /assets/{*path}: serve the embedded stylesheet and script.
pub async fn asset_handler(Path(path): Path<String>) -> Result<Response, AppError> {
    let path = path.trim_start_matches('/');
    let content = <PageAssets as Embed>::get(path)
        .ok_or_else(|| AppError::not_found(format!("asset '{path}' not found")))?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Ok((
        [(header::CONTENT_TYPE, mime.as_ref().to_string())],
        content.data.to_vec(),
    )
        .into_response())
}
