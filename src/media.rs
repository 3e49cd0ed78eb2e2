use mime_guess::{from_path, get_mime_extensions_str};
use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::config::{media_key, MAX_IMAGE_BYTES};
use crate::core::db::Db;
use crate::core::errors::{AppError, Result};
use crate::core::helpers::new_id;

/// Turns uploaded image bytes into a durable URL. Posts and profiles only
/// ever hold the URL.
pub trait MediaStore {
    fn store_image(&self, bytes: &[u8], content_type: &str) -> Result<String>;
}

/// Keeps images in the key-value store and serves them from `/media/{id}`.
pub struct KvMediaStore {
    db: Db,
}

impl KvMediaStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

/// Checks an upload and picks the file extension for its content type.
pub fn validate_image(bytes: &[u8], content_type: &str) -> Result<&'static str> {
    if bytes.is_empty() {
        return Err(AppError::validation("Image is required"));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::validation(format!(
            "Image must be at most {} bytes",
            MAX_IMAGE_BYTES
        )));
    }
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if !essence.starts_with("image/") {
        return Err(AppError::validation("Upload file must be an image"));
    }
    get_mime_extensions_str(&essence)
        .and_then(|exts| exts.first().copied())
        .ok_or_else(|| AppError::validation(format!("Unsupported image type {}", essence)))
}

impl MediaStore for KvMediaStore {
    fn store_image(&self, bytes: &[u8], content_type: &str) -> Result<String> {
        let ext = validate_image(bytes, content_type)?;
        let id = format!("{}.{}", new_id(), ext);
        self.db.set_bytes(&media_key(&id), bytes)?;
        info!(media_id = %id, size = bytes.len(), "image stored");
        Ok(format!("/media/{}", id))
    }
}

pub fn content_type_of(req: &Request) -> String {
    req.header("Content-Type")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

pub fn serve_media(db: &Db, id: &str) -> Result<Response> {
    let data = db
        .get_bytes(&media_key(id))?
        .ok_or_else(|| AppError::not_found("Media", id))?;
    let mime = from_path(id).first_or_octet_stream();

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", mime.as_ref())
        .body(data)
        .build())
}
