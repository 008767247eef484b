// Walks the raw JSON by hand so each failure names the offending image

use serde_json::Value;

use crate::error::ValidationError;
use crate::models::{Batch, ImageItem};

pub const MIN_IMAGES: usize = 2;
pub const MAX_IMAGES: usize = 10;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub fn parse(raw_body: &[u8]) -> Result<Batch, ValidationError> {
    let body: Value = serde_json::from_slice(raw_body).map_err(|_| ValidationError::MalformedJson)?;

    let items = body
        .get("images")
        .and_then(Value::as_array)
        .ok_or(ValidationError::Shape)?;

    if items.len() < MIN_IMAGES || items.len() > MAX_IMAGES {
        return Err(ValidationError::Count(items.len()));
    }

    let mut images = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let base64 = item.get("base64").and_then(Value::as_str);
        let mime_type = item.get("mimeType").and_then(Value::as_str);
        let (Some(base64), Some(mime_type)) = (base64, mime_type) else {
            return Err(ValidationError::ItemShape(index));
        };

        if exceeds_size_limit(base64) {
            return Err(ValidationError::Size(index));
        }

        images.push(ImageItem {
            base64: base64.to_string(),
            mime_type: mime_type.to_string(),
        });
    }

    Ok(Batch { images })
}

// len * 3/4 > limit, kept in integers
fn exceeds_size_limit(base64: &str) -> bool {
    base64.len().saturating_mul(3) > MAX_IMAGE_BYTES * 4
}
