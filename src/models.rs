use serde::{Deserialize, Serialize};

// One image of the incoming batch
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageItem {
    pub base64: String,
    pub mime_type: String,
}

// Validated batch, order is preserved as sent
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub images: Vec<ImageItem>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

// Model's pick, returned to the caller as-is
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurationResult {
    pub recommended_index: usize,
    pub caption: String,
    pub vibe: String,
}
