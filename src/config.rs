//! Menu session configuration.

use serde::{Deserialize, Serialize};

use crate::photo::UploadProfile;

/// Submitted orders are shown again after a reload for this long.
pub const DEFAULT_ORDER_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Tunables for one menu session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MenuConfig {
    /// Reset every quantity to zero after a successful submit.
    pub clear_on_submit: bool,
    /// Lifetime of a persisted submitted order.
    pub order_ttl_ms: u64,
    /// Upload ceiling profile for dish photos.
    pub upload_profile: UploadProfile,
    /// Width / height ratio enforced on crops.
    pub crop_aspect_ratio: f32,
    /// Longest edge of a stored dish photo, in pixels.
    pub max_image_dimension: u32,
    /// JPEG quality on a 0–1 scale.
    pub image_quality: f32,
    /// Bound of the runtime command queue.
    pub command_queue_bound: usize,
    /// Capacity of the runtime event broadcast.
    pub event_capacity: usize,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            clear_on_submit: false,
            order_ttl_ms: DEFAULT_ORDER_TTL_MS,
            upload_profile: UploadProfile::Desktop,
            crop_aspect_ratio: 4.0 / 3.0,
            max_image_dimension: 800,
            image_quality: 0.8,
            command_queue_bound: 256,
            event_capacity: 1024,
        }
    }
}

impl MenuConfig {
    /// Parses a JSON config document; missing fields keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_keeps_defaults() {
        let cfg = MenuConfig::from_json_str(r#"{"clearOnSubmit": true, "uploadProfile": "mobile"}"#)
            .expect("parse");
        assert!(cfg.clear_on_submit);
        assert_eq!(cfg.upload_profile, UploadProfile::Mobile);
        assert_eq!(cfg.order_ttl_ms, DEFAULT_ORDER_TTL_MS);
        assert_eq!(cfg.max_image_dimension, 800);
    }
}
