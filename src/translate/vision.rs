//! Vision-capability signalling for the upstream.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::model::ModelFamily;
use super::types::MessageEntry;

pub const VISION_HEADER_VALUE: &str = "true";

/// True when the rewritten messages carry an `image_url` part and the family
/// is allowed to receive images.
pub fn requires_vision(messages: Option<&[MessageEntry]>, family: ModelFamily) -> bool {
    if family.strips_images() {
        return false;
    }
    messages
        .unwrap_or_default()
        .iter()
        .flat_map(MessageEntry::parts)
        .any(|part| part.is_image_url())
}

pub fn set_vision_header(headers: &mut HeaderMap, name: &HeaderName) {
    headers.insert(name.clone(), HeaderValue::from_static(VISION_HEADER_VALUE));
}
