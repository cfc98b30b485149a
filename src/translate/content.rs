//! Per-part content rewriting for the active model family.

use super::model::ModelFamily;
use super::types::ContentPart;

/// Text that stands in for an image the target model must not receive.
pub const IMAGE_OMITTED: &str = "[Image Omitted]";

/// Rewrite one content part:
///
/// - `cache_control` is always dropped;
/// - image-stripping family: any image becomes an `[Image Omitted]` text part;
/// - otherwise a base64 image becomes an `image_url` data URI;
/// - an `image` without usable inline data is renamed to `image_url` as-is;
/// - everything else passes through.
pub fn map_part(part: ContentPart, family: ModelFamily) -> ContentPart {
    match part.without_cache_control() {
        ContentPart::Image { .. } if family.strips_images() => ContentPart::text(IMAGE_OMITTED),
        ContentPart::Image {
            tagged,
            source,
            mut rest,
        } => {
            if let Some(url) = source.as_ref().and_then(|s| s.data_uri()) {
                return ContentPart::image_url(url);
            }
            if !tagged {
                return ContentPart::Image {
                    tagged,
                    source,
                    rest,
                };
            }
            if let Some(source) = source {
                rest.insert("source".to_string(), source.into());
            }
            ContentPart::ImageUrl { rest }
        }
        other => other,
    }
}
