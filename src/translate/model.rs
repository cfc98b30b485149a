//! External model ids and model-family classification.

use crate::config::ProxyConfig;

/// Decides how image content is treated for the target model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// Images are replaced by a text placeholder.
    ImageStripping,
    /// Images are sent inline as data URIs.
    Generic,
}

impl ModelFamily {
    pub fn strips_images(self) -> bool {
        matches!(self, ModelFamily::ImageStripping)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelFamily::ImageStripping => "image-stripping",
            ModelFamily::Generic => "generic",
        }
    }
}

/// Where one request is going, computed once and read by later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoute {
    pub internal_id: String,
    pub family: ModelFamily,
    pub prefixed: bool,
}

impl ModelRoute {
    /// Route for a request that names no model.
    pub fn unrouted() -> Self {
        Self {
            internal_id: String::new(),
            family: ModelFamily::Generic,
            prefixed: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelRouter {
    prefix: String,
    image_stripping_keywords: Vec<String>,
}

impl ModelRouter {
    pub fn new<I, S>(prefix: impl Into<String>, image_stripping_keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefix: prefix.into(),
            image_stripping_keywords: image_stripping_keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(
            config.prefix.clone(),
            &config.routing.image_stripping_keywords,
        )
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn classify(&self, internal_id: &str) -> ModelFamily {
        let id = internal_id.to_lowercase();
        if self
            .image_stripping_keywords
            .iter()
            .any(|keyword| id.contains(keyword.as_str()))
        {
            ModelFamily::ImageStripping
        } else {
            ModelFamily::Generic
        }
    }

    /// Strip the external prefix (if present) and classify what remains.
    pub fn route(&self, model: &str) -> ModelRoute {
        let (internal_id, prefixed) = match model.strip_prefix(self.prefix.as_str()) {
            Some(stripped) => (stripped.to_string(), true),
            None => (model.to_string(), false),
        };

        let family = self.classify(&internal_id);

        if prefixed {
            tracing::info!(from = model, to = %internal_id, family = family.as_str(), "Rewriting model");
        } else {
            tracing::warn!(model, prefix = %self.prefix, "Model has no routing prefix, forwarding as-is");
        }

        ModelRoute {
            internal_id,
            family,
            prefixed,
        }
    }

    pub fn external_id(&self, internal_id: &str) -> String {
        format!("{}{}", self.prefix, internal_id)
    }
}
