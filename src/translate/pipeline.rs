//! One request-rewrite pass: route the model, reshape tools and tool choice,
//! rewrite messages, then decide on the vision header.

use bytes::Bytes;

use super::messages::transform_messages;
use super::model::{ModelRoute, ModelRouter};
use super::tools::{normalize_tool_choice, transform_tools};
use super::types::ChatRequest;
use super::vision::requires_vision;
use crate::config::ProxyConfig;
use crate::error::Result;

/// A request after every stage has run, before serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRewrite {
    pub request: ChatRequest,
    pub route: ModelRoute,
    pub vision: bool,
}

/// What the transport needs to make the upstream call.
#[derive(Debug, Clone)]
pub struct RewrittenRequest {
    pub body: Bytes,
    pub route: ModelRoute,
    pub vision: bool,
}

#[derive(Debug, Clone)]
pub struct RequestPipeline {
    router: ModelRouter,
}

impl RequestPipeline {
    pub fn new(router: ModelRouter) -> Self {
        Self { router }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(ModelRouter::from_config(config))
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// Run every stage over an already parsed request. Stages whose field is
    /// absent are no-ops; all of them see the same route.
    pub fn rewrite_request(&self, request: ChatRequest) -> ChatRewrite {
        let ChatRequest {
            model,
            messages,
            tools,
            tool_choice,
            extra,
        } = request;

        let route = match model.as_deref() {
            Some(model) => self.router.route(model),
            None => ModelRoute::unrouted(),
        };
        let model = model.map(|_| route.internal_id.clone());

        let tools = transform_tools(tools);
        let tool_choice = normalize_tool_choice(tool_choice);
        let messages = messages.map(|messages| transform_messages(messages, route.family));
        let vision = requires_vision(messages.as_deref(), route.family);

        ChatRewrite {
            request: ChatRequest {
                model,
                messages,
                tools,
                tool_choice,
                extra,
            },
            route,
            vision,
        }
    }

    /// Parse, rewrite and re-serialize a raw request body.
    pub fn rewrite(&self, body: &[u8]) -> Result<RewrittenRequest> {
        let request = ChatRequest::from_slice(body)?;
        let ChatRewrite {
            request,
            route,
            vision,
        } = self.rewrite_request(request);

        Ok(RewrittenRequest {
            body: Bytes::from(request.to_vec()?),
            route,
            vision,
        })
    }
}
