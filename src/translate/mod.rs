//! Schema translation between the Anthropic-style client dialect and the
//! OpenAI-style upstream dialect.
//!
//! The core of the proxy. Every stage is a pure function over request-owned
//! values (no I/O); `pipeline` composes them in a fixed order.

pub mod content;
pub mod messages;
pub mod model;
pub mod model_list;
pub mod pipeline;
pub mod schema;
pub mod tools;
pub mod types;
pub mod vision;

pub use model::{ModelFamily, ModelRoute, ModelRouter};
pub use pipeline::{ChatRewrite, RequestPipeline, RewrittenRequest};
