//! Rust client for the Qualifire LLM evaluation API.
//!
//! Two independent surfaces share only read-only configuration:
//!
//! - [`Client`] builds, validates and sends evaluation requests
//!   synchronously and surfaces API failures to the caller.
//! - [`interceptor::Interceptor`] wraps an external LLM client's calls and
//!   mirrors request/response bodies to the intake endpoint on a
//!   best-effort basis, never interfering with the wrapped call.

pub mod client;
pub mod config;
pub mod error;
pub mod intake;
pub mod interceptor;
pub mod stream;
pub mod types;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use interceptor::{Instrumented, Interceptor};
pub use types::{
    EvaluateParams, EvaluationResponse, EvaluationResult, InvokeParams, LLMMessage,
    LLMToolDefinition, ModelMode, PolicyTarget, SyntaxCheckArgs,
};

/// SDK version reported to the intake endpoint.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
