//! LLMux response caching engine.
//!
//! The multiplexing proxy itself — HTTP/SSE edge, provider clients and
//! failover routing, auth, MCP tool execution, agent memory, the rest of
//! configuration, metrics exporters, and the CLI — all live outside this
//! crate. What's here is the caching core: deterministic fingerprinting,
//! a tiered local+remote exact-match cache, an embedding-indexed semantic
//! cache, the handlers that bind either to OpenAI-shaped requests, and the
//! factory that assembles all of it from config.

pub mod api_types;
pub mod cache;
pub mod config;
mod factory;
pub mod observability;
pub mod semantic;

pub use factory::{BuildError, BuiltCache, CacheFactory};
