//! Pipeline orchestration for reqflow.
//!
//! Chains the analysis stages into a fail-fast linear pipeline, exposes each
//! stage as a tool for a conversational driver, caches per-session artifacts,
//! and answers `{id, method, params}` requests.

pub mod config;
pub mod envelope;
pub mod events;
pub mod orchestrator;
pub mod session;
pub mod tools;

pub use config::ReqflowConfig;
pub use envelope::{dispatch_method, handle_line, handle_request, RpcRequest, RpcResponse};
pub use events::{EventEmitter, PipelineEvent};
pub use orchestrator::{Orchestrator, PartialResult, PipelineFailure, PipelineInput};
pub use session::{ContextHit, ContextStore, SessionArtifacts, SessionHandle, SessionRegistry};
pub use tools::{Tool, ToolContext, ToolRegistry};
