//! Multi-provider AI response consensus engine
//!
//! Dispatches a single prompt to several independently-configured AI
//! backends, collects their answers while tolerating partial failure, and
//! synthesizes one trusted answer with a confidence score and an auditable
//! voting breakdown.
//!
//! # Components
//!
//! - [`registry::ProviderRegistry`]: configured backends and their runtime
//!   mutation (enable/disable, credentials). Snapshot reads, no I/O.
//! - [`adapter::ChatAdapter`]: uniform capability interface per provider
//!   family; [`adapter::AdapterSet`] maps provider names to adapters.
//! - [`dispatch::Dispatcher`]: concurrent fan-out with a wait-for-all join,
//!   or sequential fallback in priority order. Owns timing and
//!   partial-failure tolerance.
//! - [`consensus`]: pairwise token-set similarity, priority/latency vote
//!   weights, representative selection, and confidence scoring.
//! - [`tracker::PerformanceTracker`]: per-provider success, latency, and
//!   user-rating bookkeeping.
//! - [`engine::QuorumEngine`]: the facade callers consume.
//!
//! Note that "consensus" is representative selection: the engine always
//! returns one provider's verbatim text, never merged output.
//!
//! # Example
//!
//! ```rust,no_run
//! use quorum::QuorumEngine;
//!
//! # async fn demo() -> Result<(), quorum::DispatchError> {
//! let engine = QuorumEngine::with_defaults();
//! let result = engine
//!     .dispatch_consensus("What causes tides?", None, 512)
//!     .await?;
//! println!("{} ({:.0}%)", result.consensus_text, result.confidence * 100.0);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod consensus;
pub mod dispatch;
pub mod engine;
pub mod registry;
pub mod tracker;

pub use adapter::{
    AdapterSet, ChatAdapter, ChatMessage, ChatRole, HttpChatAdapter, ProviderError, ProviderFault,
};
pub use consensus::{ConsensusResult, VoteWeight, CONFIDENCE_CAP, SINGLE_RESPONSE_CONFIDENCE};
pub use dispatch::{DispatchConfig, DispatchError, DispatchResult, Dispatcher, ProviderResponse};
pub use engine::QuorumEngine;
pub use registry::{ProviderConfig, ProviderRegistry, ProviderUpdate, RegistryError};
pub use tracker::{PerformanceTracker, ProviderStats, MAX_RATING_HISTORY};
