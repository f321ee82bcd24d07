//! Real-time fan-out gateway.
//!
//! Bridges an upstream Kafka topic to authenticated WebSocket clients:
//! - Accepts WebSocket connections on `/private`, `/public` and `/`
//! - Validates bearer tokens into principals (uid + role)
//! - Manages per-session topic subscriptions behind an access policy
//! - Consumes upstream records and routes each payload to every admitted
//!   subscriber of its topic
//!
//! ## Architecture
//!
//! ```text
//! Kafka: rango.events
//!         ↓
//! Ingest (pull loop, commit after handoff)
//!         ↓
//! Hub (mutex-guarded registry + topic index, policy per frame)
//!         ↓
//! per-session egress queues → WebSocket clients
//! ```
//!
//! ## Flow-control design
//!
//! - One serialization point for index mutations and broadcasts
//! - Pre-serialized frames, cloned per target
//! - Bounded per-session queues; overflow drops the oldest data frame,
//!   never a subscription acknowledgement

pub mod config;
pub mod error;
pub mod hub;
pub mod ingest;
pub mod policy;
pub mod protocol;
pub mod session;
pub mod topic;
pub mod ws_server;

pub use config::{Flags, Settings};
pub use error::{GatewayError, Result};
pub use hub::Hub;
pub use ingest::{Ingest, IngestConfig};
pub use policy::AccessMatrix;
pub use protocol::{ClientRequest, ServerFrame};
pub use session::{Principal, Session, SessionId, SessionState};
pub use ws_server::{create_router, AppState};
