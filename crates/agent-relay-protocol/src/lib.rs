//! Wire protocol for hub-to-actor communication.
//!
//! This crate defines:
//! - `Inbound` / `Outbound` - JSON envelope enums, tagged by `type`
//! - `decode` - two-stage envelope decoding with error classification
//! - `normalize_token` - the `"default"` app-token normalization rule

pub mod envelope;
pub mod token;

pub use envelope::{
    ActorKind, ConnectionsSummary, DecodeError, Direction, ForwardTarget, Inbound, Outbound,
    RouteOutcome, decode, now_millis,
};
pub use token::{DEFAULT_TOKEN, normalize_token};
