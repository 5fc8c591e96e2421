//! Token broker for the Douyin open platform.
//!
//! Exchanges login codes and authorization tickets, keeps sessions and
//! tokens in an expiring in-memory store, gates data calls on granted
//! scopes, and substitutes synthetic data when the upstream is unreachable
//! or not configured. Authorization failures are never masked.

pub mod broker;
pub mod cache;
pub mod config;
pub mod error;
pub mod fallback;
pub mod logging;
pub mod scope;
pub mod store;

pub use broker::{AuthState, Broker, DebugSnapshot, UserProfile};
pub use cache::{CacheStats, Clock, ExpiringCache, ManualClock, SystemClock};
pub use config::BrokerConfig;
pub use error::{BrokerError, ErrorKind};
pub use fallback::FallbackGenerator;
pub use scope::{ScopeDenial, ScopeRequirement};
pub use store::{RecordCache, SessionRecord, SessionStore, TokenRecord, TokenStore};
