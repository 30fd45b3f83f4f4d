//! SCA Authenticator Core Library
//!
//! Shared functionality for the authorization sync engine:
//! - Connection, envelope and authorization record data model
//! - Configuration resolution and hierarchy
//! - Mockable wall clock for expiry and TTL arithmetic
//! - Common error types

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod tracing_init;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use models::{
    ApiVersion, AuthorizationData, AuthorizationKey, AuthorizationRecord, AuthorizationStatus,
    Connection, ConsentData, EncryptedEnvelope,
};
