//! Meta provider plumbing: HMAC-signed OAuth state and the Graph API
//! client used for lead enrichment.

pub mod error;
pub mod graph;
pub mod oauth;

pub use error::MetaError;
pub use graph::{GraphClient, TokenResponse};
pub use oauth::{OauthState, STATE_MAX_AGE_MS, StatePayload};
