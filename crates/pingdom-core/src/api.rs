//! Vendor API seams consumed by the collector.
//!
//! The collector only sees these traits; [`crate::client::PingdomClient`]
//! is the HTTP implementation and tests plug in in-memory fakes.

use std::future::Future;

use crate::model::{Check, OutageInterval, OutageWindow};

/// Error type for Pingdom API calls.
#[derive(Debug)]
pub enum ApiError {
    /// Transport failure (connect, timeout, TLS).
    Http(String),
    /// Pingdom answered with an error status.
    Api {
        status: u16,
        description: String,
        message: String,
    },
    /// Response body could not be decoded.
    Decode(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Http(msg) => write!(f, "Pingdom request failed: {}", msg),
            ApiError::Api {
                status,
                description,
                message,
            } => write!(f, "Pingdom API error {} {}: {}", status, description, message),
            ApiError::Decode(msg) => write!(f, "Pingdom response decode error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Query parameters for the check list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckFilter {
    pub include_tags: bool,
    /// Vendor-side tag scoping, comma separated. Empty means no filter.
    pub tags: String,
}

pub trait ChecksApi: Send + Sync {
    fn list_checks(
        &self,
        filter: &CheckFilter,
    ) -> impl Future<Output = Result<Vec<Check>, ApiError>> + Send;
}

pub trait OutageApi: Send + Sync {
    fn list_outages(
        &self,
        check_id: i64,
        window: OutageWindow,
    ) -> impl Future<Output = Result<Vec<OutageInterval>, ApiError>> + Send;
}
