//! Jikan API v4 access layer.
//!
//! [`FetchGateway`] serializes and retries the raw HTTP calls; [`JikanApi`]
//! holds the per-resource fetch wrappers, which translate domain requests
//! into URLs, unwrap the response envelope, and substitute each resource's
//! fallback shape when anything goes wrong.

pub mod anime;
pub mod error;
pub mod gateway;
pub mod manga;
pub mod types;

pub use anime::{ScheduleDay, Season};
pub use error::{FallbackReason, FetchOutcome, GatewayError};
pub use gateway::FetchGateway;

use serde::de::DeserializeOwned;
use std::sync::Arc;
use types::{Envelope, Paged};

/// Typed access to the upstream API, one method per resource.
///
/// Cheap to clone; every clone shares the same gateway, so the process-wide
/// dispatch spacing holds across all of them.
#[derive(Clone)]
pub struct JikanApi {
    gateway: Arc<FetchGateway>,
    base_url: String,
}

impl JikanApi {
    /// Create an API handle over a shared gateway.
    pub fn new(gateway: Arc<FetchGateway>, base_url: impl Into<String>) -> Self {
        Self {
            gateway,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET a path and unwrap the `data` field of the envelope.
    pub(crate) async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, FallbackReason> {
        let response = self.gateway.send(&self.endpoint(path)).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FallbackReason::Status(status));
        }

        let envelope: Envelope<T> = response.json().await.map_err(FallbackReason::Decode)?;
        Ok(envelope.data)
    }

    /// GET a paginated path, keeping the pagination metadata.
    pub(crate) async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Paged<T>, FallbackReason> {
        let response = self.gateway.send(&self.endpoint(path)).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FallbackReason::Status(status));
        }

        response.json().await.map_err(FallbackReason::Decode)
    }
}
