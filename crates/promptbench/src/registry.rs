//! Free-tier model allow-list.
//!
//! The registry is loaded once from the provider's catalog at startup and is
//! read-only afterwards, so it can be shared across tasks behind an `Arc`
//! without locking. To refresh, load a new registry from the same
//! [`Transport`] and swap the handle; existing holders keep the old snapshot.

use crate::transport::{Transport, UpstreamReply};
use crate::{DispatchError, FREE_TIER_SUFFIX, ModelsResponse};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Whether a model identifier is free-tier.
pub fn is_free_tier(id: &str) -> bool {
    id.ends_with(FREE_TIER_SUFFIX)
}

/// Set of model identifiers requests may target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelRegistry {
    models: BTreeSet<String>,
}

impl ModelRegistry {
    /// Fetch the catalog and keep the free-tier entries.
    ///
    /// Any failure (transport error, non-success status, unparseable body)
    /// is [`DispatchError::UpstreamUnavailable`]. Callers should treat it as
    /// fatal rather than serve traffic without an allow-list.
    pub async fn load(transport: &dyn Transport) -> Result<Self, DispatchError> {
        Self::load_filtered(transport, is_free_tier).await
    }

    /// Like [`load`](Self::load) with a custom membership filter.
    pub async fn load_filtered(
        transport: &dyn Transport,
        filter: impl Fn(&str) -> bool,
    ) -> Result<Self, DispatchError> {
        debug!("Fetching model catalog");
        let body = match transport.fetch_models().await {
            Ok(UpstreamReply::Success(body)) => body,
            Ok(UpstreamReply::RateLimited) => {
                return Err(DispatchError::UpstreamUnavailable(
                    "catalog request was rate limited (HTTP 429)".into(),
                ));
            }
            Ok(UpstreamReply::Failed { status, body }) => {
                return Err(DispatchError::UpstreamUnavailable(format!(
                    "catalog HTTP {status}: {body}"
                )));
            }
            Err(e) => return Err(DispatchError::UpstreamUnavailable(e)),
        };

        let parsed: ModelsResponse = serde_json::from_str(&body).map_err(|e| {
            DispatchError::UpstreamUnavailable(format!("failed to parse catalog: {e}"))
        })?;
        let total = parsed.data.len();
        let registry = Self::from_ids(
            parsed
                .data
                .into_iter()
                .map(|m| m.id)
                .filter(|id| filter(id.as_str())),
        );
        info!(
            "Loaded {} allowed model(s) out of {} in catalog",
            registry.len(),
            total
        );
        Ok(registry)
    }

    /// Build a registry from a fixed list of identifiers.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            models: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed(&self, id: &str) -> bool {
        self.models.contains(id)
    }

    /// Fail with [`DispatchError::InvalidModel`] unless `id` is allowed.
    pub fn check(&self, id: &str) -> Result<(), DispatchError> {
        if self.is_allowed(id) {
            Ok(())
        } else {
            Err(DispatchError::InvalidModel(id.to_string()))
        }
    }

    /// Allowed identifiers in lexical order.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
