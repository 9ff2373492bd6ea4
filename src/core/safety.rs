//! Limits applied to every pipeline call.
//!
//! Bounds the resources a single request can consume:
//! - Per-call timeout on every external provider and storage call
//! - Upload size
//! - Size of the reflection corpus fed to one grounded-generation call
//! - Similarity search result count

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

/// Resource limits for pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Timeout for a single external call in seconds (default: 60)
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_seconds: u64,

    /// Maximum accepted audio upload in bytes (default: 25MB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Maximum reflections fed to one grounded answer (default: 200)
    #[serde(default = "default_grounded_max_reflections")]
    pub grounded_max_reflections: usize,

    /// Maximum characters of formatted reflections in one prompt (default: 200k)
    #[serde(default = "default_grounded_max_prompt_chars")]
    pub grounded_max_prompt_chars: usize,

    /// Upper bound for the `limit` of a similarity search (default: 50)
    #[serde(default = "default_search_limit_max")]
    pub search_limit_max: usize,
}

fn default_provider_timeout() -> u64 {
    60
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
} // 25MB
fn default_grounded_max_reflections() -> usize {
    200
}
fn default_grounded_max_prompt_chars() -> usize {
    200_000
}
fn default_search_limit_max() -> usize {
    50
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            provider_timeout_seconds: default_provider_timeout(),
            max_upload_bytes: default_max_upload_bytes(),
            grounded_max_reflections: default_grounded_max_reflections(),
            grounded_max_prompt_chars: default_grounded_max_prompt_chars(),
            search_limit_max: default_search_limit_max(),
        }
    }
}

impl Limits {
    /// Per-call timeout as a Duration
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
    }

    /// Clamp a requested search limit into `1..=search_limit_max`
    pub fn clamp_search_limit(&self, requested: usize) -> usize {
        requested.clamp(1, self.search_limit_max.max(1))
    }
}

/// Run an external call under a deadline.
///
/// A call that outlives `limit` fails with an error naming `label`, so a hung
/// provider cannot hang the request that issued it.
pub async fn bounded<T, F>(limit: Duration, label: &str, call: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("{} timed out after {:?}", label, limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.provider_timeout(), Duration::from_secs(60));
        assert_eq!(limits.max_upload_bytes, 25 * 1024 * 1024);
        assert_eq!(limits.grounded_max_reflections, 200);
    }

    #[test]
    fn test_clamp_search_limit() {
        let limits = Limits {
            search_limit_max: 10,
            ..Default::default()
        };
        assert_eq!(limits.clamp_search_limit(0), 1);
        assert_eq!(limits.clamp_search_limit(5), 5);
        assert_eq!(limits.clamp_search_limit(500), 10);
    }

    #[tokio::test]
    async fn test_bounded_passes_through_result() {
        let value = bounded(Duration::from_secs(1), "fast call", async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: anyhow::Result<()> = bounded(Duration::from_millis(20), "slow call", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err().to_string();
        assert!(err.contains("slow call timed out"));
    }
}
