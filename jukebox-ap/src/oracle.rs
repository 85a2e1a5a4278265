//! Transition oracle client
//!
//! The jukebox backend owns collection and queue state, so it decides what
//! plays after the current track: crossfade into a specific next track, go
//! gapless into it, or do nothing and let the engine raise a plain
//! end-of-track event. The engine consults it shortly before each track
//! ends and notifies it whenever an autonomous transition advanced the
//! queue, keeping server-side "now playing" state in line with what is
//! actually audible.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Request timeout for oracle queries; a slow backend must not stall the
/// transition window
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// The backend's decision for the upcoming transition
///
/// `next_track_id = None` or `apply_crossfade = false` both mean "do not
/// start a timed crossfade"; a track id with `apply_crossfade = false`
/// signals a gapless candidate (the common case for consecutive tracks of
/// the same album).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDecision {
    pub next_track_id: Option<Uuid>,
    pub next_replaygain_db: Option<f64>,
    pub apply_crossfade: bool,
}

/// External policy service deciding per-track transitions
#[async_trait]
pub trait TransitionOracle: Send + Sync {
    /// Ask what should happen after the current track of `collection`
    async fn next_transition(&self, collection: &str) -> Result<TransitionDecision>;

    /// Tell the backend the engine advanced the queue on its own
    /// (equivalent to a user skip)
    async fn notify_advance(&self, collection: &str) -> Result<()>;

    /// Resolve the deterministic stream URL for a track
    fn stream_url(&self, track_id: Uuid) -> String;
}

#[derive(Debug, Serialize)]
struct CollectionBody<'a> {
    collection: &'a str,
}

/// HTTP client against the jukebox backend
pub struct BackendOracle {
    base_url: String,
    http: reqwest::Client,
}

impl BackendOracle {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl TransitionOracle for BackendOracle {
    async fn next_transition(&self, collection: &str) -> Result<TransitionDecision> {
        let url = format!("{}/api/queue/next-transition", self.base_url);
        let decision = self
            .http
            .get(&url)
            .query(&[("collection", collection)])
            .send()
            .await?
            .error_for_status()?
            .json::<TransitionDecision>()
            .await?;

        Ok(decision)
    }

    async fn notify_advance(&self, collection: &str) -> Result<()> {
        let url = format!("{}/api/playback/skip", self.base_url);
        self.http
            .post(&url)
            .json(&CollectionBody { collection })
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    fn stream_url(&self, track_id: Uuid) -> String {
        format!("{}/api/playback/stream/{}", self.base_url, track_id)
    }
}
