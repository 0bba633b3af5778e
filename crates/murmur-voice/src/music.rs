//! Music search-and-transcode helper client.
//!
//! Search, download, and MP3→PCM transcoding all live in a separate helper
//! service; the gateway only asks for "this song, as 16 kHz mono PCM".

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use tracing::info;

use crate::VoiceError;

/// Resolves a song request to ready-to-stream PCM audio.
#[async_trait]
pub trait MusicSource: Send + Sync {
    /// Returns `None` when no matching track is found.
    async fn fetch(&self, song: &str, artist: Option<&str>) -> Result<Option<Bytes>, VoiceError>;
}

/// Client for the HTTP helper: `GET <url>?song=..&artist=..` returning raw
/// 16 kHz mono s16le PCM, or 404 when the search comes up empty.
#[derive(Debug, Clone)]
pub struct HttpMusicSource {
    url: String,
    http: reqwest::Client,
}

impl HttpMusicSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MusicSource for HttpMusicSource {
    async fn fetch(&self, song: &str, artist: Option<&str>) -> Result<Option<Bytes>, VoiceError> {
        let mut query = vec![("song", song)];
        if let Some(artist) = artist {
            query.push(("artist", artist));
        }

        let response = self.http.get(&self.url).query(&query).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            info!(song, "no matching track");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(VoiceError::Music(format!(
                "music helper returned {}",
                response.status()
            )));
        }

        let pcm = response.bytes().await?;
        info!(song, bytes = pcm.len(), "track fetched");
        Ok(Some(pcm))
    }
}
