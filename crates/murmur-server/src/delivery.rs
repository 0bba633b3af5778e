//! The response delivery pipeline.
//!
//! Turns a reply into a framed audio stream on the device connection:
//! an `mcp/server/start_audio` control event, ordered binary chunks, and a
//! single zero-length binary frame as the end-of-stream marker. Within one
//! delivery that order is absolute; across deliveries the per-session slot
//! guarantees no two streams ever interleave on one connection.

use bytes::Bytes;
use futures_util::StreamExt;
use murmur_agent::TextStream;
use murmur_types::rpc::methods;
use murmur_voice::SpeechSynthesizer;
use serde_json::json;
use tracing::{debug, warn};

use crate::session::Session;

/// Outbound audio is re-chunked to this size so one giant track does not
/// monopolize the writer queue.
const AUDIO_CHUNK_BYTES: usize = 64 * 1024;

/// Synthesizes and streams a textual reply.
///
/// Blank (after trimming) text chunks produce no synthesis call. Returns
/// the concatenated reply text; when the session already has a delivery in
/// flight the new one is rejected — nothing is sent and the text is
/// reported empty.
pub async fn deliver_text(
    session: &Session,
    tts: &dyn SpeechSynthesizer,
    mut chunks: TextStream,
) -> String {
    if !session.begin_delivery() {
        warn!(
            connection_id = session.id(),
            "rejecting reply delivery: another delivery is in flight"
        );
        return String::new();
    }

    session.send_event(methods::SERVER_START_AUDIO, json!({})).await;

    let mut spoken = String::new();
    while let Some(chunk) = chunks.next().await {
        let text = chunk.trim();
        if text.is_empty() {
            continue;
        }
        spoken.push_str(&chunk);

        match tts.synthesize(text).await {
            Ok(mut audio) => {
                while let Some(item) = audio.next().await {
                    match item {
                        // A zero-length frame is the terminator, so empty
                        // synthesis chunks must not reach the wire.
                        Ok(bytes) if bytes.is_empty() => {}
                        Ok(bytes) => forward_audio(session, bytes).await,
                        Err(e) => warn!("synthesis stream error: {e}"),
                    }
                }
            }
            Err(e) => warn!("synthesis failed: {e}"),
        }
    }

    session.send_binary(Bytes::new()).await;
    session.end_delivery();
    debug!(connection_id = session.id(), chars = spoken.len(), "reply delivered");
    spoken
}

/// Streams already-synthesized PCM (the music playback path) with the same
/// framing and the same one-delivery-at-a-time rule.
pub async fn deliver_pcm(session: &Session, pcm: Bytes) {
    if pcm.is_empty() {
        return;
    }
    if !session.begin_delivery() {
        warn!(
            connection_id = session.id(),
            "rejecting audio delivery: another delivery is in flight"
        );
        return;
    }

    session.send_event(methods::SERVER_START_AUDIO, json!({})).await;
    for offset in (0..pcm.len()).step_by(AUDIO_CHUNK_BYTES) {
        let end = (offset + AUDIO_CHUNK_BYTES).min(pcm.len());
        session.send_binary(pcm.slice(offset..end)).await;
    }
    session.send_binary(Bytes::new()).await;
    session.end_delivery();
}

async fn forward_audio(session: &Session, bytes: Bytes) {
    for offset in (0..bytes.len()).step_by(AUDIO_CHUNK_BYTES) {
        let end = (offset + AUDIO_CHUNK_BYTES).min(bytes.len());
        session.send_binary(bytes.slice(offset..end)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{OutboundFrame, OUTBOUND_QUEUE_DEPTH};
    use async_trait::async_trait;
    use futures_util::stream;
    use murmur_voice::{AudioStream, VoiceError};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// Synthesizer that records its inputs and yields `pcm:<text>`.
    #[derive(Default)]
    struct RecordingTts {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for RecordingTts {
        async fn synthesize(&self, text: &str) -> Result<AudioStream, VoiceError> {
            self.calls.lock().unwrap().push(text.to_string());
            let chunk = Bytes::from(format!("pcm:{text}"));
            Ok(stream::iter([Ok(chunk)]).boxed())
        }
    }

    fn session() -> (Arc<Session>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let addr = "127.0.0.1:9000".parse().unwrap();
        (Arc::new(Session::new(1, addr, tx)), rx)
    }

    fn text_stream(chunks: &[&str]) -> TextStream {
        stream::iter(chunks.iter().map(|c| c.to_string()).collect::<Vec<_>>()).boxed()
    }

    #[tokio::test]
    async fn frames_are_ordered_and_blank_chunks_skip_synthesis() {
        let (session, mut rx) = session();
        let tts = RecordingTts::default();

        let spoken = deliver_text(&session, &tts, text_stream(&["hello", "  ", "world"])).await;
        assert_eq!(spoken, "helloworld");
        assert_eq!(tts.calls.lock().unwrap().as_slice(), ["hello", "world"]);

        // start_audio control precedes all audio.
        match rx.try_recv().unwrap() {
            OutboundFrame::Control(json) => {
                let value: serde_json::Value = serde_json::from_str(&json).unwrap();
                assert_eq!(value["method"], methods::SERVER_START_AUDIO);
            }
            other => panic!("expected control frame, got {other:?}"),
        }
        // Audio for each non-blank chunk, in order.
        match rx.try_recv().unwrap() {
            OutboundFrame::Binary(b) => assert_eq!(&b[..], b"pcm:hello"),
            other => panic!("expected audio, got {other:?}"),
        }
        match rx.try_recv().unwrap() {
            OutboundFrame::Binary(b) => assert_eq!(&b[..], b"pcm:world"),
            other => panic!("expected audio, got {other:?}"),
        }
        // Exactly one zero-length terminator, then nothing.
        match rx.try_recv().unwrap() {
            OutboundFrame::Binary(b) => assert!(b.is_empty()),
            other => panic!("expected terminator, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn concurrent_delivery_is_rejected() {
        let (session, mut rx) = session();
        let tts = RecordingTts::default();

        assert!(session.begin_delivery(), "simulate a delivery in flight");
        let spoken = deliver_text(&session, &tts, text_stream(&["hello"])).await;

        assert!(spoken.is_empty());
        assert!(tts.calls.lock().unwrap().is_empty(), "no synthesis happened");
        assert!(rx.try_recv().is_err(), "nothing reached the wire");
    }

    #[tokio::test]
    async fn pcm_delivery_chunks_and_terminates() {
        let (session, mut rx) = session();

        // Just over one chunk, to force a split.
        let pcm = Bytes::from(vec![7u8; AUDIO_CHUNK_BYTES + 10]);
        deliver_pcm(&session, pcm).await;

        match rx.try_recv().unwrap() {
            OutboundFrame::Control(json) => {
                let value: serde_json::Value = serde_json::from_str(&json).unwrap();
                assert_eq!(value["method"], methods::SERVER_START_AUDIO);
            }
            other => panic!("expected control frame, got {other:?}"),
        }
        match rx.try_recv().unwrap() {
            OutboundFrame::Binary(b) => assert_eq!(b.len(), AUDIO_CHUNK_BYTES),
            other => panic!("expected audio, got {other:?}"),
        }
        match rx.try_recv().unwrap() {
            OutboundFrame::Binary(b) => assert_eq!(b.len(), 10),
            other => panic!("expected audio, got {other:?}"),
        }
        match rx.try_recv().unwrap() {
            OutboundFrame::Binary(b) => assert!(b.is_empty()),
            other => panic!("expected terminator, got {other:?}"),
        }

        // The slot is free again afterwards.
        assert!(session.begin_delivery());
    }

    #[tokio::test]
    async fn empty_pcm_sends_nothing() {
        let (session, mut rx) = session();
        deliver_pcm(&session, Bytes::new()).await;
        assert!(rx.try_recv().is_err());
    }
}
