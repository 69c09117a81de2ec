//! Client for the external AI scoring service
//!
//! One request per round: the target word, the full candidate list, and the
//! recorded stroke history go out as JSON over a short-lived TCP connection;
//! the service answers with its best-guess word, a 0-100 similarity score,
//! and a correctness flag. Both directions are framed with a `u32`
//! network-order length prefix.
//!
//! Calls are best-effort. The engine schedules them off the room critical
//! path and simply skips the AI broadcast for the round when one fails.

use log::debug;
use serde::{Deserialize, Serialize};
use shared::DrawPoint;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Upper bound on a reply body, to keep a confused peer from ballooning
/// the read.
const MAX_REPLY_LEN: u32 = 1024 * 1024;

/// How long one scoring call may take end to end. Longer than the guessing
/// window on purpose; a result that arrives after its round is discarded by
/// the engine anyway.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AiError {
    #[error("scoring service unreachable: {0}")]
    Unavailable(#[from] std::io::Error),
    #[error("scoring call timed out")]
    Timeout,
    #[error("malformed scoring reply: {0}")]
    Malformed(String),
}

/// The scoring verdict for one drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiOutcome {
    pub predicted_word: String,
    pub score: u8,
    pub is_correct: bool,
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    target: &'a str,
    candidates: &'a [String],
    drawing: &'a [DrawPoint],
}

#[derive(Deserialize)]
struct ScoreReply {
    predicted_word: String,
    score: i64,
    is_correct: u8,
}

/// Handle on the scoring endpoint. Cheap to clone; each call opens its own
/// connection.
#[derive(Debug, Clone)]
pub struct AiClient {
    addr: String,
}

impl AiClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
        }
    }

    /// Runs one scoring call. Never called while a registry lock is held;
    /// the payload is prepared by the caller beforehand.
    pub async fn score(
        &self,
        target: &str,
        candidates: &[String],
        drawing: &[DrawPoint],
    ) -> Result<AiOutcome, AiError> {
        let payload = serde_json::to_vec(&ScoreRequest {
            target,
            candidates,
            drawing,
        })
        .map_err(|e| AiError::Malformed(e.to_string()))?;

        let reply = timeout(CALL_TIMEOUT, self.exchange(&payload))
            .await
            .map_err(|_| AiError::Timeout)??;

        let parsed: ScoreReply = serde_json::from_slice(&reply)
            .map_err(|e| AiError::Malformed(e.to_string()))?;

        debug!(
            "AI predicted {:?} (score {}, correct {})",
            parsed.predicted_word, parsed.score, parsed.is_correct
        );

        Ok(AiOutcome {
            predicted_word: parsed.predicted_word,
            score: parsed.score.clamp(0, 100) as u8,
            is_correct: parsed.is_correct != 0,
        })
    }

    async fn exchange(&self, payload: &[u8]) -> Result<Vec<u8>, AiError> {
        let mut stream = TcpStream::connect(&self.addr).await?;

        stream.write_all(&(payload.len() as u32).to_be_bytes()).await?;
        stream.write_all(payload).await?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let reply_len = u32::from_be_bytes(len_buf);
        if reply_len > MAX_REPLY_LEN {
            return Err(AiError::Malformed(format!(
                "reply length {} exceeds limit",
                reply_len
            )));
        }

        let mut reply = vec![0u8; reply_len as usize];
        stream.read_exact(&mut reply).await?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Serves one canned reply with the service's length-prefix framing and
    /// returns the request body it saw.
    async fn mock_service(reply_json: &'static str) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).await.unwrap();
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut body = vec![0u8; len];
            stream.read_exact(&mut body).await.unwrap();

            let reply = reply_json.as_bytes();
            stream
                .write_all(&(reply.len() as u32).to_be_bytes())
                .await
                .unwrap();
            stream.write_all(reply).await.unwrap();
            body
        });

        (addr.to_string(), handle)
    }

    fn client_for(addr: &str) -> AiClient {
        let (host, port) = addr.rsplit_once(':').unwrap();
        AiClient::new(host, port.parse().unwrap())
    }

    #[tokio::test]
    async fn score_roundtrip() {
        let (addr, handle) =
            mock_service(r#"{"predicted_word": "apple", "score": 91, "is_correct": 1}"#).await;

        let candidates = vec!["apple".to_string(), "banana".to_string()];
        let drawing = vec![
            DrawPoint {
                x: 10,
                y: 20,
                action: 1,
            },
            DrawPoint {
                x: 15,
                y: 25,
                action: 2,
            },
        ];

        let outcome = client_for(&addr)
            .score("apple", &candidates, &drawing)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AiOutcome {
                predicted_word: "apple".to_string(),
                score: 91,
                is_correct: true,
            }
        );

        // The request body is the JSON the service expects.
        let body = handle.await.unwrap();
        let request: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(request["target"], "apple");
        assert_eq!(request["candidates"][1], "banana");
        assert_eq!(request["drawing"][0]["x"], 10);
        assert_eq!(request["drawing"][1]["action"], 2);
    }

    #[tokio::test]
    async fn score_clamps_out_of_range() {
        let (addr, _handle) =
            mock_service(r#"{"predicted_word": "sun", "score": 9000, "is_correct": 0}"#).await;

        let outcome = client_for(&addr).score("sun", &[], &[]).await.unwrap();
        assert_eq!(outcome.score, 100);
        assert!(!outcome.is_correct);
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        // Bind then drop, so the port is very likely closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = AiClient::new("127.0.0.1", addr.port());
        match client.score("apple", &[], &[]).await {
            Err(AiError::Unavailable(_)) => {}
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn garbage_reply_is_malformed() {
        let (addr, _handle) = mock_service("not json at all").await;

        match client_for(&addr).score("apple", &[], &[]).await {
            Err(AiError::Malformed(_)) => {}
            other => panic!("expected Malformed, got {:?}", other),
        }
    }
}
