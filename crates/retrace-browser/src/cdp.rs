//! DevTools wire protocol: JSON commands over a websocket.
//!
//! Incoming frames are parsed into typed records up front — command replies
//! correlated by id, everything else surfaced as a `CdpEvent`. Commands are
//! issued one at a time by a single owner; replies that arrive while the
//! event queue is being drained are parked until their caller asks.

use anyhow::{Result, anyhow, bail};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A notification pushed by the browser.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CdpEvent {
    pub method: String,
    #[serde(default, rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub params: Value,
}

impl CdpEvent {
    /// Events without a session id are browser-global and visible to every
    /// session.
    pub fn is_for_session(&self, session: &str) -> bool {
        self.session_id.as_deref().is_none_or(|id| id == session)
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct ReplyError {
    message: String,
    #[serde(default)]
    #[allow(dead_code)]
    code: i64,
}

/// One incoming frame, split into the two shapes the protocol uses.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Frame {
    Reply {
        id: i64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<ReplyError>,
    },
    Event(CdpEvent),
}

fn reply_outcome(result: Option<Value>, error: Option<ReplyError>) -> Result<Value, String> {
    match error {
        Some(error) => Err(error.message),
        None => Ok(result.unwrap_or_else(|| json!({}))),
    }
}

pub struct CdpConnection {
    socket: Socket,
    last_id: i64,
    events: VecDeque<CdpEvent>,
    parked_replies: HashMap<i64, Result<Value, String>>,
}

impl CdpConnection {
    pub async fn open(endpoint: &str) -> Result<Self> {
        let (socket, _) = connect_async(endpoint)
            .await
            .map_err(|error| anyhow!("CDP websocket connect failed: {}", error))?;
        Ok(Self {
            socket,
            last_id: 0,
            events: VecDeque::new(),
            parked_replies: HashMap::new(),
        })
    }

    /// Issue a command and block until its reply arrives. Events read while
    /// waiting are queued for `next_event`.
    pub async fn call(
        &mut self,
        session: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        self.last_id += 1;
        let id = self.last_id;

        let mut envelope = json!({ "id": id, "method": method, "params": params });
        if let Some(session) = session {
            envelope["sessionId"] = Value::String(session.to_string());
        }

        self.socket
            .send(Message::Text(envelope.to_string().into()))
            .await
            .map_err(|error| anyhow!("CDP send failed for '{}': {}", method, error))?;

        loop {
            if let Some(outcome) = self.parked_replies.remove(&id) {
                return outcome.map_err(|message| anyhow!("'{}' failed: {}", method, message));
            }

            match self.recv_frame().await? {
                Frame::Reply {
                    id: reply_id,
                    result,
                    error,
                } => {
                    let outcome = reply_outcome(result, error);
                    if reply_id == id {
                        return outcome
                            .map_err(|message| anyhow!("'{}' failed: {}", method, message));
                    }
                    self.parked_replies.insert(reply_id, outcome);
                }
                Frame::Event(event) => self.events.push_back(event),
            }
        }
    }

    /// Next browser event, or None once the window elapses with nothing.
    pub async fn next_event(&mut self, window: Duration) -> Result<Option<CdpEvent>> {
        let deadline = Instant::now() + window;
        loop {
            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            match timeout(remaining, self.recv_frame()).await {
                Err(_) => return Ok(None),
                Ok(frame) => match frame? {
                    Frame::Reply { id, result, error } => {
                        self.parked_replies.insert(id, reply_outcome(result, error));
                    }
                    Frame::Event(event) => return Ok(Some(event)),
                },
            }
        }
    }

    async fn recv_frame(&mut self) -> Result<Frame> {
        loop {
            let message = self
                .socket
                .next()
                .await
                .ok_or_else(|| anyhow!("CDP websocket stream ended"))?
                .map_err(|error| anyhow!("CDP websocket read failed: {}", error))?;

            let text = match message {
                Message::Text(text) => text.to_string(),
                Message::Binary(bytes) => String::from_utf8(bytes.to_vec())
                    .map_err(|error| anyhow!("CDP frame is not UTF-8: {}", error))?,
                Message::Ping(payload) => {
                    self.socket.send(Message::Pong(payload)).await?;
                    continue;
                }
                Message::Close(_) => bail!("CDP websocket closed by peer"),
                Message::Pong(_) | Message::Frame(_) => continue,
            };

            return serde_json::from_str(&text)
                .map_err(|error| anyhow!("unrecognised CDP frame: {}", error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(frame: Value) -> Frame {
        serde_json::from_value(frame).unwrap()
    }

    #[test]
    fn frames_split_into_replies_and_events() {
        match parse(json!({"id": 3, "result": {"targetId": "t1"}})) {
            Frame::Reply { id, result, error } => {
                assert_eq!(id, 3);
                assert_eq!(result.unwrap()["targetId"], "t1");
                assert!(error.is_none());
            }
            Frame::Event(_) => panic!("reply parsed as event"),
        }

        match parse(json!({
            "method": "Page.lifecycleEvent",
            "sessionId": "s1",
            "params": {"name": "load"}
        })) {
            Frame::Event(event) => {
                assert_eq!(event.method, "Page.lifecycleEvent");
                assert_eq!(event.session_id.as_deref(), Some("s1"));
                assert_eq!(event.param_str("name"), Some("load"));
            }
            Frame::Reply { .. } => panic!("event parsed as reply"),
        }
    }

    #[test]
    fn command_errors_surface_the_browser_message() {
        let outcome = match parse(json!({
            "id": 9,
            "error": {"code": -32000, "message": "No node with given id"}
        })) {
            Frame::Reply { result, error, .. } => reply_outcome(result, error),
            Frame::Event(_) => panic!("reply parsed as event"),
        };
        assert_eq!(outcome.unwrap_err(), "No node with given id");
    }

    #[test]
    fn replies_without_result_default_to_an_empty_object() {
        let outcome = match parse(json!({"id": 1})) {
            Frame::Reply { result, error, .. } => reply_outcome(result, error),
            Frame::Event(_) => panic!("reply parsed as event"),
        };
        assert_eq!(outcome.unwrap(), json!({}));
    }

    #[test]
    fn session_scoping_lets_global_events_through() {
        let scoped = CdpEvent {
            method: "Network.requestWillBeSent".to_string(),
            session_id: Some("mine".to_string()),
            params: Value::Null,
        };
        assert!(scoped.is_for_session("mine"));
        assert!(!scoped.is_for_session("other"));

        let global = CdpEvent {
            method: "Browser.downloadProgress".to_string(),
            session_id: None,
            params: Value::Null,
        };
        assert!(global.is_for_session("anything"));
    }
}
