//! Minimal Chrome DevTools Protocol client over a WebSocket.
//!
//! A reader task routes command responses to their waiting caller by id and
//! fans events out to every live subscriber; a writer task owns the sink.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::AutomationError;

/// Protocol event (a message with `method` and no `id`).
#[derive(Debug, Clone)]
pub(super) struct CdpEvent {
    pub method: String,
    pub params: Value,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;
type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<CdpEvent>>>>;

pub(super) struct CdpConnection {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Pending,
    subscribers: Subscribers,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl CdpConnection {
    pub(super) async fn connect(ws_url: &str) -> Result<Self, AutomationError> {
        let (socket, _) = tokio_tungstenite::connect_async(ws_url).await?;
        let (mut sink, mut stream) = socket.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    tracing::debug!("devtools write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let pending: Pending = Arc::default();
        let subscribers: Subscribers = Arc::default();
        let reader = {
            let pending = Arc::clone(&pending);
            let subscribers = Arc::clone(&subscribers);
            tokio::spawn(async move {
                while let Some(frame) = stream.next().await {
                    let text = match frame {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            tracing::debug!("devtools read failed: {}", e);
                            break;
                        }
                    };
                    dispatch(&text, &pending, &subscribers);
                }
                // Dropping the senders wakes every waiter with a closed error.
                lock(&pending).clear();
                lock(&subscribers).clear();
            })
        };

        Ok(Self {
            outgoing,
            pending,
            subscribers,
            next_id: AtomicU64::new(1),
            reader,
            writer,
        })
    }

    /// Receive every event that arrives after this call.
    pub(super) fn subscribe(&self) -> mpsc::UnboundedReceiver<CdpEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Send a command and wait for its result. `session_id` targets an
    /// attached page; `None` addresses the browser itself.
    pub(super) async fn call(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value, AutomationError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut message = json!({ "id": id, "method": method, "params": params });
        if let Some(session) = session_id {
            message["sessionId"] = Value::String(session.to_string());
        }

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        if self.outgoing.send(Message::Text(message.to_string())).is_err() {
            lock(&self.pending).remove(&id);
            return Err(AutomationError::Closed);
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(AutomationError::Protocol {
                method: method.to_string(),
                message,
            }),
            Err(_) => Err(AutomationError::Closed),
        }
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Route one incoming frame: responses by id, events to subscribers.
fn dispatch(text: &str, pending: &Pending, subscribers: &Subscribers) {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("ignoring malformed devtools frame: {}", e);
            return;
        }
    };

    if let Some(id) = value.get("id").and_then(Value::as_u64) {
        let Some(tx) = lock(pending).remove(&id) else {
            return;
        };
        let result = match value.get("error") {
            Some(err) => Err(err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string()),
            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
        };
        let _ = tx.send(result);
        return;
    }

    if let Some(method) = value.get("method").and_then(Value::as_str) {
        let event = CdpEvent {
            method: method.to_string(),
            params: value.get("params").cloned().unwrap_or(Value::Null),
        };
        lock(subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_routes_response_and_error() {
        let pending: Pending = Arc::default();
        let subscribers: Subscribers = Arc::default();
        let (ok_tx, mut ok_rx) = oneshot::channel();
        let (err_tx, mut err_rx) = oneshot::channel();
        lock(&pending).insert(1, ok_tx);
        lock(&pending).insert(2, err_tx);

        dispatch(r#"{"id":1,"result":{"frameId":"F"}}"#, &pending, &subscribers);
        dispatch(
            r#"{"id":2,"error":{"code":-32000,"message":"No target"}}"#,
            &pending,
            &subscribers,
        );

        assert_eq!(ok_rx.try_recv().unwrap().unwrap()["frameId"], "F");
        assert_eq!(err_rx.try_recv().unwrap().unwrap_err(), "No target");
        assert!(lock(&pending).is_empty());
    }

    #[test]
    fn dispatch_fans_out_events_and_drops_closed_subscribers() {
        let pending: Pending = Arc::default();
        let subscribers: Subscribers = Arc::default();
        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        drop(dead_rx);
        lock(&subscribers).push(live_tx);
        lock(&subscribers).push(dead_tx);

        dispatch(
            r#"{"method":"Browser.downloadProgress","params":{"guid":"g1","state":"completed"}}"#,
            &pending,
            &subscribers,
        );

        let event = live_rx.try_recv().unwrap();
        assert_eq!(event.method, "Browser.downloadProgress");
        assert_eq!(event.params["guid"], "g1");
        assert_eq!(lock(&subscribers).len(), 1);
    }

    #[test]
    fn dispatch_ignores_garbage_and_unknown_ids() {
        let pending: Pending = Arc::default();
        let subscribers: Subscribers = Arc::default();
        dispatch("not json", &pending, &subscribers);
        dispatch(r#"{"id":99,"result":{}}"#, &pending, &subscribers);
        assert!(lock(&pending).is_empty());
    }
}
