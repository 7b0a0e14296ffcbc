use crate::config::AgentConfig;
use crate::errors::{DaemonError, Result};
use crate::printer::PrintTransport;
use crate::probe::ProbeBackend;
use crate::status;
use crate::trigger::{TriggerHandler, TriggerMatch};
use backon::{ConstantBuilder, Retryable};
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One connection attempt. `wss://` URLs go through rustls with the
/// webpki root store.
async fn open_channel(url: &str) -> std::result::Result<RelaySocket, tungstenite::Error> {
    let (socket, _) = connect_async(url).await?;
    Ok(socket)
}

/// Relay channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// One inbound event on an open channel
#[derive(Debug)]
enum ChannelEvent {
    Message(String),
    /// Ping/pong and raw frames; answered by tungstenite itself
    Control,
    Closed(Option<String>),
    Failed(DaemonError),
}

impl From<Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>> for ChannelEvent {
    fn from(frame: Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>) -> Self {
        match frame {
            None => ChannelEvent::Closed(None),
            Some(Ok(Message::Text(text))) => ChannelEvent::Message(text),
            Some(Ok(Message::Binary(bytes))) => {
                ChannelEvent::Message(String::from_utf8_lossy(&bytes).into_owned())
            }
            Some(Ok(Message::Close(frame))) => {
                ChannelEvent::Closed(frame.map(|f| f.reason.into_owned()))
            }
            Some(Ok(_)) => ChannelEvent::Control,
            Some(Err(e)) => ChannelEvent::Failed(e.into()),
        }
    }
}

/// Print agent: keeps one relay connection alive and serves triggers on it
pub struct LocalAgent<P, T> {
    relay_url: String,
    greeting: Option<String>,
    trigger: TriggerMatch,
    reconnect_delay: Duration,
    handler: TriggerHandler<P, T>,
    state: watch::Sender<ChannelState>,
}

impl<P: ProbeBackend, T: PrintTransport> LocalAgent<P, T> {
    pub fn new(config: &AgentConfig, prober: P, transport: T) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            relay_url: config.relay_url.clone(),
            greeting: config.greeting.clone(),
            trigger: config.trigger.clone(),
            reconnect_delay: config.reconnect_delay(),
            handler: TriggerHandler::new(config.print_settings(), prober, transport),
            state,
        }
    }

    /// Observe connection state changes
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ChannelState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Relay channel {:?} -> {:?}", previous, next);
        }
    }

    /// Run for the life of the process. A closed or failed channel is
    /// reopened after the fixed reconnect delay, forever.
    pub async fn run(self) {
        info!(
            "Print agent starting (relay: {}, printer: {})",
            self.relay_url,
            self.handler.settings().target.host
        );

        loop {
            self.set_state(ChannelState::Connecting);
            match self.connect().await {
                Ok(socket) => {
                    self.set_state(ChannelState::Connected);
                    info!("Connected to relay {}", self.relay_url);

                    match self.serve(socket).await {
                        Ok(()) => info!("Disconnected from relay"),
                        Err(e) => error!("Relay channel error: {}", e),
                    }
                }
                Err(e) => error!("Relay connection failed: {}", e),
            }

            self.set_state(ChannelState::Disconnected);
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// Connect with constant backoff. The backoff never runs out, so this
    /// only returns once a connection is open.
    async fn connect(&self) -> Result<RelaySocket> {
        let url = self.relay_url.as_str();
        let backoff = ConstantBuilder::default()
            .with_delay(self.reconnect_delay)
            .without_max_times();

        let socket = (|| open_channel(url))
            .retry(backoff)
            .notify(|e, delay| {
                warn!("Relay connection failed: {}; retrying in {:?}", e, delay);
            })
            .await?;
        Ok(socket)
    }

    /// Serve one open connection until it closes
    async fn serve(&self, socket: RelaySocket) -> Result<()> {
        let (mut sink, mut stream) = socket.split();
        let (replies, mut outbound) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(text) = outbound.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!("Failed to send to relay: {}", e);
                    break;
                }
            }
        });

        if let Some(greeting) = &self.greeting {
            let _ = replies.send(greeting.clone());
        }

        let result = loop {
            match ChannelEvent::from(stream.next().await) {
                ChannelEvent::Message(text) => self.on_message(&text, &replies).await,
                ChannelEvent::Control => {}
                ChannelEvent::Closed(reason) => {
                    info!("Relay closed the channel ({})", reason.as_deref().unwrap_or("no reason"));
                    break Ok(());
                }
                ChannelEvent::Failed(e) => break Err(e),
            }
        };

        drop(replies);
        writer.abort();
        result
    }

    /// Triggers run to completion before the next frame is read
    async fn on_message(&self, text: &str, replies: &mpsc::UnboundedSender<String>) {
        info!("Received message from relay: {}", text);

        if !self.trigger.matches(text) {
            debug!("Message does not match trigger, ignoring");
            return;
        }

        let outcome = AssertUnwindSafe(self.handler.handle(text, replies))
            .catch_unwind()
            .await;

        if outcome.is_err() {
            error!("Trigger handling panicked");
            let _ = replies.send(status::trigger_failed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::error::UrlError;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    #[test]
    fn test_text_and_binary_are_messages() {
        assert!(matches!(
            ChannelEvent::from(Some(Ok(Message::Text("print".into())))),
            ChannelEvent::Message(m) if m == "print"
        ));
        assert!(matches!(
            ChannelEvent::from(Some(Ok(Message::Binary(b"print".to_vec())))),
            ChannelEvent::Message(m) if m == "print"
        ));
    }

    #[test]
    fn test_close_and_end_of_stream_close_channel() {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        };
        assert!(matches!(
            ChannelEvent::from(Some(Ok(Message::Close(Some(frame))))),
            ChannelEvent::Closed(Some(r)) if r == "bye"
        ));
        assert!(matches!(ChannelEvent::from(None), ChannelEvent::Closed(None)));
    }

    #[test]
    fn test_ping_is_control() {
        assert!(matches!(
            ChannelEvent::from(Some(Ok(Message::Ping(vec![1])))),
            ChannelEvent::Control
        ));
    }

    #[test]
    fn test_socket_error_fails_channel() {
        let event = ChannelEvent::from(Some(Err(
            tokio_tungstenite::tungstenite::Error::ConnectionClosed,
        )));
        assert!(matches!(event, ChannelEvent::Failed(DaemonError::Channel(_))));
    }

    #[tokio::test]
    async fn test_wss_url_attempts_tls_handshake() {
        // Accepts and drops, so the handshake fails at the TLS layer
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let url = format!("wss://127.0.0.1:{}/", port);
        let result = tokio::time::timeout(Duration::from_secs(5), open_channel(&url))
            .await
            .expect("connect attempt hung");

        match result {
            Ok(_) => panic!("handshake against a plain TCP listener succeeded"),
            Err(tungstenite::Error::Url(UrlError::TlsFeatureNotEnabled)) => {
                panic!("wss relay URLs are not supported by this build")
            }
            Err(_) => {}
        }
    }
}
