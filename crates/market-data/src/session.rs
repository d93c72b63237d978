//! Bridges subscriber sockets to the feed

use std::net::SocketAddr;

use chrono::Utc;
use server::{ConnectionId, MessageHandler, OutboundSender};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::feed::MarketFeed;
use crate::protocol::{parse_inbound, InboundMessage, OutboundMessage};
use crate::registry::SubscriberSink;

/// Outbound queue of one socket connection
pub struct SocketSink {
    outbound: OutboundSender,
}

impl SocketSink {
    pub fn new(outbound: OutboundSender) -> Self {
        Self { outbound }
    }
}

impl SubscriberSink for SocketSink {
    fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    fn send_text(&self, text: String) -> bool {
        self.outbound.send(Message::Text(text)).is_ok()
    }
}

/// Socket hooks: register on connect, answer control messages, unregister
/// on disconnect.
pub struct FeedSocketHandler {
    feed: MarketFeed,
}

impl FeedSocketHandler {
    pub fn new(feed: MarketFeed) -> Self {
        Self { feed }
    }

    fn reply(message: OutboundMessage) -> Option<Message> {
        match message.to_json() {
            Ok(text) => Some(Message::Text(text)),
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "Failed to encode reply");
                None
            }
        }
    }

    fn handle_text(&self, conn_id: ConnectionId, text: &str) -> Option<Message> {
        let inbound = match parse_inbound(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(subscriber = conn_id, error = %e, "Ignoring inbound message");
                return None;
            }
        };

        match inbound {
            InboundMessage::Ping => Self::reply(OutboundMessage::Pong {
                timestamp: Utc::now(),
            }),
            InboundMessage::RequestExtraLtp { instrument_keys } => {
                let count = self.feed.start_extra(Some(conn_id), instrument_keys);
                if count == 0 {
                    debug!(subscriber = conn_id, "Empty extra feed request ignored");
                    return None;
                }
                Self::reply(OutboundMessage::ExtraLtpStarted {
                    count,
                    timestamp: Utc::now(),
                })
            }
            InboundMessage::StopExtraLtp => {
                self.feed.stop_extra();
                Self::reply(OutboundMessage::ExtraLtpStopped {
                    timestamp: Utc::now(),
                })
            }
            InboundMessage::Unknown => {
                debug!(subscriber = conn_id, "Unknown message type");
                None
            }
        }
    }
}

impl MessageHandler for FeedSocketHandler {
    fn handle(&self, conn_id: ConnectionId, message: Message) -> Option<Message> {
        match message {
            Message::Text(text) => self.handle_text(conn_id, &text),
            _ => None,
        }
    }

    fn on_connect(&self, conn_id: ConnectionId, peer_addr: SocketAddr, outbound: OutboundSender) {
        debug!(subscriber = conn_id, %peer_addr, "Socket connected");
        self.feed.register(conn_id, Box::new(SocketSink::new(outbound)));
    }

    fn on_disconnect(&self, conn_id: ConnectionId) {
        self.feed.unregister(conn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::StaticBaselineSource;
    use crate::testing::{feed_with, nifty_document, quote_body, ScriptedTransport};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn handler() -> (FeedSocketHandler, MarketFeed) {
        let feed = feed_with(
            Arc::new(ScriptedTransport::always(200, quote_body(&[]))),
            Arc::new(ScriptedTransport::always(200, quote_body(&[]))),
            StaticBaselineSource::new().with("NIFTY", nifty_document()),
        );
        (FeedSocketHandler::new(feed.clone()), feed)
    }

    fn reply_type(reply: Option<Message>) -> Option<String> {
        let Some(Message::Text(text)) = reply else {
            return None;
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        value["type"].as_str().map(str::to_string)
    }

    fn text(s: &str) -> Message {
        Message::Text(s.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_messages() {
        let (handler, feed) = handler();

        assert_eq!(reply_type(handler.handle(1, text(r#"{"type":"ping"}"#))).as_deref(), Some("pong"));

        let started = handler.handle(1, text(r#"{"type":"request_extra_ltp","instrumentKeys":["A","B"]}"#));
        let Some(Message::Text(body)) = started else {
            panic!("expected a reply");
        };
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["type"], "extra_ltp_started");
        assert_eq!(value["count"], 2);
        assert_eq!(feed.extra_keys().unwrap(), vec!["A", "B"]);

        assert_eq!(
            reply_type(handler.handle(1, text(r#"{"type":"stop_extra_ltp"}"#))).as_deref(),
            Some("extra_ltp_stopped")
        );
        assert!(feed.extra_keys().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_messages() {
        let (handler, feed) = handler();

        assert!(handler.handle(1, text(r#"{"type":"request_extra_ltp","instrumentKeys":[]}"#)).is_none());
        assert!(feed.extra_keys().is_none());
        assert!(handler.handle(1, text("{oops")).is_none());
        assert!(handler.handle(1, text(r#"{"type":"subscribe"}"#)).is_none());
        assert!(handler.handle(1, Message::Binary(vec![1, 2])).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_disconnect_drive_registration() {
        let (handler, feed) = handler();
        feed.load_all().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        handler.on_connect(7, "127.0.0.1:9000".parse().unwrap(), tx);
        assert_eq!(feed.subscriber_count(), 1);

        let Some(Message::Text(first)) = rx.recv().await else {
            panic!("expected initial snapshot");
        };
        assert!(first.contains("\"initial_data\""));

        tokio::time::sleep(Duration::from_millis(1)).await;
        let Some(Message::Text(second)) = rx.recv().await else {
            panic!("expected market data");
        };
        assert!(second.contains("\"market_data\""));

        handler.on_disconnect(7);
        assert_eq!(feed.subscriber_count(), 0);
        assert!(!feed.is_primary_running());
    }

    #[test]
    fn test_closed_sink_reports_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = SocketSink::new(tx);
        assert!(sink.is_open());
        drop(rx);
        assert!(!sink.is_open());
        assert!(!sink.send_text("late".to_string()));
    }
}
