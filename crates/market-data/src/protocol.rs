//! Subscriber wire protocol
//!
//! JSON text frames with a `type` discriminator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::types::{EnrichedView, LiveQuote};
use crate::Result;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Sent once, right after a subscriber registers
    InitialData {
        symbols: BTreeMap<String, EnrichedView>,
        timestamp: DateTime<Utc>,
    },
    MarketData {
        symbols: BTreeMap<String, EnrichedView>,
        timestamp: DateTime<Utc>,
    },
    ExtraLtpUpdate {
        data: BTreeMap<String, LiveQuote>,
        timestamp: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    ExtraLtpStarted {
        count: usize,
        timestamp: DateTime<Utc>,
    },
    ExtraLtpStopped {
        timestamp: DateTime<Utc>,
    },
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::InitialData { .. } => "initial_data",
            OutboundMessage::MarketData { .. } => "market_data",
            OutboundMessage::ExtraLtpUpdate { .. } => "extra_ltp_update",
            OutboundMessage::Pong { .. } => "pong",
            OutboundMessage::ExtraLtpStarted { .. } => "extra_ltp_started",
            OutboundMessage::ExtraLtpStopped { .. } => "extra_ltp_stopped",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Ping,
    RequestExtraLtp {
        #[serde(rename = "instrumentKeys", default)]
        instrument_keys: Vec<String>,
    },
    StopExtraLtp,
    /// Any other `type`; ignored
    #[serde(other)]
    Unknown,
}

pub fn parse_inbound(text: &str) -> Result<InboundMessage> {
    serde_json::from_str(text).map_err(|e| FeedError::MalformedInboundMessage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_inbound_messages() {
        assert_eq!(parse_inbound(r#"{"type":"ping"}"#).unwrap(), InboundMessage::Ping);
        assert_eq!(
            parse_inbound(r#"{"type":"request_extra_ltp","instrumentKeys":["A","B"]}"#).unwrap(),
            InboundMessage::RequestExtraLtp {
                instrument_keys: vec!["A".to_string(), "B".to_string()]
            }
        );
        assert_eq!(
            parse_inbound(r#"{"type":"request_extra_ltp"}"#).unwrap(),
            InboundMessage::RequestExtraLtp {
                instrument_keys: vec![]
            }
        );
        assert_eq!(
            parse_inbound(r#"{"type":"stop_extra_ltp"}"#).unwrap(),
            InboundMessage::StopExtraLtp
        );
        assert_eq!(
            parse_inbound(r#"{"type":"subscribe"}"#).unwrap(),
            InboundMessage::Unknown
        );
    }

    #[test]
    fn test_malformed_inbound() {
        assert_matches!(
            parse_inbound("not json"),
            Err(FeedError::MalformedInboundMessage(_))
        );
        assert!(parse_inbound(r#"{"no_type":1}"#).is_err());
    }

    #[test]
    fn test_outbound_shape() {
        let mut data = BTreeMap::new();
        data.insert(
            "Y".to_string(),
            LiveQuote {
                instrument_id: "Y".to_string(),
                last_price: 50.0,
                average_price: None,
            },
        );
        let message = OutboundMessage::ExtraLtpUpdate {
            data,
            timestamp: Utc::now(),
        };

        let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], json!("extra_ltp_update"));
        assert_eq!(value["data"]["Y"], json!({ "ltp": 50.0, "average_price": null }));
        assert!(value["timestamp"].is_string());
        assert_eq!(message.kind(), "extra_ltp_update");
    }
}
