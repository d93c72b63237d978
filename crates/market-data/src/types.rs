//! Baseline documents, live quotes and the enriched broadcast shape
//!
//! Stored documents carry more fields than the feed reads. Everything not
//! modelled explicitly lands in a flattened `extra` map so it is passed
//! through to subscribers unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Accepts a number, a numeric string or null.
fn lenient_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Empty strings count as absent instrument ids.
pub(crate) fn non_empty(id: &Option<String>) -> Option<&str> {
    id.as_deref().filter(|s| !s.is_empty())
}

/// Snapshot of one symbol's derivative structure and reference prices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolDocument {
    /// Filled in from the requested symbol when the stored document omits it
    #[serde(default)]
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_date: Option<Value>,
    /// Index instrument id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub future_instrument_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_data: Option<ReferenceData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub future_data: Option<ReferenceData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ce_summary: Option<OptionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pe_summary: Option<OptionSummary>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SymbolDocument {
    pub fn cash_close(&self) -> Option<f64> {
        self.cash_data.as_ref().and_then(|d| d.close)
    }

    /// Future reference close, or the cash close when the future has none
    pub fn future_close(&self) -> Option<f64> {
        self.future_data
            .as_ref()
            .and_then(|d| d.close)
            .or_else(|| self.cash_close())
    }

    /// Call levels then put levels, each in [`LevelName::ORDER`]
    pub fn levels(&self) -> impl Iterator<Item = &OptionLevel> {
        self.ce_summary
            .iter()
            .chain(self.pe_summary.iter())
            .flat_map(|summary| summary.levels())
    }
}

/// Cash or future block; only the reference close is read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    #[serde(
        rename = "CP",
        default,
        deserialize_with = "lenient_price",
        skip_serializing_if = "Option::is_none"
    )]
    pub close: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The four named levels of one option side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelName {
    /// Lowest strike
    Min,
    Base,
    /// Highest strike
    Max,
    /// Highest open interest
    Hoi,
}

impl LevelName {
    pub const ORDER: [LevelName; 4] = [LevelName::Min, LevelName::Base, LevelName::Max, LevelName::Hoi];

    pub fn as_str(&self) -> &'static str {
        match self {
            LevelName::Min => "MIN",
            LevelName::Base => "BASE",
            LevelName::Max => "MAX",
            LevelName::Hoi => "HOI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSummary {
    #[serde(rename = "MIN", default, skip_serializing_if = "Option::is_none")]
    pub min: Option<OptionLevel>,
    #[serde(rename = "BASE", default, skip_serializing_if = "Option::is_none")]
    pub base: Option<OptionLevel>,
    #[serde(rename = "MAX", default, skip_serializing_if = "Option::is_none")]
    pub max: Option<OptionLevel>,
    #[serde(rename = "HOI", default, skip_serializing_if = "Option::is_none")]
    pub hoi: Option<OptionLevel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OptionSummary {
    pub fn level(&self, name: LevelName) -> Option<&OptionLevel> {
        match name {
            LevelName::Min => self.min.as_ref(),
            LevelName::Base => self.base.as_ref(),
            LevelName::Max => self.max.as_ref(),
            LevelName::Hoi => self.hoi.as_ref(),
        }
    }

    pub fn levels(&self) -> impl Iterator<Item = &OptionLevel> {
        LevelName::ORDER.into_iter().filter_map(|name| self.level(name))
    }
}

/// One option contract inside a summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionLevel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_key: Option<String>,
    #[serde(
        rename = "PRICE",
        default,
        deserialize_with = "lenient_price",
        skip_serializing_if = "Option::is_none"
    )]
    pub strike: Option<f64>,
    #[serde(
        rename = "CP",
        default,
        deserialize_with = "lenient_price",
        skip_serializing_if = "Option::is_none"
    )]
    pub close: Option<f64>,
    /// OI, GA, VA, MAXA, trading_symbol and anything else
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Freshly fetched price pair for one instrument
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveQuote {
    /// Upstream canonical id; the map key when quotes are sent out
    #[serde(skip)]
    pub instrument_id: String,
    #[serde(rename = "ltp")]
    pub last_price: f64,
    pub average_price: Option<f64>,
}

/// Baseline document with live values merged in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedView {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_date: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub future_instrument_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_data: Option<ReferenceData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub future_data: Option<ReferenceData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ce_summary: Option<EnrichedSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe_summary: Option<EnrichedSummary>,
    /// Index price
    pub ltp: Option<f64>,
    pub future_ltp: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedSummary {
    #[serde(rename = "MIN", skip_serializing_if = "Option::is_none")]
    pub min: Option<EnrichedLevel>,
    #[serde(rename = "BASE", skip_serializing_if = "Option::is_none")]
    pub base: Option<EnrichedLevel>,
    #[serde(rename = "MAX", skip_serializing_if = "Option::is_none")]
    pub max: Option<EnrichedLevel>,
    #[serde(rename = "HOI", skip_serializing_if = "Option::is_none")]
    pub hoi: Option<EnrichedLevel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EnrichedSummary {
    pub fn level(&self, name: LevelName) -> Option<&EnrichedLevel> {
        match name {
            LevelName::Min => self.min.as_ref(),
            LevelName::Base => self.base.as_ref(),
            LevelName::Max => self.max.as_ref(),
            LevelName::Hoi => self.hoi.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedLevel {
    #[serde(flatten)]
    pub level: OptionLevel,
    pub ltp: Option<f64>,
    pub average_price: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_keeps_unknown_fields() {
        let raw = json!({
            "_id": "65f0",
            "symbol": "NIFTY",
            "expiry_date": "2024-12-26",
            "instrument_key": "NSE_INDEX|Nifty 50",
            "cash_data": { "CP": 24000.5, "DA": 120, "UP": 24100 },
            "future_data": { "FPL": 3, "AVG": 24010 },
            "ce_summary": {
                "BASE": { "instrument_key": "NSE_FO|1", "PRICE": 24000, "CP": "100.5", "OI": 9 }
            },
            "custom": [1, 2, 3]
        });

        let doc: SymbolDocument = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(doc.cash_close(), Some(24000.5));
        assert_eq!(doc.future_data.as_ref().and_then(|d| d.close), None);
        assert_eq!(doc.future_close(), Some(24000.5));

        let base = doc.ce_summary.as_ref().unwrap().level(LevelName::Base).unwrap();
        assert_eq!(base.close, Some(100.5));
        assert_eq!(base.extra.get("OI"), Some(&json!(9)));

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["_id"], json!("65f0"));
        assert_eq!(back["custom"], json!([1, 2, 3]));
        assert_eq!(back["cash_data"]["DA"], json!(120));
        assert_eq!(back["future_data"]["AVG"], json!(24010));
    }

    #[test]
    fn test_levels_iterate_calls_then_puts_in_order() {
        let doc: SymbolDocument = serde_json::from_value(json!({
            "symbol": "X",
            "ce_summary": {
                "HOI": { "instrument_key": "c-hoi" },
                "MIN": { "instrument_key": "c-min" }
            },
            "pe_summary": {
                "MAX": { "instrument_key": "p-max" },
                "BASE": { "instrument_key": "p-base" }
            }
        }))
        .unwrap();

        let keys: Vec<_> = doc
            .levels()
            .filter_map(|l| l.instrument_key.as_deref())
            .collect();
        assert_eq!(keys, vec!["c-min", "c-hoi", "p-base", "p-max"]);
    }

    #[test]
    fn test_live_quote_wire_shape() {
        let quote = LiveQuote {
            instrument_id: "NSE_FO|Y".to_string(),
            last_price: 50.0,
            average_price: None,
        };
        assert_eq!(
            serde_json::to_value(&quote).unwrap(),
            json!({ "ltp": 50.0, "average_price": null })
        );
    }
}
