//! Instrument ids referenced by a baseline document

use crate::types::{non_empty, SymbolDocument};

/// Index id, future id, call levels then put levels (MIN, BASE, MAX, HOI).
///
/// Absent ids are skipped. Duplicates are kept; callers that batch requests
/// dedupe themselves.
pub fn instrument_keys(doc: &SymbolDocument) -> Vec<String> {
    let mut keys = Vec::with_capacity(10);

    if let Some(key) = non_empty(&doc.instrument_key) {
        keys.push(key.to_string());
    }
    if let Some(key) = non_empty(&doc.future_instrument_key) {
        keys.push(key.to_string());
    }
    keys.extend(
        doc.levels()
            .filter_map(|level| non_empty(&level.instrument_key))
            .map(str::to_string),
    );

    keys
}

/// Reference closes for every referenced instrument, used to seed prices
/// before the first live fetch.
pub fn reference_closes(doc: &SymbolDocument) -> Vec<(String, f64)> {
    let mut closes = Vec::with_capacity(10);

    if let (Some(key), Some(close)) = (non_empty(&doc.instrument_key), doc.cash_close()) {
        closes.push((key.to_string(), close));
    }
    if let (Some(key), Some(close)) = (non_empty(&doc.future_instrument_key), doc.future_close()) {
        closes.push((key.to_string(), close));
    }
    for level in doc.levels() {
        if let (Some(key), Some(close)) = (non_empty(&level.instrument_key), level.close) {
            closes.push((key.to_string(), close));
        }
    }

    closes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> SymbolDocument {
        serde_json::from_value(json!({
            "symbol": "NIFTY",
            "instrument_key": "IDX",
            "future_instrument_key": "FUT",
            "cash_data": { "CP": 200.0 },
            "ce_summary": {
                "MIN": { "instrument_key": "C1", "CP": 10.0 },
                "BASE": { "instrument_key": "C2", "CP": 20.0 },
                "MAX": { "instrument_key": "C3" },
                "HOI": { "instrument_key": "C2", "CP": 20.0 }
            },
            "pe_summary": {
                "MIN": { "instrument_key": "P1", "CP": 11.0 },
                "BASE": { "instrument_key": "" },
                "HOI": { "instrument_key": "P4", "CP": 14.0 }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_key_order() {
        assert_eq!(
            instrument_keys(&doc()),
            vec!["IDX", "FUT", "C1", "C2", "C3", "C2", "P1", "P4"]
        );
    }

    #[test]
    fn test_missing_index_and_future() {
        let mut d = doc();
        d.instrument_key = None;
        d.future_instrument_key = Some(String::new());
        assert_eq!(instrument_keys(&d)[0], "C1");
    }

    #[test]
    fn test_reference_closes() {
        let closes = reference_closes(&doc());
        assert_eq!(closes[0], ("IDX".to_string(), 200.0));
        // Future has no CP of its own, so it borrows the cash close
        assert_eq!(closes[1], ("FUT".to_string(), 200.0));
        assert!(!closes.iter().any(|(k, _)| k == "C3"));
        assert!(closes.contains(&("P4".to_string(), 14.0)));
    }
}
