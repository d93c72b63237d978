//! Merge live prices into a baseline document

use std::collections::HashMap;

use crate::types::{
    non_empty, EnrichedLevel, EnrichedSummary, EnrichedView, OptionLevel, OptionSummary,
    SymbolDocument,
};

/// Keys the enrichment writes; stale copies in a stored document are dropped.
const TOP_LEVEL_LIVE_FIELDS: [&str; 2] = ["ltp", "future_ltp"];
const LEVEL_LIVE_FIELDS: [&str; 2] = ["ltp", "average_price"];

/// Build the broadcast view of `doc`.
///
/// Prices fall back to the reference close of the same instrument. Averages
/// never fall back. Inputs are not modified.
pub fn enrich(
    doc: &SymbolDocument,
    prices: &HashMap<String, f64>,
    averages: &HashMap<String, f64>,
) -> EnrichedView {
    let live = |key: &Option<String>| non_empty(key).and_then(|k| prices.get(k).copied());

    let mut extra = doc.extra.clone();
    for field in TOP_LEVEL_LIVE_FIELDS {
        extra.remove(field);
    }

    EnrichedView {
        symbol: doc.symbol.clone(),
        expiry_date: doc.expiry_date.clone(),
        trade_date: doc.trade_date.clone(),
        instrument_key: doc.instrument_key.clone(),
        future_instrument_key: doc.future_instrument_key.clone(),
        cash_data: doc.cash_data.clone(),
        future_data: doc.future_data.clone(),
        ce_summary: doc
            .ce_summary
            .as_ref()
            .map(|s| enrich_summary(s, prices, averages)),
        pe_summary: doc
            .pe_summary
            .as_ref()
            .map(|s| enrich_summary(s, prices, averages)),
        ltp: live(&doc.instrument_key).or_else(|| doc.cash_close()),
        future_ltp: live(&doc.future_instrument_key).or_else(|| doc.future_close()),
        extra,
    }
}

fn enrich_summary(
    summary: &OptionSummary,
    prices: &HashMap<String, f64>,
    averages: &HashMap<String, f64>,
) -> EnrichedSummary {
    let level = |l: &Option<OptionLevel>| l.as_ref().map(|l| enrich_level(l, prices, averages));

    EnrichedSummary {
        min: level(&summary.min),
        base: level(&summary.base),
        max: level(&summary.max),
        hoi: level(&summary.hoi),
        extra: summary.extra.clone(),
    }
}

fn enrich_level(
    level: &OptionLevel,
    prices: &HashMap<String, f64>,
    averages: &HashMap<String, f64>,
) -> EnrichedLevel {
    let key = non_empty(&level.instrument_key);

    let mut base = level.clone();
    for field in LEVEL_LIVE_FIELDS {
        base.extra.remove(field);
    }

    EnrichedLevel {
        ltp: key.and_then(|k| prices.get(k).copied()).or(level.close),
        average_price: key.and_then(|k| averages.get(k).copied()),
        level: base,
    }
}
