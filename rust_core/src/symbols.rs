//! Symbol helpers
//!
//! Tickers arrive from callers and APIs in inconsistent casing ("BTC", "btc",
//! "Btc") and sometimes as venue pairs ("BTCUSDT"). Storage keys are uppercase;
//! reads probe the variants listed here.

use rustc_hash::FxHashSet;

/// Quote currency appended to bare assets to form Binance spot pairs
pub const QUOTE_SUFFIX: &str = "USDT";

/// Trim a caller-supplied symbol, returning `None` for blank input
pub fn clean(symbol: &str) -> Option<&str> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Canonical storage key
pub fn key(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Uppercase key with the quote suffix appended (e.g. BTC -> BTCUSDT)
pub fn pair_key(symbol: &str) -> String {
    format!("{}{}", key(symbol), QUOTE_SUFFIX)
}

/// Lookup order used against maps that may hold several spellings:
/// uppercase, lowercase, then the symbol exactly as given.
pub fn case_variants(symbol: &str) -> [String; 3] {
    let given = symbol.trim();
    [given.to_uppercase(), given.to_lowercase(), given.to_string()]
}

/// Drop blank entries and collapse case-insensitive duplicates.
/// The first spelling of each symbol is kept, order preserved.
pub fn dedupe<S: AsRef<str>>(symbols: &[S]) -> Vec<String> {
    let mut seen = FxHashSet::default();
    let mut out = Vec::with_capacity(symbols.len());

    for raw in symbols {
        let Some(symbol) = clean(raw.as_ref()) else {
            continue;
        };
        if seen.insert(key(symbol)) {
            out.push(symbol.to_string());
        }
    }

    out
}
