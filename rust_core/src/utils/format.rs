//! Display formatting for resolved prices

/// Shown wherever a price is unavailable
pub const PLACEHOLDER: &str = "-";

const MIN_DECIMALS: usize = 2;
const MAX_DECIMALS: usize = 8;

/// Format a price with thousands grouping and 2 to 8 decimals.
///
/// Trailing zeros past the second decimal are dropped, so large prices read
/// `64,000.50` while small caps keep their precision: `0.00001234`.
pub fn format_price_value(price: f64) -> String {
    if !price.is_finite() {
        return PLACEHOLDER.to_string();
    }

    let fixed = format!("{:.*}", MAX_DECIMALS, price.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));

    let mut frac = frac_part.trim_end_matches('0').to_string();
    while frac.len() < MIN_DECIMALS {
        frac.push('0');
    }

    let negative = price < 0.0 && (int_part != "0" || frac.bytes().any(|b| b != b'0'));
    format!(
        "{}{}.{}",
        if negative { "-" } else { "" },
        group_thousands(int_part),
        frac
    )
}

/// Format an optional price, using the placeholder when absent
pub fn format_price(price: Option<f64>) -> String {
    match price {
        Some(p) => format_price_value(p),
        None => PLACEHOLDER.to_string(),
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
