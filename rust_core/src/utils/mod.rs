pub mod format;

pub use format::{format_price, format_price_value, PLACEHOLDER};
