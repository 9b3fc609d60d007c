//! Price board: one line per requested symbol, as a consumer would render it

use tickerlens_rust_core::LivePriceResolver;

pub struct BoardRow {
    pub symbol: String,
    pub price: String,
    pub source: &'static str,
    pub live: bool,
}

pub fn build_rows(resolver: &LivePriceResolver, symbols: &[String]) -> Vec<BoardRow> {
    symbols
        .iter()
        .map(|symbol| BoardRow {
            symbol: symbol.to_uppercase(),
            price: resolver.format_price(symbol),
            source: resolver.get_price_source(symbol).unwrap_or("none"),
            live: resolver.is_symbol_live(symbol),
        })
        .collect()
}

pub fn render_row(row: &BoardRow) -> String {
    let marker = if row.live { "*" } else { " " };
    format!("{}{:<8} {:>18}  {}", marker, row.symbol, row.price, row.source)
}
