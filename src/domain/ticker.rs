use crate::config::MARKET;

/// Trims, upper-cases, strips a leading `$` and fixes known typos.
pub fn normalize_ticker(raw: &str) -> String {
    let cleaned = raw.trim().to_ascii_uppercase();
    let cleaned = cleaned.strip_prefix('$').unwrap_or(&cleaned);
    MARKET
        .ticker_fixes
        .iter()
        .find(|(typo, _)| *typo == cleaned)
        .map(|(_, fixed)| fixed.to_string())
        .unwrap_or_else(|| cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ticker() {
        assert_eq!(normalize_ticker(" msft "), "MSFT");
        assert_eq!(normalize_ticker("$nvda"), "NVDA");
        assert_eq!(normalize_ticker("appl"), "AAPL");
        assert_eq!(normalize_ticker(""), "");
    }
}
