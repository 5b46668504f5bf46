//! Pip size / pip value reference table (spec.md §9 open question: "must
//! be unit-tested against a known reference for every enabled
//! instrument"). Covers the common FX majors and JPY crosses; anything
//! else falls back to the JPY-suffix heuristic.

/// One pip in price terms for `instrument`.
pub fn pip_size(instrument: &str) -> f64 {
    match instrument {
        "USDJPY" | "EURJPY" | "GBPJPY" | "AUDJPY" | "CHFJPY" | "CADJPY" | "NZDJPY" => 0.01,
        _ if instrument.ends_with("JPY") => 0.01,
        _ => 0.0001,
    }
}

/// Approximate pip value in quote-currency terms per standard lot
/// (100,000 units), used for position sizing. This is a simplification —
/// a precise value requires the live cross rate to the account currency,
/// out of scope per spec.md §1 (broker wire protocols / live FX
/// conversion are non-goals); the constant below matches the common
/// USD-quote approximation used for sizing majors.
pub fn pip_value_per_lot(_instrument: &str) -> f64 {
    10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eurusd_pip_is_one_hundredth_of_a_cent() {
        assert_eq!(pip_size("EURUSD"), 0.0001);
    }

    #[test]
    fn usdjpy_pip_is_one_hundredth_of_a_yen() {
        assert_eq!(pip_size("USDJPY"), 0.01);
    }

    #[test]
    fn jpy_cross_not_in_the_explicit_table_still_resolves_to_jpy_pip() {
        assert_eq!(pip_size("SGDJPY"), 0.01);
    }

    #[test]
    fn gbpusd_and_audusd_use_standard_pip() {
        assert_eq!(pip_size("GBPUSD"), 0.0001);
        assert_eq!(pip_size("AUDUSD"), 0.0001);
    }
}
