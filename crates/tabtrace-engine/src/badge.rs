//! Toolbar badge text for a finished page load.

use serde::{Deserialize, Serialize};

/// Character budget of the host's badge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BadgeStyle {
    /// Four characters including the decimal point.
    #[default]
    Standard,
    /// Three characters, one less decimal.
    Compact,
}

impl BadgeStyle {
    pub fn from_compact(compact: bool) -> Self {
        if compact {
            Self::Compact
        } else {
            Self::Standard
        }
    }

    fn budget(self) -> usize {
        match self {
            Self::Standard => 4,
            Self::Compact => 3,
        }
    }
}

/// Seconds with fewer decimals as the value grows, cut to the badge budget.
pub fn format_badge_text(duration_ms: f64, style: BadgeStyle) -> String {
    let seconds = duration_ms / 1000.0;
    let precision: usize = if seconds >= 100.0 {
        0
    } else if seconds >= 10.0 {
        1
    } else {
        2
    };
    let precision = match style {
        BadgeStyle::Standard => precision,
        BadgeStyle::Compact => precision.saturating_sub(1),
    };

    let mut text = to_fixed(seconds, precision);
    text.truncate(style.budget());
    text
}

/// Fixed-point text where an exact tie rounds to the larger magnitude.
///
/// `format!` rounds ties to even on the exact binary value, so only exact
/// ties need adjusting; nudging those one ulp up gives the larger neighbor.
fn to_fixed(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return format!("{value}");
    }
    if value.is_sign_negative() && value != 0.0 {
        return format!("-{}", to_fixed(-value, precision));
    }
    let value = value.abs();
    if is_exact_tie(value, precision) {
        let above = f64::from_bits(value.to_bits() + 1);
        return format!("{above:.precision$}");
    }
    format!("{value:.precision$}")
}

// Finite doubles have at most 1074 fractional binary digits, so this many
// decimal places is their exact expansion.
const EXACT_DIGITS: usize = 1074;

fn is_exact_tie(value: f64, precision: usize) -> bool {
    let exact = format!("{value:.digits$}", digits = EXACT_DIGITS);
    let fraction = exact
        .split_once('.')
        .map(|(_, fraction)| fraction.trim_end_matches('0'))
        .unwrap_or("");
    fraction.len() == precision + 1 && fraction.ends_with('5')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_second_uses_two_decimals() {
        assert_eq!(format_badge_text(120.0, BadgeStyle::Standard), "0.12");
        assert_eq!(format_badge_text(1_234.0, BadgeStyle::Standard), "1.23");
    }

    #[test]
    fn precision_drops_as_value_grows() {
        assert_eq!(format_badge_text(12_345.0, BadgeStyle::Standard), "12.3");
        assert_eq!(format_badge_text(123_456.0, BadgeStyle::Standard), "123");
    }

    #[test]
    fn long_values_are_truncated() {
        assert_eq!(format_badge_text(1_234_567.0, BadgeStyle::Standard), "1235");
        assert_eq!(format_badge_text(98_765_432.0, BadgeStyle::Standard), "9876");
    }

    #[test]
    fn compact_drops_a_decimal_and_a_character() {
        assert_eq!(format_badge_text(120.0, BadgeStyle::Compact), "0.1");
        assert_eq!(format_badge_text(12_345.0, BadgeStyle::Compact), "12");
        assert_eq!(format_badge_text(123_456.0, BadgeStyle::Compact), "123");
    }

    #[test]
    fn exact_ties_round_up() {
        let cases = [
            (125.0, BadgeStyle::Standard, "0.13"),
            (375.0, BadgeStyle::Standard, "0.38"),
            (10_250.0, BadgeStyle::Standard, "10.3"),
            (250.0, BadgeStyle::Compact, "0.3"),
            (2_500.0, BadgeStyle::Compact, "2.5"),
            (150_500.0, BadgeStyle::Standard, "151"),
            (12_500.0, BadgeStyle::Compact, "13"),
        ];
        for (ms, style, expected) in cases {
            assert_eq!(format_badge_text(ms, style), expected, "{ms}ms {style:?}");
        }
    }

    #[test]
    fn inexact_halves_follow_the_binary_value() {
        // 1.005 is stored just below the half, so it rounds down.
        assert_eq!(format_badge_text(1_005.0, BadgeStyle::Standard), "1.00");
        assert_eq!(to_fixed(1.015, 2), "1.01");
        assert_eq!(to_fixed(0.5, 0), "1");
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(-2.5, 0), "-3");
    }

    #[test]
    fn style_from_setting() {
        assert_eq!(BadgeStyle::from_compact(true), BadgeStyle::Compact);
        assert_eq!(BadgeStyle::default(), BadgeStyle::Standard);
    }
}
