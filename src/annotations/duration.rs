//! Duration parsing and formatting for annotation values.
//!
//! nginx timeout annotations historically accept either a bare integer
//! (seconds) or a Go `time.ParseDuration` expression. Values are re-emitted
//! in the Gateway API canonical form `^([0-9]{1,5}(h|m|s|ms)){1,4}$`.

use std::time::Duration;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

/// Parse an annotation value as a duration: a bare integer is seconds,
/// anything else must be a Go-style duration expression.
pub fn parse(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    parse_go_duration(value)
}

/// Parse a Go `time.ParseDuration` expression (`1h2m3s4ms`, decimals
/// allowed). Negative durations have no meaning for timeouts and are
/// rejected.
fn parse_go_duration(mut s: &str) -> Option<Duration> {
    fn unit_base(unit: &str) -> Option<Duration> {
        Some(match unit {
            "ns" => Duration::from_nanos(1),
            // U+00B5 is the micro sign, U+03BC the Greek letter mu
            "us" | "\u{00b5}s" | "\u{03bc}s" => Duration::from_micros(1),
            "ms" => Duration::from_millis(1),
            "s" => Duration::from_secs(1),
            "m" => MINUTE,
            "h" => HOUR,
            _ => return None,
        })
    }

    if s.is_empty() || s.starts_with('-') {
        return None;
    }
    s = s.trim_start_matches('+');

    let mut total = Duration::from_secs(0);
    while !s.is_empty() {
        let unit_start = s.find(|c: char| c.is_alphabetic())?;
        let (value, rest) = s.split_at(unit_start);
        let value = value.parse::<f64>().ok()?;
        let unit = if let Some(next_start) = rest.find(|c: char| !c.is_alphabetic()) {
            let (unit, rest) = rest.split_at(next_start);
            s = rest;
            unit
        } else {
            s = "";
            rest
        };
        total += Duration::try_from_secs_f64(unit_base(unit)?.as_secs_f64() * value).ok()?;
    }

    Some(total)
}

/// Format a duration in the Gateway API canonical form. Components are
/// emitted largest-first, zero components are skipped and sub-millisecond
/// residue is dropped; the zero duration is `0s`.
pub fn format_gateway(duration: Duration) -> String {
    let mut remaining = duration;
    let mut out = String::new();

    let hours = remaining.as_secs() / 3600;
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
        remaining -= Duration::from_secs(hours * 3600);
    }

    let minutes = remaining.as_secs() / 60;
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
        remaining -= Duration::from_secs(minutes * 60);
    }

    let seconds = remaining.as_secs();
    if seconds > 0 {
        out.push_str(&format!("{seconds}s"));
        remaining -= Duration::from_secs(seconds);
    }

    let millis = remaining.subsec_millis();
    if millis > 0 {
        out.push_str(&format!("{millis}ms"));
    }

    if out.is_empty() {
        return "0s".to_string();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("30", Duration::from_secs(30))]
    #[case("0", Duration::from_secs(0))]
    #[case("5s", Duration::from_secs(5))]
    #[case("1m30s", Duration::from_secs(90))]
    #[case("3h30m", 3 * HOUR + 30 * MINUTE)]
    #[case("1.5s", Duration::from_millis(1500))]
    #[case("250ms", Duration::from_millis(250))]
    #[case("1h2m3s4ms", HOUR + 2 * MINUTE + Duration::from_secs(3) + Duration::from_millis(4))]
    fn parses_integers_and_go_expressions(#[case] input: &str, #[case] expected: Duration) {
        assert_eq!(parse(input), Some(expected));
    }

    #[rstest]
    #[case("invalid")]
    #[case("")]
    #[case("5x")]
    #[case("-5s")]
    #[case("s5")]
    fn rejects_malformed_values(#[case] input: &str) {
        assert_eq!(parse(input), None);
    }

    #[rstest]
    #[case(Duration::from_secs(0), "0s")]
    #[case(Duration::from_secs(30), "30s")]
    #[case(Duration::from_secs(90), "1m30s")]
    #[case(3 * HOUR + 30 * MINUTE, "3h30m")]
    #[case(Duration::from_millis(1500), "1s500ms")]
    #[case(Duration::from_millis(250), "250ms")]
    #[case(HOUR + 2 * MINUTE + Duration::from_secs(3) + Duration::from_millis(4), "1h2m3s4ms")]
    fn formats_canonically(#[case] input: Duration, #[case] expected: &str) {
        assert_eq!(format_gateway(input), expected);
    }

    #[test]
    fn sub_millisecond_residue_is_dropped() {
        assert_eq!(format_gateway(Duration::from_micros(900)), "0s");
        assert_eq!(format_gateway(Duration::from_micros(1_000_900)), "1s");
    }
}
