//! Decoder for the textual form of a stored `candlestick_agg` value.
//!
//! When a continuous aggregate carries the raw aggregate state (to keep it
//! rollup-able), selecting the column yields text like:
//!
//! `(version:1,open:(ts:"2025-01-01 00:00:10+00",val:102000),...,volume:Transaction(vol:6.3,vwap:64800))`

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid candlestick representation: {0}")]
pub struct CandlestickParseError(String);

/// One decoded OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candlestick {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub open_time: DateTime<Utc>,
    pub high_time: DateTime<Utc>,
    pub low_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap: Option<f64>,
}

fn value_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"val:(-?\d+(?:\.\d+)?)").unwrap())
}

fn time_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"ts:"([^"]+)""#).unwrap())
}

fn volume_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"vol:(-?\d+(?:\.\d+)?)").unwrap())
}

fn vwap_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"vwap:(-?\d+(?:\.\d+)?)").unwrap())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CandlestickParseError> {
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z")
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CandlestickParseError(format!("bad timestamp '{raw}': {e}")))
}

/// Decodes the text rendering of a `candlestick_agg` state into a
/// [`Candlestick`]. The four value/timestamp pairs appear in
/// open/high/low/close order; volume and vwap are present only when the
/// aggregate was built with a volume column.
pub fn parse_candlestick(raw: &str) -> Result<Candlestick, CandlestickParseError> {
    if !raw.starts_with("(version:1") {
        return Err(CandlestickParseError(
            "missing '(version:1' prefix".to_string(),
        ));
    }

    let values: Vec<f64> = value_pattern()
        .captures_iter(raw)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    if values.len() != 4 {
        return Err(CandlestickParseError(format!(
            "expected 4 values, found {}",
            values.len()
        )));
    }

    let timestamps = time_pattern()
        .captures_iter(raw)
        .map(|c| parse_timestamp(c.get(1).map_or("", |m| m.as_str())))
        .collect::<Result<Vec<_>, _>>()?;
    if timestamps.len() != 4 {
        return Err(CandlestickParseError(format!(
            "expected 4 timestamps, found {}",
            timestamps.len()
        )));
    }

    let volume = volume_pattern()
        .captures(raw)
        .and_then(|c| c[1].parse().ok());
    let vwap = vwap_pattern().captures(raw).and_then(|c| c[1].parse().ok());

    Ok(Candlestick {
        open: values[0],
        high: values[1],
        low: values[2],
        close: values[3],
        open_time: timestamps[0],
        high_time: timestamps[1],
        low_time: timestamps[2],
        close_time: timestamps[3],
        volume,
        vwap,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const FULL: &str = "(version:1,open:(ts:\"2025-01-01 00:00:10+00\",val:102000),high:(ts:\"2025-01-01 00:00:20+00\",val:104000),low:(ts:\"2025-01-01 00:00:30+00\",val:101500),close:(ts:\"2025-01-01 00:00:40+00\",val:103500),volume:Transaction(vol:6.3,vwap:64800))";

    #[test]
    fn parses_all_fields() {
        let candle = parse_candlestick(FULL).unwrap();
        assert_eq!(candle.open, 102000.0);
        assert_eq!(candle.high, 104000.0);
        assert_eq!(candle.low, 101500.0);
        assert_eq!(candle.close, 103500.0);
        assert_eq!(
            candle.open_time,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 10).unwrap()
        );
        assert_eq!(
            candle.close_time,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 40).unwrap()
        );
        assert_eq!(candle.volume, Some(6.3));
        assert_eq!(candle.vwap, Some(64800.0));
    }

    #[test]
    fn volume_and_vwap_are_optional() {
        let input = "(version:1,open:(ts:\"2025-01-01 00:00:10+00\",val:102000),high:(ts:\"2025-01-01 00:00:20+00\",val:104000),low:(ts:\"2025-01-01 00:00:30+00\",val:101500),close:(ts:\"2025-01-01 00:00:40+00\",val:103500))";
        let candle = parse_candlestick(input).unwrap();
        assert_eq!(candle.volume, None);
        assert_eq!(candle.vwap, None);
    }

    #[test]
    fn decimal_values_survive() {
        let input = "(version:1,open:(ts:\"2025-01-01 00:00:10+00\",val:102000.50),high:(ts:\"2025-01-01 00:00:20+00\",val:104000.75),low:(ts:\"2025-01-01 00:00:30+00\",val:101500.25),close:(ts:\"2025-01-01 00:00:40+00\",val:103500.80),volume:Transaction(vol:6.3,vwap:64800.45))";
        let candle = parse_candlestick(input).unwrap();
        assert!((candle.open - 102000.50).abs() < 1e-9);
        assert!((candle.vwap.unwrap() - 64800.45).abs() < 1e-9);
    }

    #[test]
    fn timezone_offsets_normalize_to_utc() {
        let input = "(version:1,open:(ts:\"2025-01-01 00:00:10-05:00\",val:1),high:(ts:\"2025-01-01 00:00:20-05:00\",val:2),low:(ts:\"2025-01-01 00:00:30-05:00\",val:3),close:(ts:\"2025-01-01 00:00:40-05:00\",val:4))";
        let candle = parse_candlestick(input).unwrap();
        assert_eq!(
            candle.open_time,
            Utc.with_ymd_and_hms(2025, 1, 1, 5, 0, 10).unwrap()
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_candlestick("invalid candlestick format").is_err());
        assert!(parse_candlestick("(version:1,open:(ts:\"2025-01-01 00:00:10+00\",val:1))").is_err());
    }
}
