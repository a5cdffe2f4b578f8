//! Strict tokenizing and decoding of raw telemetry lines.
//!
//! A record line has the shape
//! `<measurement>[,<tag>=<value>]* <field>=<value> <timestamp>`.
//! Only the top-level space split is quote-aware; the tag set splits on
//! plain commas and the field set splits once on `=`.

use std::str::FromStr;

use thiserror::Error;

use crate::channel::{Channel, UnknownChannel};
use crate::event::ObserveError;

/// Number of ingest servers; sizes the accumulator grid. Wire-format server
/// ids are 1-based and must land in `[0, SERVER_COUNT)` after conversion.
pub const SERVER_COUNT: usize = 64;

/// Longest acceptable record line, in bytes.
pub const MAX_LINE_BYTES: usize = 255;

/// Strict decode failures for numeric and quoted tokens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("could not parse as integer: {0}")]
    Integer(String),
    #[error("could not parse as float: {0}")]
    Float(String),
    #[error("invalid influx integer: {0}")]
    InfluxSuffix(String),
    #[error("influx integer out of range: {0}")]
    InfluxRange(String),
    #[error("invalid quoted string: {0}")]
    Quoted(String),
}

/// A fatal failure while parsing one record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("line too long ({0} bytes)")]
    LineTooLong(usize),
    #[error("invalid timestamp: {0}")]
    Timestamp(DecodeError),
    #[error("field set must be a single key=value pair: {0}")]
    FieldShape(String),
    #[error("unknown measurement: {0}")]
    UnknownMeasurement(String),
    #[error("invalid or missing server id")]
    ServerId,
    #[error("missing channel tag")]
    MissingChannel,
    #[error(transparent)]
    Channel(#[from] UnknownChannel),
    #[error(transparent)]
    Observe(#[from] ObserveError),
}

/// Splits `s` on `sep`, treating separators inside double quotes as literal.
/// Quote state toggles on every `"` seen.
#[must_use]
pub fn split_quoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if !in_quotes && ch == sep {
            parts.push(&s[start..i]);
            start = i + ch.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Base-10 unsigned decode that must consume the whole token.
pub fn decode_u64(s: &str) -> Result<u64, DecodeError> {
    s.parse().map_err(|_| DecodeError::Integer(s.to_string()))
}

/// Float decode that must consume the whole token.
pub fn decode_f64(s: &str) -> Result<f64, DecodeError> {
    s.parse().map_err(|_| DecodeError::Float(s.to_string()))
}

/// Influx-style integer: `<uint>i`, value bounded to u32.
pub fn decode_influx_u32(s: &str) -> Result<u32, DecodeError> {
    let digits = s
        .strip_suffix('i')
        .ok_or_else(|| DecodeError::InfluxSuffix(s.to_string()))?;
    let wide = decode_u64(digits)?;
    u32::try_from(wide).map_err(|_| DecodeError::InfluxRange(s.to_string()))
}

/// Strips the surrounding double quotes from a nonempty quoted string.
pub fn unquote(s: &str) -> Result<&str, DecodeError> {
    if s.len() > 2 && s.starts_with('"') && s.ends_with('"') {
        Ok(&s[1..s.len() - 1])
    } else {
        Err(DecodeError::Quoted(s.to_string()))
    }
}

/// Dispatch class of a measurement name. The name set is closed; anything
/// unrecognized aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    /// Carries the playback telemetry of interest.
    ClientBuffer,
    /// Recognized but irrelevant to session analysis.
    Ignored,
}

impl FromStr for Measurement {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client_buffer" => Ok(Self::ClientBuffer),
            "active_streams" | "backlog" | "channel_status" | "client_error"
            | "client_sysinfo" | "decoder_info" | "server_info" | "ssim" | "video_acked"
            | "video_sent" | "video_size" => Ok(Self::Ignored),
            _ => Err(RecordError::UnknownMeasurement(s.to_string())),
        }
    }
}

/// Extracts the mandatory 1-based `server_id` tag and converts it to a
/// 0-based grid index.
pub fn server_index(tags: &[&str]) -> Result<u8, RecordError> {
    for tag in tags {
        if let Some(raw) = tag.strip_prefix("server_id=") {
            let id = decode_u64(raw).map_err(|_| RecordError::ServerId)?;
            if id == 0 || id > SERVER_COUNT as u64 {
                return Err(RecordError::ServerId);
            }
            return u8::try_from(id - 1).map_err(|_| RecordError::ServerId);
        }
    }
    Err(RecordError::ServerId)
}

/// Extracts the mandatory `channel` tag.
pub fn channel_tag(tags: &[&str]) -> Result<Channel, RecordError> {
    for tag in tags {
        if let Some(name) = tag.strip_prefix("channel=") {
            return Ok(name.parse::<Channel>()?);
        }
    }
    Err(RecordError::MissingChannel)
}

/// One telemetry record tokenized from a raw line; the field value is still
/// undecoded.
#[derive(Debug)]
pub struct RawRecord<'a> {
    pub measurement: &'a str,
    pub tags: Vec<&'a str>,
    pub field_key: &'a str,
    pub field_value: &'a str,
    pub timestamp: u64,
}

/// Classification of one raw input line.
#[derive(Debug)]
pub enum Tokenized<'a> {
    /// Blank, comment, or administrative line; nothing to do.
    Ignored,
    /// Wrong number of top-level fields; recoverable.
    Malformed,
    Record(RawRecord<'a>),
}

/// Tokenizes one line. Timestamp and field-pair shape are validated here,
/// before measurement dispatch, so even ignored measurements must be
/// well-formed.
pub fn tokenize(line: &str) -> Result<Tokenized<'_>, RecordError> {
    if line.is_empty() || line.starts_with('#') {
        return Ok(Tokenized::Ignored);
    }
    if line.starts_with("CREATE DATABASE") {
        return Ok(Tokenized::Ignored);
    }
    if line.len() > MAX_LINE_BYTES {
        return Err(RecordError::LineTooLong(line.len()));
    }

    let fields = split_quoted(line, ' ');
    if fields.len() != 3 {
        return Ok(Tokenized::Malformed);
    }

    let timestamp = decode_u64(fields[2]).map_err(RecordError::Timestamp)?;

    let mut tags: Vec<&str> = fields[0].split(',').collect();
    let measurement = tags.remove(0);

    let (field_key, field_value) = fields[1]
        .split_once('=')
        .ok_or_else(|| RecordError::FieldShape(fields[1].to_string()))?;

    Ok(Tokenized::Record(RawRecord {
        measurement,
        tags,
        field_key,
        field_value,
        timestamp,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_quoted_respects_quotes() {
        let parts = split_quoted(r#"client_buffer,channel=cbs user="a b" 123"#, ' ');
        assert_eq!(
            parts,
            vec!["client_buffer,channel=cbs", r#"user="a b""#, "123"]
        );
    }

    #[test]
    fn split_quoted_without_separator_is_whole_input() {
        assert_eq!(split_quoted("abc", ' '), vec!["abc"]);
    }

    #[test]
    fn decode_u64_rejects_trailing_junk() {
        assert_eq!(decode_u64("123").unwrap(), 123);
        assert!(decode_u64("123x").is_err());
        assert!(decode_u64("").is_err());
    }

    #[test]
    fn decode_f64_must_consume_whole_token() {
        assert!((decode_f64("3.25").unwrap() - 3.25).abs() < f64::EPSILON);
        assert!(decode_f64("3.25abc").is_err());
    }

    #[test]
    fn influx_integer_requires_suffix_and_u32_range() {
        assert_eq!(decode_influx_u32("42i").unwrap(), 42);
        assert!(decode_influx_u32("42").is_err());
        assert!(decode_influx_u32("4294967296i").is_err());
    }

    #[test]
    fn unquote_requires_nonempty_quoted_body() {
        assert_eq!(unquote(r#""alice""#).unwrap(), "alice");
        assert!(unquote(r#""""#).is_err());
        assert!(unquote("alice").is_err());
    }

    #[test]
    fn server_index_is_one_based_and_bounded() {
        assert_eq!(server_index(&["channel=cbs", "server_id=1"]).unwrap(), 0);
        assert_eq!(server_index(&["server_id=64"]).unwrap(), 63);
        assert!(server_index(&["server_id=65"]).is_err());
        assert!(server_index(&["server_id=0"]).is_err());
        assert!(server_index(&["channel=cbs"]).is_err());
    }

    #[test]
    fn channel_tag_parses_known_channels() {
        assert_eq!(channel_tag(&["server_id=3", "channel=fox"]).unwrap(), Channel::Fox);
        assert!(channel_tag(&["server_id=3"]).is_err());
        assert!(channel_tag(&["channel=espn"]).is_err());
    }

    #[test]
    fn measurement_dispatch_is_closed() {
        assert_eq!("client_buffer".parse::<Measurement>().unwrap(), Measurement::ClientBuffer);
        assert_eq!("ssim".parse::<Measurement>().unwrap(), Measurement::Ignored);
        assert!("mystery_series".parse::<Measurement>().is_err());
    }

    #[test]
    fn tokenize_splits_measurement_tags_field_and_timestamp() {
        let line = r#"client_buffer,channel=cbs,server_id=1 event="init" 1569428241999999999"#;
        let Tokenized::Record(record) = tokenize(line).unwrap() else {
            panic!("expected record");
        };
        assert_eq!(record.measurement, "client_buffer");
        assert_eq!(record.tags, vec!["channel=cbs", "server_id=1"]);
        assert_eq!(record.field_key, "event");
        assert_eq!(record.field_value, r#""init""#);
        assert_eq!(record.timestamp, 1_569_428_241_999_999_999);
    }

    #[test]
    fn tokenize_skips_comments_blank_and_admin_lines() {
        assert!(matches!(tokenize("").unwrap(), Tokenized::Ignored));
        assert!(matches!(tokenize("# comment").unwrap(), Tokenized::Ignored));
        assert!(matches!(tokenize("CREATE DATABASE puffer").unwrap(), Tokenized::Ignored));
    }

    #[test]
    fn tokenize_flags_wrong_field_count_as_malformed() {
        assert!(matches!(tokenize("too many top level fields here").unwrap(), Tokenized::Malformed));
        assert!(matches!(tokenize("only_two fields").unwrap(), Tokenized::Malformed));
    }

    #[test]
    fn tokenize_rejects_long_lines() {
        let line = format!("client_buffer buffer=1 {}", "9".repeat(300));
        assert!(matches!(tokenize(&line), Err(RecordError::LineTooLong(_))));
    }

    #[test]
    fn tokenize_rejects_bad_timestamp_and_missing_field_pair() {
        assert!(matches!(
            tokenize("client_buffer buffer=1 123abc"),
            Err(RecordError::Timestamp(_))
        ));
        assert!(matches!(
            tokenize("client_buffer buffer 123"),
            Err(RecordError::FieldShape(_))
        ));
    }
}
