use chrono::{Duration, TimeZone, Utc};
use url::Url;

use crate::codec::{decode_headers, encode_headers, HeaderCodecError};
use crate::headers::{names, Headers, Importance};
use crate::message::Message;

#[test]
fn get_is_case_insensitive() {
    let mut headers = Headers::new();
    headers.set("MessageId", "abc");
    assert_eq!(headers.get("messageid"), Some("abc"));
    assert_eq!(headers.get("MESSAGEID"), Some("abc"));
    assert_eq!(headers.get("Other"), None);
}

#[test]
fn set_replaces_in_place_and_keeps_first_casing() {
    let mut headers = Headers::new();
    headers.set("Content-Kind", "a");
    headers.set("Topic", "t");
    headers.set("content-kind", "b");

    let entries: Vec<_> = headers.iter().collect();
    assert_eq!(entries, vec![("Content-Kind", "b"), ("Topic", "t")]);
}

#[test]
fn remove_is_case_insensitive() {
    let mut headers = Headers::new();
    headers.set("Topic", "t");
    assert_eq!(headers.remove("TOPIC"), Some("t".to_string()));
    assert!(headers.is_empty());
}

#[test]
fn timestamp_accessors_round_trip() {
    let when = Utc.with_ymd_and_hms(2024, 5, 17, 10, 30, 0).unwrap();
    let mut headers = Headers::new();
    headers.set_sent(when);
    assert_eq!(headers.sent(), Some(when));
    assert!(headers.received().is_none());
}

#[test]
fn uri_accessors_parse() {
    let uri = Url::parse("http://peer.example:8080/").unwrap();
    let mut headers = Headers::new();
    headers.set_destination(&uri);
    assert_eq!(headers.destination(), Some(uri));

    headers.set(names::ORIGINATION, "not a uri");
    assert!(headers.origination().is_none());
}

#[test]
fn importance_defaults_to_normal() {
    let headers = Headers::new();
    assert_eq!(headers.importance(), Importance::Normal);

    assert_eq!(Importance::parse("critical"), Importance::Critical);
    assert_eq!(Importance::parse("LOW"), Importance::Low);
    assert_eq!(Importance::parse("whatever"), Importance::Normal);
}

#[test]
fn generate_message_id_sets_header() {
    let mut headers = Headers::new();
    let id = headers.generate_message_id();
    assert!(!id.is_empty());
    assert_eq!(headers.message_id(), Some(id.as_str()));
}

#[test]
fn expired_message_checks_expires_header() {
    let mut headers = Headers::new();
    headers.set_expires(Utc::now() - Duration::seconds(1));
    let message = Message::new(headers, "body");
    assert!(message.expired());

    let mut headers = Headers::new();
    headers.set_expires(Utc::now() + Duration::hours(1));
    let message = Message::new(headers, "body");
    assert!(!message.expired());

    let message = Message::new(Headers::new(), "body");
    assert!(!message.expired());
}

#[test]
fn codec_round_trips_simple_headers() {
    let mut headers = Headers::new();
    headers.set("MessageId", "id-1");
    headers.set("Topic", "events");
    headers.set("ContentType", "application/json");

    let decoded = decode_headers(&encode_headers(&headers)).unwrap();
    assert_eq!(decoded, headers);
}

#[test]
fn codec_round_trips_multi_line_values() {
    let mut headers = Headers::new();
    headers.set("Note", "first line\nsecond line\nthird line");
    headers.set("Topic", "events");

    let encoded = encode_headers(&headers);
    assert!(encoded.contains("    second line\n"));
    let decoded = decode_headers(&encoded).unwrap();
    assert_eq!(decoded, headers);
}

#[test]
fn codec_round_trips_empty_values_and_interior_blanks() {
    let mut headers = Headers::new();
    headers.set("Empty", "");
    headers.set("Gappy", "a\n\nb");

    let decoded = decode_headers(&encode_headers(&headers)).unwrap();
    assert_eq!(decoded.get("Empty"), Some(""));
    assert_eq!(decoded.get("Gappy"), Some("a\n\nb"));
}

#[test]
fn codec_round_trips_mixed_case_names() {
    let mut headers = Headers::new();
    headers.set("X-CuStOm", "v");
    let decoded = decode_headers(&encode_headers(&headers)).unwrap();
    let entries: Vec<_> = decoded.iter().collect();
    assert_eq!(entries, vec![("X-CuStOm", "v")]);
}

#[test]
fn decode_accepts_tab_continuations() {
    let decoded = decode_headers("Note: a\n\tb\n\n").unwrap();
    assert_eq!(decoded.get("Note"), Some("a\nb"));
}

#[test]
fn decode_ignores_comment_lines() {
    let decoded = decode_headers("# reserved\nTopic: t\n\n").unwrap();
    assert_eq!(decoded.get("Topic"), Some("t"));
    assert_eq!(decoded.len(), 1);
}

#[test]
fn decode_stops_at_blank_line() {
    let decoded = decode_headers("Topic: t\n\nTrailing: ignored\n").unwrap();
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded.get("Trailing"), None);
}

#[test]
fn decode_rejects_line_without_separator() {
    let err = decode_headers("no separator here\n").unwrap_err();
    assert!(matches!(err, HeaderCodecError::MissingSeparator { line: 1, .. }));
}

#[test]
fn decode_rejects_leading_separator() {
    let err = decode_headers(": nameless\n").unwrap_err();
    assert_eq!(err, HeaderCodecError::EmptyName { line: 1 });
}

#[test]
fn decode_rejects_orphan_continuation() {
    let err = decode_headers("    dangling\n").unwrap_err();
    assert_eq!(err, HeaderCodecError::OrphanContinuation { line: 1 });
}
