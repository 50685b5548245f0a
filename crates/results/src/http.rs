// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Helpers for raw HTTP messages captured during a run.

use serde_json::Value;

/// Separator between HTTP headers and body.
pub const HEADER_END: &str = "\r\n\r\n";

/// Split a raw HTTP message into head and body at the first blank line.
pub fn split_message(raw: &str) -> Option<(&str, &str)> {
    raw.find(HEADER_END)
        .map(|idx| (&raw[..idx], &raw[idx + HEADER_END.len()..]))
}

/// Re-indent the JSON body of a raw HTTP message.
///
/// The body may hold a single JSON value or a stream of them (one per line,
/// as in an envelope). Each value is pretty-printed and followed by a
/// newline. Messages without a body separator, or whose body is not JSON,
/// are returned unchanged.
pub fn format_http(raw: &str) -> String {
    let Some(idx) = raw.find(HEADER_END) else {
        return raw.to_string();
    };
    let body_start = idx + HEADER_END.len();
    match json_indent(&raw[body_start..]) {
        Ok(body) => format!("{}{}", &raw[..body_start], body),
        Err(_) => raw.to_string(),
    }
}

fn json_indent(src: &str) -> serde_json::Result<String> {
    let mut out = String::new();
    for value in serde_json::Deserializer::from_str(src).into_iter::<Value>() {
        out.push_str(&serde_json::to_string_pretty(&value?)?);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_body_separator() {
        assert_eq!(format_http("garbage"), "garbage");
    }

    #[test]
    fn test_empty_body() {
        let raw = "GET / HTTP/1.1\r\nHost: app\r\n\r\n";
        assert_eq!(format_http(raw), raw);
    }

    #[test]
    fn test_non_json_body() {
        let raw = "HTTP/1.1 200 OK\r\n\r\n<html></html>";
        assert_eq!(format_http(raw), raw);
    }

    #[test]
    fn test_single_value() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n[{\"id\":1,\"randomNumber\":42}]";
        let want = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n[\n  {\n    \"id\": 1,\n    \"randomNumber\": 42\n  }\n]\n";
        assert_eq!(format_http(raw), want);
    }

    #[test]
    fn test_value_stream_keeps_key_order() {
        let raw = "POST /api/1/envelope/ HTTP/1.1\r\n\r\n{\"event_id\":\"abc\",\"dsn\":\"x\"}\n{\"type\":\"transaction\"}\n{\"spans\":[],\"contexts\":null}";
        let want = "POST /api/1/envelope/ HTTP/1.1\r\n\r\n{\n  \"event_id\": \"abc\",\n  \"dsn\": \"x\"\n}\n{\n  \"type\": \"transaction\"\n}\n{\n  \"spans\": [],\n  \"contexts\": null\n}\n";
        assert_eq!(format_http(raw), want);
    }

    #[test]
    fn test_split_message() {
        let (head, body) = split_message("POST / HTTP/1.1\r\nA: b\r\n\r\n{}").unwrap();
        assert_eq!(head, "POST / HTTP/1.1\r\nA: b");
        assert_eq!(body, "{}");
        assert!(split_message("no body").is_none());
    }
}
