use chrono::DateTime;

use super::LogLine;

/// Parse timestamped log output into lines.
///
/// Expects the layout produced by `docker logs --timestamps`:
/// ```text
/// 2024-01-01T00:00:00.123456789Z server listening on :8080
/// 2024-01-01T00:00:01.000000000Z ready
/// ```
/// Lines without a recognizable timestamp are kept as-is.
pub fn parse_logs(raw: &str) -> Vec<LogLine> {
    raw.lines().map(parse_line).collect()
}

/// Split one line into its leading timestamp and message.
pub fn parse_line(line: &str) -> LogLine {
    let (head, rest) = match line.split_once(' ') {
        Some((head, rest)) => (head, rest),
        None => (line, ""),
    };

    if looks_like_timestamp(head) {
        LogLine {
            timestamp: Some(head.to_string()),
            message: rest.to_string(),
        }
    } else {
        LogLine {
            timestamp: None,
            message: line.to_string(),
        }
    }
}

/// RFC 3339 date-time (the ISO-8601 profile container runtimes emit).
fn looks_like_timestamp(token: &str) -> bool {
    // Cheap shape check before handing off to chrono.
    let bytes = token.as_bytes();
    if bytes.len() < 20 || !bytes[..4].iter().all(u8::is_ascii_digit) || bytes[4] != b'-' {
        return false;
    }
    DateTime::parse_from_rfc3339(token).is_ok()
}
