//! Request shaping and record hygiene helpers.

use std::collections::BTreeMap;

/// Header keys containing any of these (case-insensitive) are redacted.
const SENSITIVE_HEADER_FRAGMENTS: [&str; 5] = ["authorization", "api-key", "x-api-key", "bearer", "token"];

pub const REDACTED: &str = "[REDACTED]";

/// `base` without trailing `/` + `/` + `endpoint` without leading `/`, then
/// the percent-encoded query parameters.
pub fn build_url(base_url: &str, endpoint: &str, query: &BTreeMap<String, String>) -> String {
    let mut url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    );

    if !query.is_empty() {
        let encoded: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&encoded.join("&"));
    }
    url
}

pub fn sanitize_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(key, value)| {
            let lowered = key.to_ascii_lowercase();
            if SENSITIVE_HEADER_FRAGMENTS.iter().any(|s| lowered.contains(s)) {
                (key.clone(), REDACTED.to_string())
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}

/// Keep the first `max_chars` characters and append `marker` when cut.
pub fn truncate_chars(body: &str, max_chars: usize, marker: &str) -> String {
    match body.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &body[..byte_idx], marker),
        None => body.to_string(),
    }
}

/// Number of records in a JSON body: array length, 1 for any other JSON
/// value, 0 when the body does not parse.
pub fn count_json_records(body: &str) -> usize {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Array(items)) => items.len(),
        Ok(_) => 1,
        Err(_) => 0,
    }
}
