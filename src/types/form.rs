//! Form field extraction from query strings and request bodies
//!
//! Accepts `application/x-www-form-urlencoded` bodies and the text parts of
//! `multipart/form-data` bodies. File parts are skipped. Body fields take
//! precedence over query fields of the same name.

use std::collections::HashMap;

const URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    values: HashMap<String, String>,
}

impl FormFields {
    /// Collect fields from the query string and, when the content type is a
    /// form, from the body
    pub fn parse(query: Option<&str>, content_type: Option<&str>, body: &[u8]) -> Self {
        let mut values: HashMap<String, String> = HashMap::new();

        if let Some(query) = query {
            for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
                values.entry(name.into_owned()).or_insert_with(|| value.into_owned());
            }
        }

        let mut body_values: HashMap<String, String> = HashMap::new();
        match content_type.map(media_type) {
            Some(URLENCODED) => {
                if let Ok(pairs) = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
                    for (name, value) in pairs {
                        body_values.entry(name).or_insert(value);
                    }
                }
            }
            Some(MULTIPART) => {
                if let Some(boundary) = content_type.and_then(boundary) {
                    for (name, value) in multipart_text_fields(body, &boundary) {
                        body_values.entry(name).or_insert(value);
                    }
                }
            }
            _ => {}
        }

        values.extend(body_values);
        Self { values }
    }

    /// Field value, empty when absent
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

fn boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.eq_ignore_ascii_case("boundary")
            .then(|| value.trim_matches('"').to_string())
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Text parts (no `filename`) of a multipart body
fn multipart_text_fields(body: &[u8], boundary: &str) -> Vec<(String, String)> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut fields = Vec::new();

    let Some(start) = find(body, delimiter) else {
        return fields;
    };
    let mut rest = &body[start + delimiter.len()..];

    loop {
        // "--" after a delimiter closes the body.
        if rest.starts_with(b"--") {
            break;
        }
        let Some(next) = find(rest, delimiter) else {
            break;
        };
        let part = &rest[..next];
        let part = part.strip_prefix(b"\r\n").unwrap_or(part);
        let part = part.strip_suffix(b"\r\n").unwrap_or(part);

        if let Some(split) = find(part, b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&part[..split]);
            let content = &part[split + 4..];
            if let Some(name) = disposition_name(&headers) {
                if let Ok(value) = std::str::from_utf8(content) {
                    fields.push((name, value.to_string()));
                }
            }
        }

        rest = &rest[next + delimiter.len()..];
    }

    fields
}

/// `name` of a `Content-Disposition: form-data` header, `None` for file parts
fn disposition_name(headers: &str) -> Option<String> {
    let line = headers.lines().find(|line| {
        line.split(':')
            .next()
            .is_some_and(|h| h.trim().eq_ignore_ascii_case("content-disposition"))
    })?;
    let (_, value) = line.split_once(':')?;

    let mut name = None;
    for param in value.split(';').skip(1) {
        let Some((key, val)) = param.trim().split_once('=') else {
            continue;
        };
        match key.trim() {
            "filename" => return None,
            "name" => name = Some(val.trim().trim_matches('"').to_string()),
            _ => {}
        }
    }
    name
}
