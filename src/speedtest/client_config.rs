//! Client identity from the speedtest.net configuration document

use regex::Regex;
use serde_json::{Map, Value};

/// Attributes of the `<client .../>` element as string values
pub fn parse_client(document: &str) -> Option<Value> {
    let element = Regex::new(r"<client\s+([^>]*?)/?>").ok()?;
    let attribute = Regex::new(r#"([A-Za-z_][\w-]*)\s*=\s*"([^"]*)""#).ok()?;

    let attributes = element.captures(document)?.get(1)?.as_str();
    let client: Map<String, Value> = attribute
        .captures_iter(attributes)
        .map(|captures| (captures[1].to_string(), Value::from(unescape(&captures[2]))))
        .collect();

    if client.is_empty() {
        None
    } else {
        Some(Value::Object(client))
    }
}

fn unescape(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
