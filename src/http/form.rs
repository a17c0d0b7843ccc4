//! `application/x-www-form-urlencoded` decoding for form posts.

use std::collections::HashMap;

/// Decodes one urlencoded component: `+` becomes a space, then percent-escapes
/// are resolved. Invalid UTF-8 after decoding falls back to the raw text.
pub fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Parses `key=value&key2=value2` into a map. Later duplicates win.
pub fn parse(input: &str) -> HashMap<String, String> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode_component(k), decode_component(v)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plus_and_percent() {
        let form = parse("message=how+are+you%3F&system_prompt=Be%20kind%0Aalways");
        assert_eq!(form.get("message").map(String::as_str), Some("how are you?"));
        assert_eq!(
            form.get("system_prompt").map(String::as_str),
            Some("Be kind\nalways")
        );
    }

    #[test]
    fn key_without_value_is_empty() {
        let form = parse("message&x=1&");
        assert_eq!(form.get("message").map(String::as_str), Some(""));
        assert_eq!(form.len(), 2);
    }

    #[test]
    fn literal_plus_survives_when_escaped() {
        assert_eq!(decode_component("1%2B1"), "1+1");
    }

    #[test]
    fn utf8_is_decoded() {
        assert_eq!(decode_component("%E0%B2%A8%E0%B2%AE%E0%B2%B8%E0%B3%8D%E0%B2%95%E0%B2%BE%E0%B2%B0"), "ನಮಸ್ಕಾರ");
    }
}
