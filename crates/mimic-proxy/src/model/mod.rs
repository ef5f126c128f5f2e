//! HTTP request/response model.
//!
//! These are plain values decoupled from any web framework. The intake
//! adapter in `server` converts hyper types into them; everything else in the
//! crate works on these types only.

mod body;
mod request;
mod response;

pub use body::Body;
pub use request::HttpRequest;
pub use response::HttpResponse;

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Ordered multi-valued map used for headers and query parameters.
pub type Multimap = BTreeMap<String, Vec<String>>;

/// Case-insensitive lookup of all values stored under `name`.
pub fn multimap_get<'a>(map: &'a Multimap, name: &str) -> Option<&'a [String]> {
    map.iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, values)| values.as_slice())
}

/// Deserialize a multimap whose values may be either a single string or an
/// array of strings: `{"Accept": "text/plain"}` and
/// `{"Accept": ["text/plain"]}` are equivalent.
pub(crate) fn deserialize_multimap<'de, D>(deserializer: D) -> Result<Multimap, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let raw = BTreeMap::<String, OneOrMany>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| match value {
            OneOrMany::One(v) => (key, vec![v]),
            OneOrMany::Many(vs) => (key, vs),
        })
        .collect())
}

/// Deserialize a status code from either a number or a string.
pub(crate) fn deserialize_status_code<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| D::Error::custom("invalid status code number")),
        serde_json::Value::String(s) => s
            .parse::<u16>()
            .map_err(|_| D::Error::custom(format!("invalid status code string: {s}"))),
        _ => Err(D::Error::custom("statusCode must be a number or string")),
    }
}

pub(crate) fn default_status_code() -> u16 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multimap_get_is_case_insensitive() {
        let mut map = Multimap::new();
        map.insert("Content-Type".to_string(), vec!["text/plain".to_string()]);
        assert_eq!(
            multimap_get(&map, "content-type"),
            Some(&["text/plain".to_string()][..])
        );
        assert!(multimap_get(&map, "accept").is_none());
    }

    #[test]
    fn test_multimap_accepts_single_and_many_values() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(deserialize_with = "deserialize_multimap")]
            headers: Multimap,
        }

        let wrapper: Wrapper =
            serde_json::from_str(r#"{"headers": {"a": "1", "b": ["2", "3"]}}"#).unwrap();
        assert_eq!(wrapper.headers["a"], vec!["1"]);
        assert_eq!(wrapper.headers["b"], vec!["2", "3"]);
    }
}
