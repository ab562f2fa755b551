use std::str::FromStr;

use crate::error::{GatewayError, GatewayResult};

/// Parsed query string: ordered name/value pairs. Flag-style items
/// (`?embed`) carry an empty value.
#[derive(Debug, Default)]
pub struct Query {
    items: Vec<(String, String)>,
}

impl Query {
    pub fn parse(query: Option<&str>) -> Self {
        let mut items = Vec::new();
        for pair in query.unwrap_or("").split('&') {
            if pair.is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((name, value)) => items.push((name.to_string(), value.to_string())),
                None => items.push((pair.to_string(), String::new())),
            }
        }
        Self { items }
    }

    pub fn has_item(&self, name: &str) -> bool {
        self.items.iter().any(|(n, _)| n == name)
    }

    pub fn item_value(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse the named item, falling back to `default` when absent.
    /// A present but malformed value is a validation failure.
    pub fn get_arg<T: FromStr>(&self, name: &str, default: T) -> GatewayResult<T> {
        match self.item_value(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                GatewayError::Validation(format!("malformed query value '{name}': {raw}"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_and_flags() {
        let q = Query::parse(Some("offset=16&embed&size=0"));
        assert_eq!(q.item_value("offset"), Some("16"));
        assert!(q.has_item("embed"));
        assert!(!q.has_item("commit"));
        assert_eq!(q.item_value("embed"), Some(""));
    }

    #[test]
    fn get_arg_defaults_when_absent() {
        let q = Query::parse(None);
        assert_eq!(q.get_arg("offset", 0u64).unwrap(), 0);
    }

    #[test]
    fn get_arg_rejects_malformed_values() {
        let q = Query::parse(Some("offset=banana"));
        assert!(matches!(
            q.get_arg("offset", 0u64),
            Err(GatewayError::Validation(_))
        ));
    }
}
