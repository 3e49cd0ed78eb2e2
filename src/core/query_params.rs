use std::borrow::Cow;
use std::collections::HashMap;

/// Decoded query string of a request URI. Repeated keys keep the last value.
#[derive(Debug, Default)]
pub struct QueryParams {
    params: HashMap<String, String>,
}

impl QueryParams {
    pub fn parse(uri: &str) -> Self {
        let mut params = HashMap::new();

        if let Some((_, query)) = uri.split_once('?') {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
                // `+` is a space in form encoding; urlencoding leaves it alone
                let raw = raw.replace('+', " ");
                let value = urlencoding::decode(&raw)
                    .unwrap_or(Cow::Borrowed(raw.as_str()))
                    .into_owned();
                params.insert(key.to_string(), value);
            }
        }

        Self { params }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// 1-based page number, defaulting to the first page.
    pub fn page(&self) -> usize {
        self.get("page")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(1)
            .max(1)
    }
}
