use anyhow::{Result, bail};

/// Ordered `key -> values` list parsed from `k=v1,v2;k2=v3`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Vec<(String, Vec<String>)>,
}

impl Properties {
    /// Parse `k=v1,v2;k2=v3`. Empty segments are ignored; a repeated key extends its values.
    pub fn parse(s: &str) -> Result<Self> {
        let mut props = Self::default();
        for segment in s.split(';').map(str::trim).filter(|seg| !seg.is_empty()) {
            let Some((key, values)) = segment.split_once('=') else {
                bail!("invalid property '{}': expected key=value", segment);
            };
            let key = key.trim();
            if key.is_empty() {
                bail!("invalid property '{}': empty key", segment);
            }
            let values = values.split(',').map(|v| v.trim().to_string());
            props.add(key, values);
        }
        Ok(props)
    }

    pub fn add(&mut self, key: &str, values: impl IntoIterator<Item = String>) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => existing.extend(values),
            None => self.entries.push((key.to_string(), values.into_iter().collect())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `k=v1,v2;k2=v3` with every key and value query-escaped.
    pub fn to_encoded_string(&self) -> String {
        self.entries
            .iter()
            .map(|(key, values)| {
                let values: Vec<String> = values.iter().map(|v| query_escape(v)).collect();
                format!("{}={}", query_escape(key), values.join(","))
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Query-escape each comma-separated key of `keys` and join them back with `,`.
pub fn encode_delete_keys(keys: &str) -> String {
    keys.split(',')
        .map(query_escape)
        .collect::<Vec<_>>()
        .join(",")
}

/// Form-style escaping: unreserved bytes pass, space becomes `+`, everything else `%XX`.
pub fn query_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
