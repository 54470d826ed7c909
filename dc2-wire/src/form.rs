//! Dotted-index form decoding (`spec.md` §6, §9 open question resolved in
//! favor of the dotted-path decoder uniformly — no legacy suffix decoder).

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormError {
    #[error("InvalidForm: malformed parameter '{0}'")]
    InvalidForm(String),
    #[error("InvalidForm: non-contiguous list indices for '{0}'")]
    NonContiguousIndices(String),
    #[error("MissingParameter: required parameter '{0}' not supplied")]
    MissingParameter(String),
    #[error("InvalidParameterValue: '{0}' could not be parsed")]
    BadValue(String),
}

/// A flat view over a decoded `application/x-www-form-urlencoded` body.
/// Every accessor operates directly on the raw key strings so dotted-index
/// list access nests for free: `Filter.1.Value.2` is just another key.
#[derive(Debug, Clone, Default)]
pub struct FormParams {
    raw: BTreeMap<String, String>,
}

impl FormParams {
    pub fn decode(body: &str) -> Result<Self, FormError> {
        let mut raw = BTreeMap::new();
        for pair in body.split('&').filter(|s| !s.is_empty()) {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or_default();
            let key = urlencoding_decode(key).map_err(|_| FormError::InvalidForm(key.to_string()))?;
            let value = urlencoding_decode(value).map_err(|_| FormError::InvalidForm(key.clone()))?;
            raw.insert(key, value);
        }
        Ok(Self { raw })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.raw.get(key).map(String::as_str)
    }

    pub fn get_required(&self, key: &str) -> Result<&str, FormError> {
        self.get(key).ok_or_else(|| FormError::MissingParameter(key.to_string()))
    }

    pub fn parse_opt<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, FormError> {
        match self.get(key) {
            Some(v) => Ok(Some(v.parse().map_err(|_| FormError::BadValue(key.to_string()))?)),
            None => Ok(None),
        }
    }

    pub fn parse_required<T: std::str::FromStr>(&self, key: &str) -> Result<T, FormError> {
        self.get_required(key)?.parse().map_err(|_| FormError::BadValue(key.to_string()))
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, FormError> {
        Ok(self.parse_opt::<bool>(key)?.unwrap_or(default))
    }

    /// Finds every index `n` appearing as `prefix.n` or `prefix.n.*`,
    /// verifying indices are 1-based and contiguous (gaps or a zero/negative
    /// index are `InvalidForm`).
    pub fn list_indices(&self, prefix: &str) -> Result<Vec<u32>, FormError> {
        let dotted = format!("{prefix}.");
        let mut indices = BTreeSet::new();
        for key in self.raw.keys() {
            if let Some(rest) = key.strip_prefix(&dotted) {
                let idx_str = rest.split('.').next().unwrap_or(rest);
                let n: i64 = idx_str
                    .parse()
                    .map_err(|_| FormError::InvalidForm(key.clone()))?;
                if n <= 0 {
                    return Err(FormError::InvalidForm(key.clone()));
                }
                indices.insert(n as u32);
            }
        }
        let indices: Vec<u32> = indices.into_iter().collect();
        for (i, n) in indices.iter().enumerate() {
            if *n != (i as u32 + 1) {
                return Err(FormError::NonContiguousIndices(prefix.to_string()));
            }
        }
        Ok(indices)
    }

    /// Reads `prefix.n` (a scalar list entry, e.g. `InstanceId.2`).
    pub fn scalar_list(&self, prefix: &str) -> Result<Vec<String>, FormError> {
        self.list_indices(prefix)?
            .into_iter()
            .map(|n| {
                self.get_required(&format!("{prefix}.{n}")).map(str::to_string)
            })
            .collect()
    }

    pub fn nested(&self, prefix: &str, index: u32, suffix: &str) -> Option<&str> {
        self.get(&format!("{prefix}.{index}.{suffix}"))
    }
}

/// Minimal percent-decoding + `+`-as-space, matching
/// `application/x-www-form-urlencoded`. Avoids pulling in a second crate
/// purely for this.
fn urlencoding_decode(s: &str) -> Result<String, ()> {
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut raw = Vec::with_capacity(s.len());
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                raw.push(b' ');
                i += 1;
            }
            b'%' => {
                if i + 2 >= bytes.len() {
                    return Err(());
                }
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).map_err(|_| ())?;
                let byte = u8::from_str_radix(hex, 16).map_err(|_| ())?;
                raw.push(byte);
                i += 3;
            }
            b => {
                raw.push(b);
                i += 1;
            }
        }
    }
    out.push_str(&String::from_utf8(raw).map_err(|_| ())?);
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct WireFilter {
    pub name: String,
    pub values: Vec<String>,
}

impl FormParams {
    /// Decodes `{Prefix}.n.Name` / `{Prefix}.n.Value.m` filter groups.
    pub fn filters(&self, prefix: &str) -> Result<Vec<WireFilter>, FormError> {
        self.list_indices(prefix)?
            .into_iter()
            .map(|n| {
                let name = self
                    .nested(prefix, n, "Name")
                    .ok_or_else(|| FormError::MissingParameter(format!("{prefix}.{n}.Name")))?
                    .to_string();
                let value_prefix = format!("{prefix}.{n}.Value");
                let values = self.scalar_list(&value_prefix)?;
                Ok(WireFilter { name, values })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_percent_and_plus() {
        let form = FormParams::decode("Action=RunInstances&ImageId=ami-1%2F2&Name=a+b").unwrap();
        assert_eq!(form.get("ImageId"), Some("ami-1/2"));
        assert_eq!(form.get("Name"), Some("a b"));
    }

    #[test]
    fn contiguous_filter_list_decodes() {
        let form = FormParams::decode(
            "Filter.1.Name=tag%3Afoo&Filter.1.Value.1=bar&Filter.1.Value.2=baz",
        )
        .unwrap();
        let filters = form.filters("Filter").unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].name, "tag:foo");
        assert_eq!(filters[0].values, vec!["bar", "baz"]);
    }

    #[test]
    fn non_contiguous_indices_are_invalid_form() {
        let form = FormParams::decode("Filter.1.Name=a&Filter.3.Name=b").unwrap();
        assert_eq!(
            form.filters("Filter"),
            Err(FormError::NonContiguousIndices("Filter".to_string()))
        );
    }

    #[test]
    fn zero_index_is_invalid_form() {
        let form = FormParams::decode("InstanceId.0=i-1").unwrap();
        assert!(matches!(form.scalar_list("InstanceId"), Err(FormError::InvalidForm(_))));
    }
}
