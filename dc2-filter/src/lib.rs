//! Filter grammar evaluation and opaque-cursor pagination.
//!
//! Both engines are resource-kind agnostic: callers supply a tag map and an
//! attribute lookup closure (for filtering) or an already-sorted slice (for
//! pagination), keeping per-resource-kind knowledge (which attribute names
//! exist, what order is "natural") in `dc2-engine` rather than here.

use std::collections::BTreeMap;

use base64::Engine as _;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("InvalidParameterValue: unknown filter name '{0}'")]
    UnknownFilterName(String),
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

enum FilterKind<'a> {
    Tag(&'a str),
    TagKey,
    Attribute(&'a str),
}

fn classify(name: &str) -> FilterKind<'_> {
    if let Some(key) = name.strip_prefix("tag:") {
        FilterKind::Tag(key)
    } else if name == "tag-key" {
        FilterKind::TagKey
    } else {
        FilterKind::Attribute(name)
    }
}

/// Evaluates a single filter against a resource's tags and its named
/// attributes. `attribute_lookup` returns `None` when `name` is not a
/// supported attribute-filter name for this resource kind (an error);
/// `Some(vec![])` when the name is supported but the resource has no value
/// for it (never matches).
pub fn filter_matches(
    filter: &Filter,
    tags: &BTreeMap<String, String>,
    attribute_lookup: impl Fn(&str) -> Option<Vec<String>>,
) -> Result<bool, FilterError> {
    match classify(&filter.name) {
        FilterKind::Tag(key) => Ok(tags
            .get(key)
            .is_some_and(|v| filter.values.iter().any(|want| want == v))),
        FilterKind::TagKey => Ok(filter.values.iter().any(|want| tags.contains_key(want))),
        FilterKind::Attribute(name) => {
            let values = attribute_lookup(name)
                .ok_or_else(|| FilterError::UnknownFilterName(filter.name.clone()))?;
            Ok(values.iter().any(|v| filter.values.iter().any(|want| want == v)))
        }
    }
}

/// Resources match iff every filter matches (conjunction of filters, each a
/// disjunction across its values).
pub fn all_filters_match(
    filters: &[Filter],
    tags: &BTreeMap<String, String>,
    attribute_lookup: impl Fn(&str) -> Option<Vec<String>>,
) -> Result<bool, FilterError> {
    for filter in filters {
        if !filter_matches(filter, tags, &attribute_lookup)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("InvalidParameterValue: malformed NextToken")]
    InvalidToken,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

const TOKEN_SALT: u8 = 0xa5;

fn encode_token(offset: u64) -> String {
    let bytes = offset.to_be_bytes();
    let checksum = bytes.iter().fold(TOKEN_SALT, |acc, b| acc ^ b);
    let mut buf = Vec::with_capacity(9);
    buf.extend_from_slice(&bytes);
    buf.push(checksum);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

fn decode_token(token: &str) -> Result<u64, PaginationError> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| PaginationError::InvalidToken)?;
    if bytes.len() != 9 {
        return Err(PaginationError::InvalidToken);
    }
    let (offset_bytes, checksum) = bytes.split_at(8);
    let expected = offset_bytes.iter().fold(TOKEN_SALT, |acc, b| acc ^ b);
    if checksum[0] != expected {
        return Err(PaginationError::InvalidToken);
    }
    Ok(u64::from_be_bytes(offset_bytes.try_into().unwrap()))
}

/// Pages through a pre-sorted slice. `max_results == 0` is legal: it
/// returns an empty page whose `next_token`, if any, still points at the
/// first unread item.
pub fn paginate<T: Clone>(
    sorted: &[T],
    max_results: usize,
    next_token: Option<&str>,
) -> Result<Page<T>, PaginationError> {
    let offset = match next_token {
        Some(t) => decode_token(t)? as usize,
        None => 0,
    };
    if offset > sorted.len() {
        return Err(PaginationError::InvalidToken);
    }
    let end = (offset + max_results).min(sorted.len());
    let items = sorted[offset..end].to_vec();
    let next_token = if end < sorted.len() {
        Some(encode_token(end as u64))
    } else {
        None
    };
    Ok(Page { items, next_token })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn tag_filter_matches_exact_value() {
        let t = tags(&[("foo", "bar")]);
        let f = Filter { name: "tag:foo".into(), values: vec!["bar".into()] };
        assert!(filter_matches(&f, &t, |_| None).unwrap());
        let f2 = Filter { name: "tag:foo".into(), values: vec!["baz".into()] };
        assert!(!filter_matches(&f2, &t, |_| None).unwrap());
    }

    #[test]
    fn tag_key_filter_matches_presence() {
        let t = tags(&[("foo", "bar")]);
        let f = Filter { name: "tag-key".into(), values: vec!["foo".into()] };
        assert!(filter_matches(&f, &t, |_| None).unwrap());
    }

    #[test]
    fn unknown_attribute_name_errors() {
        let t = tags(&[]);
        let f = Filter { name: "nonsense".into(), values: vec!["x".into()] };
        assert_eq!(
            filter_matches(&f, &t, |_| None),
            Err(FilterError::UnknownFilterName("nonsense".into()))
        );
    }

    #[test]
    fn pagination_round_trips_full_set() {
        let items: Vec<i32> = (0..10).collect();
        let mut seen = Vec::new();
        let mut token = None;
        loop {
            let page = paginate(&items, 3, token.as_deref()).unwrap();
            seen.extend(page.items.iter().copied());
            match page.next_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        assert_eq!(seen, items);
    }

    #[test]
    fn zero_max_results_returns_empty_page_with_token() {
        let items = vec!["a", "b"];
        let page = paginate(&items, 0, None).unwrap();
        assert!(page.items.is_empty());
        let token = page.next_token.expect("token present on non-empty store");
        let next = paginate(&items, 10, Some(&token)).unwrap();
        assert_eq!(next.items, vec!["a", "b"]);
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert_eq!(
            paginate(&[1, 2, 3], 1, Some("not-a-token")),
            Err(PaginationError::InvalidToken)
        );
    }
}
