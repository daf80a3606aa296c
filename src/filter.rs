use itertools::Itertools;

use std::fmt;

use crate::error::{Error, Result};
use crate::model::Tags;

/// Prefix of an accepted value which matches any value of the primary key.
pub const WILDCARD_PREFIX: &str = "ALL_";

/// Separator of multiple values in a single OSM tag value.
pub const VALUE_SEPARATOR: char = ';';

/// Predicate selecting entities by a primary tag key and a set of accepted values.
///
/// The filter holds no mutable state and is shared by reference between
/// workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    key: String,
    values: Vec<String>,
    wildcard: bool,
}

impl TagFilter {
    /// Creates a filter for `key` accepting any of `values`.
    ///
    /// Empty values are ignored and duplicates are removed, keeping the order
    /// of first occurrence. At least one value must remain.
    pub fn new<K, I, V>(key: K, values: I) -> Result<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::InvalidFilter("primary key must not be empty".into()));
        }
        let values: Vec<String> = values
            .into_iter()
            .map(Into::into)
            .filter(|v: &String| !v.is_empty())
            .unique()
            .collect();
        if values.is_empty() {
            return Err(Error::InvalidFilter(format!(
                "no accepted values given for key {:?}",
                key
            )));
        }
        let wildcard = values.iter().any(|v| is_wildcard(v));
        Ok(Self {
            key,
            values,
            wildcard,
        })
    }

    /// Creates a filter matching every entity which has the tag `key`.
    pub fn any_value<K: Into<String>>(key: K) -> Result<Self> {
        let key = key.into();
        let wildcard = format!("{}{}", WILDCARD_PREFIX, key);
        Self::new(key, Some(wildcard))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Checks whether an entity with the given tags is selected by this filter.
    pub fn matches(&self, tags: &Tags) -> bool {
        match tags.get(&self.key) {
            None => false,
            Some(_) if self.wildcard => true,
            Some(value) => self.values.iter().any(|v| tag_value_matches(value, v)),
        }
    }

    /// Yields every accepted value that the given tags match.
    ///
    /// A wildcard value matches as soon as the primary key is present.
    pub fn matching_values(&self, tags: &Tags) -> Vec<&str> {
        let value = match tags.get(&self.key) {
            None => return Vec::new(),
            Some(value) => value,
        };
        self.values
            .iter()
            .filter(|accepted| is_wildcard(accepted) || tag_value_matches(value, accepted))
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.wildcard {
            write!(f, "{}=*", self.key)
        } else {
            write!(f, "{}={}", self.key, self.values.iter().join(","))
        }
    }
}

fn is_wildcard(value: &str) -> bool {
    value.starts_with(WILDCARD_PREFIX)
}

/// Checks whether `accepted` is one of the `;`-separated tokens of `value`.
pub fn tag_value_matches(value: &str, accepted: &str) -> bool {
    value
        .split(VALUE_SEPARATOR)
        .any(|token| token.trim() == accepted)
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn tag(key: &str, value: &str) -> Tags {
        tags(&[(key, value)])
    }

    #[test]
    fn test_single_value() {
        let filter = TagFilter::new("power", ["line"]).unwrap();
        assert!(filter.matches(&tags(&[("power", "line")])));
        assert!(!filter.matches(&tags(&[("power", "tower")])));
        assert!(!filter.matches(&tags(&[("building", "line")])));
        assert!(!filter.matches(&Tags::new()));
    }

    #[test]
    fn test_multi_value_tags() {
        let filter = TagFilter::new("power", ["cable"]).unwrap();
        assert!(filter.matches(&tags(&[("power", "line;cable")])));
        assert!(filter.matches(&tags(&[("power", "line; cable")])));
        // no substring matches
        assert!(!filter.matches(&tags(&[("power", "cables")])));
        assert!(!filter.matches(&tags(&[("power", "minor_cable")])));
    }

    #[test]
    fn test_wildcard() {
        let filter = TagFilter::any_value("power").unwrap();
        assert!(filter.is_wildcard());
        assert!(filter.matches(&tags(&[("power", "anything")])));
        assert!(filter.matches(&tags(&[("power", "")])));
        assert!(!filter.matches(&tags(&[("building", "yes")])));
        assert_eq!(filter.to_string(), "power=*");
    }

    #[test]
    fn test_values_are_normalized() {
        let filter = TagFilter::new("power", ["line", "", "cable", "line"]).unwrap();
        assert_eq!(filter.values(), &["line".to_string(), "cable".to_string()]);
        assert_eq!(filter.to_string(), "power=line,cable");
    }

    #[test]
    fn test_invalid_filters() {
        assert!(matches!(
            TagFilter::new("power", Vec::<String>::new()),
            Err(Error::InvalidFilter(_))
        ));
        assert!(matches!(
            TagFilter::new("power", [""]),
            Err(Error::InvalidFilter(_))
        ));
        assert!(matches!(
            TagFilter::new("", ["line"]),
            Err(Error::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_matching_values() {
        let filter = TagFilter::new("power", ["line", "cable", "tower"]).unwrap();
        let cable_line = tag("power", "cable;line");
        let matches = filter.matching_values(&cable_line);
        assert_eq!(matches, vec!["line", "cable"]);

        let filter = TagFilter::new("power", ["ALL_power", "line"]).unwrap();
        let substation = tag("power", "substation");
        let matches = filter.matching_values(&substation);
        assert_eq!(matches, vec!["ALL_power"]);
    }

    proptest! {
        #[test]
        fn wildcard_matches_every_present_key(ref key in "[a-z:_]{1,12}", ref value in ".*")
        {
            let filter = TagFilter::any_value(key.clone()).unwrap();
            let tags = tag(key, value);
            prop_assert!(filter.matches(&tags));
        }

        #[test]
        fn concrete_value_matches_iff_token(
            ref tokens in prop::collection::vec("[a-z_]{1,8}", 1..5),
            ref accepted in "[a-z_]{1,8}",
        ) {
            let value = tokens.join(";");
            let filter = TagFilter::new("power", [accepted.clone()]).unwrap();
            let tags = tag("power", &value);
            prop_assert_eq!(filter.matches(&tags), tokens.contains(accepted));
        }
    }
}
