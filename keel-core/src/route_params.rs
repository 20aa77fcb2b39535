//! Route parameter storage
//!
//! Parameters are kept in match order inside a `SmallVec`, so typical
//! routes (up to eight parameters) never touch the heap for the list
//! itself. Values are already percent-decoded.

use smallvec::SmallVec;
use std::collections::HashMap;

/// Parameters stored inline before spilling to the heap.
pub const INLINE_PARAM_COUNT: usize = 8;

/// Name under which a trailing `*` wildcard stores its capture.
pub const WILDCARD_PARAM: &str = "*";

/// Named parameter values extracted from a path (and host).
///
/// Equality ignores order, so parameters built by hand compare equal to the
/// ones a match produced.
#[derive(Debug, Clone, Default)]
pub struct Params {
    params: SmallVec<[(String, String); INLINE_PARAM_COUNT]>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing an existing value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get a parameter and parse it, e.g. `params.get_parsed::<u64>("id")`.
    #[inline]
    pub fn get_parsed<T: std::str::FromStr>(&self, name: &str) -> Option<Result<T, T::Err>> {
        self.get(name).map(|value| value.parse())
    }

    /// The `*` capture, if the route has a wildcard.
    #[inline]
    pub fn wildcard(&self) -> Option<&str> {
        self.get(WILDCARD_PARAM)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn to_hash_map(&self) -> HashMap<String, String> {
        self.params.iter().cloned().collect()
    }
}

impl PartialEq for Params {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(n, v)| other.get(n) == Some(v))
    }
}

impl Eq for Params {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}
