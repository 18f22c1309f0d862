//! Ordered CMake define sets.
//!
//! Defines keep first-insertion order so generated command lines are
//! reproducible. A key removed by one layer stays removed: later `set` and
//! `extend` calls for it are ignored.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Set(String),
    Removed,
}

/// Insertion-ordered `KEY=VALUE` map with terminal deletions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defines {
    entries: Vec<(String, Slot)>,
}

impl Defines {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Set `key`, keeping its original position if already present.
    ///
    /// # Panics
    ///
    /// If `key` contains `=`, which no `-D` argument could carry.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        assert!(!key.contains('='), "define key contains '=': {key}");
        let value = value.into();
        match self.position(&key) {
            Some(i) => {
                if let Slot::Set(existing) = &mut self.entries[i].1 {
                    *existing = value;
                }
            }
            None => self.entries.push((key, Slot::Set(value))),
        }
    }

    /// Remove `key` for good.
    pub fn remove(&mut self, key: &str) {
        assert!(!key.contains('='), "define key contains '=': {key}");
        match self.position(key) {
            Some(i) => self.entries[i].1 = Slot::Removed,
            None => self.entries.push((key.to_string(), Slot::Removed)),
        }
    }

    /// Set every pair in order.
    pub fn extend<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in pairs {
            self.set(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key).and_then(|i| match &self.entries[i].1 {
            Slot::Set(v) => Some(v.as_str()),
            Slot::Removed => None,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Live entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|(k, slot)| match slot {
            Slot::Set(v) => Some((k.as_str(), v.as_str())),
            Slot::Removed => None,
        })
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `-DKEY=VALUE` arguments, one per live entry.
    pub fn to_args(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("-D{}={}", k, v)).collect()
    }

    /// Split a `-DKEY=VALUE` (or `KEY=VALUE`) argument at the first `=`.
    pub fn parse_arg(arg: &str) -> Option<(&str, &str)> {
        let body = arg.strip_prefix("-D").unwrap_or(arg);
        body.split_once('=')
    }
}

impl fmt::Display for Defines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in self.iter() {
            writeln!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}
