//! Allow/skip gate over builder names.
//!
//! Configured once from the command line and consulted before every
//! builder runs. Allow and skip lists are mutually exclusive; whichever was
//! configured last is the one in force.

use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum Mode {
    #[default]
    All,
    Allow(BTreeSet<String>),
    Skip(BTreeSet<String>),
    Nothing,
}

/// Decides which named builders execute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuilderRegistry {
    mode: Mode,
}

impl BuilderRegistry {
    /// A registry that builds everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build only `names`. Replaces any previous configuration.
    pub fn add_builds<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mode = Mode::Allow(names.into_iter().map(Into::into).collect());
    }

    /// Build everything except `names`. Replaces any previous configuration.
    pub fn add_skips<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mode = Mode::Skip(names.into_iter().map(Into::into).collect());
    }

    /// Build nothing. Used when only packaging is requested.
    pub fn skip_all(&mut self) {
        self.mode = Mode::Nothing;
    }

    pub fn should_build(&self, name: &str) -> bool {
        match &self.mode {
            Mode::All => true,
            Mode::Allow(names) => names.contains(name),
            Mode::Skip(names) => !names.contains(name),
            Mode::Nothing => false,
        }
    }
}
