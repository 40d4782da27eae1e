use crate::path::NamePath;
use std::collections::HashMap;
use std::env as stdenv;

/// Session variable holding the current group.
pub const GROUP_VAR: &str = "GROUP";
/// Session variable holding the `:`-separated search path.
pub const SEARCH_PATH_VAR: &str = "SEARCH_PATH";

const DEFAULT_SEARCH_PATH: &str = ".:/";

/// Session variables of one interpreter.
///
/// Besides free-form variables used by substitution, two well-known keys
/// drive name resolution:
/// - [`GROUP_VAR`]: the current group, defaults to `/`;
/// - [`SEARCH_PATH_VAR`]: where bare names are looked up, relative to the
///   current group, defaults to `.:/` (current group, then root).
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// An empty environment with default resolution settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the variables of the current process.
    ///
    /// The resolution keys are skipped so that a stray `GROUP` in the
    /// process environment does not move the session.
    pub fn inherit() -> Self {
        let vars = stdenv::vars()
            .filter(|(k, _)| k != GROUP_VAR && k != SEARCH_PATH_VAR)
            .collect();
        Self { vars }
    }

    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override a variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    pub fn remove_var(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    /// All variables, sorted by name.
    pub fn vars(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<_> = self
            .vars
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        out.sort();
        out
    }

    /// The current group as an absolute, normalized path.
    ///
    /// An unparsable value falls back to the root.
    pub fn current_group(&self) -> NamePath {
        self.get_var(GROUP_VAR)
            .and_then(|text| NamePath::parse(text).ok())
            .map(|p| NamePath::root().join(&p).normalize())
            .unwrap_or_else(NamePath::root)
    }

    pub fn set_current_group(&mut self, group: &NamePath) {
        self.set_var(GROUP_VAR, group.to_string());
    }

    /// Search path entries in lookup order. Empty entries are ignored.
    pub fn search_path(&self) -> Vec<NamePath> {
        self.get_var(SEARCH_PATH_VAR)
            .unwrap_or(DEFAULT_SEARCH_PATH)
            .split(':')
            .filter_map(|entry| NamePath::parse(entry).ok())
            .collect()
    }

    pub fn set_search_path(&mut self, entries: &[NamePath]) {
        let joined = entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(":");
        self.set_var(SEARCH_PATH_VAR, joined);
    }
}
