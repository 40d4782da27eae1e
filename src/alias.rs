use std::collections::BTreeMap;
use thiserror::Error;

/// Raised by [`AliasTable::undefine`] for unknown names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no such alias: {0}")]
pub struct NoSuchAlias(pub String);

/// Name to replacement-text map consulted before the namespace tree.
///
/// Replacement text is opaque shell syntax; it is only checked when an
/// expansion is parsed.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: BTreeMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite an alias.
    pub fn define(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(name.into(), text.into());
    }

    pub fn undefine(&mut self, name: &str) -> Result<String, NoSuchAlias> {
        self.entries
            .remove(name)
            .ok_or_else(|| NoSuchAlias(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Aliases in name order.
    pub fn list(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_overwrite_and_lookup() {
        let mut aliases = AliasTable::new();
        aliases.define("ll", "ls -l");
        assert_eq!(aliases.lookup("ll"), Some("ls -l"));
        aliases.define("ll", "ls -la");
        assert_eq!(aliases.lookup("ll"), Some("ls -la"));
        assert_eq!(aliases.len(), 1);
    }

    #[test]
    fn test_undefine_missing_fails() {
        let mut aliases = AliasTable::new();
        assert_eq!(aliases.undefine("nope"), Err(NoSuchAlias("nope".to_string())));
        aliases.define("x", "echo x");
        assert_eq!(aliases.undefine("x"), Ok("echo x".to_string()));
        assert!(aliases.is_empty());
    }

    #[test]
    fn test_list_is_sorted() {
        let mut aliases = AliasTable::new();
        aliases.define("zz", "1");
        aliases.define("aa", "2");
        aliases.define("mm", "3");
        let names: Vec<&str> = aliases.list().map(|(k, _)| k).collect();
        assert_eq!(names, ["aa", "mm", "zz"]);
    }

    #[test]
    fn test_text_is_not_validated() {
        let mut aliases = AliasTable::new();
        aliases.define("broken", "echo \"unterminated");
        assert_eq!(aliases.lookup("broken"), Some("echo \"unterminated"));
    }
}
