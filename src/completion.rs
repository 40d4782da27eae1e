//! Name-completion index fed by registry events.

use crate::registry::{CommandRegistry, RegistryEvent, Subscription};
use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError, RwLock};

/// Sorted set of registered command paths, answering prefix queries.
pub struct CompletionIndex {
    paths: RwLock<BTreeSet<String>>,
    events: Mutex<Subscription>,
}

impl CompletionIndex {
    pub fn attach(registry: &CommandRegistry) -> Self {
        Self {
            paths: RwLock::new(BTreeSet::new()),
            events: Mutex::new(registry.subscribe()),
        }
    }

    fn sync(&self) {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let mut paths = self.paths.write().unwrap_or_else(PoisonError::into_inner);
        while let Some(event) = events.try_next() {
            match event {
                RegistryEvent::CommandRegistered(d) => {
                    paths.insert(d.name().to_string());
                }
                RegistryEvent::CommandRemoved(p) => {
                    paths.remove(&p.to_string());
                }
            }
        }
    }

    /// Simple names and full paths starting with `prefix`, sorted, without
    /// duplicates.
    pub fn complete(&self, prefix: &str) -> Vec<String> {
        self.sync();
        let paths = self.paths.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = BTreeSet::new();
        for path in paths.iter() {
            if path.starts_with(prefix) {
                out.insert(path.clone());
            }
            let simple = path.rsplit('/').next().unwrap_or(path);
            if simple.starts_with(prefix) {
                out.insert(simple.to_string());
            }
        }
        out.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandDescriptor, ExecContext};
    use crate::value::Value;

    struct Noop;

    impl Command for Noop {
        fn execute(&mut self, _ctx: &mut ExecContext<'_>) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_complete_tracks_registry() {
        let registry = CommandRegistry::new();
        let index = CompletionIndex::attach(&registry);
        for name in ["/tool/build", "/tool/bench", "/echo"] {
            registry
                .register(CommandDescriptor::new(name, || Box::new(Noop)))
                .unwrap();
        }
        assert_eq!(index.complete("b"), ["bench", "build"]);
        assert_eq!(index.complete("/t"), ["/tool/bench", "/tool/build"]);

        registry.unregister("/tool/bench").unwrap();
        assert_eq!(index.complete("b"), ["build"]);
        assert!(index.complete("zzz").is_empty());
    }
}
