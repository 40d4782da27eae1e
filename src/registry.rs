//! Authoritative name to command map.
//!
//! Every successful mutation is published, in order, to each subscriber's
//! private queue. The namespace tree and the completion index are kept up to
//! date this way; they never read the registry map directly.

use crate::command::{CommandDescriptor, CommandRef};
use crate::path::NamePath;
use log::{debug, info};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_+\-][A-Za-z0-9_.+\-:@,]*$").expect("valid segment regex")
});

/// Registry misuse. These point at configuration bugs and are reported at
/// registration time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("command already registered: {0}")]
    DuplicateCommand(String),
    #[error("no such command: {0}")]
    NoSuchCommand(String),
    #[error("invalid command name: {0:?}")]
    InvalidName(String),
    /// The name would nest under a command, or collide with a group that
    /// already holds other commands.
    #[error("{name} conflicts with registered command {existing}")]
    PathConflict { name: String, existing: String },
}

/// Change notification published by the registry.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    CommandRegistered(CommandRef),
    CommandRemoved(NamePath),
}

/// Receiving end of one subscriber's event queue.
#[derive(Debug)]
pub struct Subscription {
    rx: Receiver<RegistryEvent>,
}

impl Subscription {
    /// Next pending event, without blocking.
    pub fn try_next(&self) -> Option<RegistryEvent> {
        self.rx.try_recv().ok()
    }
}

#[derive(Default)]
struct RegistryState {
    commands: BTreeMap<String, CommandRef>,
    subscribers: Vec<Sender<RegistryEvent>>,
}

impl RegistryState {
    fn publish(&mut self, event: RegistryEvent) {
        // Dropped subscribers are pruned here.
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Process-wide command registry. Cheap to share behind an `Arc`.
#[derive(Default)]
pub struct CommandRegistry {
    state: Mutex<RegistryState>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a command under its descriptor name.
    ///
    /// The map update and the event publication happen under one lock, so
    /// subscribers see events in exactly the order mutations happened.
    pub fn register(&self, descriptor: CommandDescriptor) -> Result<CommandRef, RegistryError> {
        let path = descriptor.name().clone();
        let key = path.to_string();
        validate(&path)?;

        let mut state = self.lock();
        if state.commands.contains_key(&key) {
            return Err(RegistryError::DuplicateCommand(key));
        }
        if let Some(existing) = conflicting(&state.commands, &path) {
            return Err(RegistryError::PathConflict {
                name: key,
                existing,
            });
        }

        let descriptor = Arc::new(descriptor);
        state.commands.insert(key.clone(), descriptor.clone());
        state.publish(RegistryEvent::CommandRegistered(descriptor.clone()));
        info!("registered command {key}");
        Ok(descriptor)
    }

    pub fn unregister(&self, name: &str) -> Result<CommandRef, RegistryError> {
        let key = canonical(name).ok_or_else(|| RegistryError::NoSuchCommand(name.to_string()))?;

        let mut state = self.lock();
        let removed = state
            .commands
            .remove(&key)
            .ok_or_else(|| RegistryError::NoSuchCommand(key.clone()))?;
        state.publish(RegistryEvent::CommandRemoved(removed.name().clone()));
        info!("unregistered command {key}");
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Option<CommandRef> {
        let key = canonical(name)?;
        self.lock().commands.get(&key).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Snapshot of every registered command, sorted by path.
    pub fn all(&self) -> Vec<CommandRef> {
        self.lock().commands.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a new event queue.
    ///
    /// The queue starts with one `CommandRegistered` per existing command,
    /// so a late subscriber converges to the same state as an early one.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let mut state = self.lock();
        for descriptor in state.commands.values() {
            // rx is alive, send cannot fail
            let _ = tx.send(RegistryEvent::CommandRegistered(descriptor.clone()));
        }
        state.subscribers.push(tx);
        debug!("new registry subscriber, {} live", state.subscribers.len());
        Subscription { rx }
    }
}

/// Absolute, normalized map key for `name`.
fn canonical(name: &str) -> Option<String> {
    let path = NamePath::parse(name).ok()?;
    Some(NamePath::root().join(&path).normalize().to_string())
}

fn validate(path: &NamePath) -> Result<(), RegistryError> {
    if path.is_empty() || !path.segments().iter().all(|s| is_valid_segment(s)) {
        return Err(RegistryError::InvalidName(path.to_string()));
    }
    Ok(())
}

/// Whether `segment` may be used as a command or group name.
pub fn is_valid_segment(segment: &str) -> bool {
    SEGMENT.is_match(segment)
}

/// Find a registered command that would clash with `path` in the tree.
fn conflicting(commands: &BTreeMap<String, CommandRef>, path: &NamePath) -> Option<String> {
    let mut prefix = NamePath::root();
    for segment in &path.segments()[..path.len().saturating_sub(1)] {
        prefix = prefix.child(segment.as_str());
        let key = prefix.to_string();
        if commands.contains_key(&key) {
            return Some(key);
        }
    }

    let group_prefix = format!("{path}/");
    commands
        .range(group_prefix.clone()..)
        .next()
        .filter(|(k, _)| k.starts_with(&group_prefix))
        .map(|(k, _)| k.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, ExecContext};
    use crate::value::Value;

    struct Noop;

    impl Command for Noop {
        fn execute(&mut self, _ctx: &mut ExecContext<'_>) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }
    }

    fn desc(name: &str) -> CommandDescriptor {
        CommandDescriptor::new(name, || Box::new(Noop))
    }

    fn drain(sub: &Subscription) -> Vec<String> {
        std::iter::from_fn(|| sub.try_next())
            .map(|e| match e {
                RegistryEvent::CommandRegistered(d) => format!("+{}", d.name()),
                RegistryEvent::CommandRemoved(p) => format!("-{p}"),
            })
            .collect()
    }

    #[test]
    fn test_register_get_unregister() {
        let registry = CommandRegistry::new();
        assert!(registry.is_empty());
        registry.register(desc("/tool/build")).unwrap();
        assert!(registry.contains("/tool/build"));
        assert!(registry.contains("tool/build"));
        assert_eq!(registry.get("/tool/build").unwrap().simple_name(), "build");

        registry.unregister("/tool/build").unwrap();
        assert!(!registry.contains("/tool/build"));
        assert_eq!(
            registry.unregister("/tool/build").unwrap_err(),
            RegistryError::NoSuchCommand("/tool/build".to_string())
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = CommandRegistry::new();
        registry.register(desc("/a")).unwrap();
        assert_eq!(
            registry.register(desc("/a")).unwrap_err(),
            RegistryError::DuplicateCommand("/a".to_string())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_path_conflicts_rejected() {
        let registry = CommandRegistry::new();
        registry.register(desc("/a")).unwrap();
        assert!(matches!(
            registry.register(desc("/a/b")),
            Err(RegistryError::PathConflict { .. })
        ));

        registry.register(desc("/g/x")).unwrap();
        assert_eq!(
            registry.register(desc("/g")).unwrap_err(),
            RegistryError::PathConflict {
                name: "/g".to_string(),
                existing: "/g/x".to_string()
            }
        );
        // A sibling sharing a textual prefix is fine.
        registry.register(desc("/gx")).unwrap();
    }

    #[test]
    fn test_invalid_names_rejected() {
        let registry = CommandRegistry::new();
        for bad in ["", "/", "/a b", "/../x", "/$x"] {
            assert!(
                matches!(registry.register(desc(bad)), Err(RegistryError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_events_published_in_order() {
        let registry = CommandRegistry::new();
        let sub = registry.subscribe();
        registry.register(desc("/a")).unwrap();
        registry.register(desc("/b")).unwrap();
        registry.unregister("/a").unwrap();
        let _ = registry.register(desc("/b"));
        assert_eq!(drain(&sub), ["+/a", "+/b", "-/a"]);
    }

    #[test]
    fn test_late_subscriber_gets_replay() {
        let registry = CommandRegistry::new();
        registry.register(desc("/x/one")).unwrap();
        registry.register(desc("/two")).unwrap();
        let sub = registry.subscribe();
        assert_eq!(drain(&sub), ["+/two", "+/x/one"]);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let registry = CommandRegistry::new();
        drop(registry.subscribe());
        registry.register(desc("/a")).unwrap();
        assert!(registry.lock().subscribers.is_empty());
    }
}
