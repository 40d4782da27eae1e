use crate::env::Environment;
use crate::interpreter::Interpreter;
use crate::path::NamePath;
use crate::value::Value;
use anyhow::Result;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use thiserror::Error;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// Outcome of binding arguments onto a fresh command instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Arguments were accepted; the command may run.
    Ready,
    /// The caller asked for usage text instead of running the command.
    Help(String),
}

/// Arguments could not be bound onto a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{command}: {message}")]
pub struct UsageError {
    pub command: String,
    pub message: String,
}

impl UsageError {
    pub fn new(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Request to end the session with `code`.
///
/// Not a failure: the interpreter passes it to its caller untouched and the
/// host's outer loop turns it into a process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("exit requested with status {code}")]
pub struct ExitNotification {
    pub code: ExitCode,
}

/// A working copy of a registered command.
///
/// A fresh instance is created for every invocation, so whatever `bind`
/// stores is private to that invocation.
pub trait Command {
    /// Apply `args` to this instance.
    ///
    /// The default accepts anything and leaves the arguments to be read from
    /// [`ExecContext::args`].
    fn bind(&mut self, args: &[String]) -> Result<Binding, UsageError> {
        let _ = args;
        Ok(Binding::Ready)
    }

    /// Run the command.
    fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<Value>;
}

type Factory = dyn Fn() -> Box<dyn Command> + Send + Sync;

/// Registered template of a command: its name, metadata and a way to build
/// working copies.
pub struct CommandDescriptor {
    name: NamePath,
    description: Option<String>,
    opaque_arguments: bool,
    factory: Box<Factory>,
}

impl CommandDescriptor {
    /// Describe a command living at `name`.
    ///
    /// Relative names are taken relative to the root. An empty name yields
    /// the root path, which the registry rejects.
    pub fn new<F>(name: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Command> + Send + Sync + 'static,
    {
        let name = NamePath::parse(name)
            .map(|p| NamePath::root().join(&p).normalize())
            .unwrap_or_else(|_| NamePath::root());
        Self {
            name,
            description: None,
            opaque_arguments: false,
            factory: Box::new(factory),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Skip argument binding; the command reads its argv verbatim.
    pub fn with_opaque_arguments(mut self) -> Self {
        self.opaque_arguments = true;
        self
    }

    /// Full path, e.g. `/tool/build`.
    pub fn name(&self) -> &NamePath {
        &self.name
    }

    /// Last segment of the path, e.g. `build`.
    pub fn simple_name(&self) -> &str {
        self.name.last().unwrap_or("")
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn opaque_arguments(&self) -> bool {
        self.opaque_arguments
    }

    /// Build a new working copy.
    pub fn instantiate(&self) -> Box<dyn Command> {
        (self.factory)()
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("opaque_arguments", &self.opaque_arguments)
            .finish_non_exhaustive()
    }
}

/// What a running command sees: the invoking interpreter, its own path and
/// arguments, I/O streams and session variables.
pub struct ExecContext<'a> {
    shell: &'a mut Interpreter,
    path: &'a str,
    args: &'a [String],
}

impl<'a> ExecContext<'a> {
    pub fn new(shell: &'a mut Interpreter, path: &'a str, args: &'a [String]) -> Self {
        Self { shell, path, args }
    }

    /// The path the command was invoked with, as typed.
    pub fn path(&self) -> &str {
        self.path
    }

    pub fn args(&self) -> &[String] {
        self.args
    }

    pub fn shell(&mut self) -> &mut Interpreter {
        &mut *self.shell
    }

    pub fn stdin(&mut self) -> &mut dyn Read {
        self.shell.stdin()
    }

    pub fn stdout(&mut self) -> &mut dyn Write {
        self.shell.stdout()
    }

    pub fn stderr(&mut self) -> &mut dyn Write {
        self.shell.stderr()
    }

    pub fn env(&self) -> &Environment {
        self.shell.env()
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        self.shell.env_mut()
    }
}

/// Shared handle to a descriptor, as stored by the registry and the tree.
pub type CommandRef = Arc<CommandDescriptor>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop;

    impl Command for Noop {
        fn execute(&mut self, _ctx: &mut ExecContext<'_>) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_descriptor_names() {
        let d = CommandDescriptor::new("tool/./build", || Box::new(Noop));
        assert_eq!(d.name().to_string(), "/tool/build");
        assert_eq!(d.simple_name(), "build");
        assert_eq!(d.description(), None);
        assert!(!d.opaque_arguments());

        let d = CommandDescriptor::new("", || Box::new(Noop)).with_description("x");
        assert!(d.name().is_root());
        assert_eq!(d.simple_name(), "");
        assert_eq!(d.description(), Some("x"));
    }

    #[test]
    fn test_instantiate_calls_factory_each_time() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let d = CommandDescriptor::new("/noop", || {
            BUILT.fetch_add(1, Ordering::SeqCst);
            Box::new(Noop)
        });
        let _a = d.instantiate();
        let _b = d.instantiate();
        assert_eq!(BUILT.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_bind_accepts_anything() {
        let mut cmd = Noop;
        assert_eq!(cmd.bind(&["-x".to_string()]), Ok(Binding::Ready));
    }
}
