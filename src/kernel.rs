use crate::builtin;
use crate::completion::CompletionIndex;
use crate::registry::{CommandRegistry, RegistryError};
use crate::tree::Namespace;

/// Process-wide state shared by every session.
///
/// The namespace and the completion index subscribe to the registry when
/// the kernel is built and follow it from then on.
pub struct Kernel {
    pub registry: CommandRegistry,
    pub namespace: Namespace,
    pub completions: CompletionIndex,
}

impl Kernel {
    /// Kernel with no commands at all.
    pub fn new() -> Self {
        let registry = CommandRegistry::new();
        let namespace = Namespace::attach(&registry);
        let completions = CompletionIndex::attach(&registry);
        Self {
            registry,
            namespace,
            completions,
        }
    }

    /// Kernel with the built-in commands registered at the root.
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let kernel = Self::new();
        builtin::register_all(&kernel.registry)?;
        Ok(kernel)
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}
