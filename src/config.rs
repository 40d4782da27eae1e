/// What [`Interpreter::execute`](crate::Interpreter::execute) does after a
/// statement fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Return the first error to the caller.
    #[default]
    StopOnError,
    /// Report recoverable errors on stderr and move on to the next
    /// statement. Execution failures and exit requests still propagate.
    Continue,
}

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// How many aliases may expand inside one another before giving up.
    pub max_alias_depth: usize,
    pub on_error: ErrorPolicy,
    pub prompt: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            max_alias_depth: 16,
            on_error: ErrorPolicy::default(),
            prompt: "$ ".to_string(),
        }
    }
}
