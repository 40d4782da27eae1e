//! An embeddable command shell core.
//!
//! Commands live in a process-wide hierarchical namespace and are looked up
//! through aliases, the session's current group and its search path. Every
//! invocation runs on a fresh instance built from the registered
//! descriptor.

pub mod alias;
pub mod builtin;
pub mod command;
pub mod completion;
pub mod config;
pub mod env;
pub mod error;
pub mod eval;
mod expand;
pub mod external;
pub mod interpreter;
pub mod io_adapters;
pub mod kernel;
pub mod lexer;
pub mod logger;
pub mod parser;
pub mod path;
pub mod registry;
pub mod resolver;
pub mod tree;
pub mod value;

pub use alias::AliasTable;
pub use command::{Binding, Command, CommandDescriptor, ExecContext, ExitCode, ExitNotification, UsageError};
pub use config::{ErrorPolicy, ShellConfig};
pub use env::Environment;
pub use error::ShellError;
pub use eval::{Evaluator, VariableEvaluator};
pub use interpreter::Interpreter;
pub use io_adapters::{Captured, MemReader, MemWriter};
pub use kernel::Kernel;
pub use path::NamePath;
pub use registry::{CommandRegistry, RegistryError, RegistryEvent};
pub use resolver::Action;
pub use value::Value;
