use crate::alias::AliasTable;
use crate::command::{Binding, Command, ExecContext, ExitCode, ExitNotification};
use crate::config::{ErrorPolicy, ShellConfig};
use crate::env::Environment;
use crate::error::ShellError;
use crate::eval::{Evaluator, VariableEvaluator};
use crate::expand;
use crate::io_adapters::{Captured, MemReader, MemWriter};
use crate::kernel::Kernel;
use crate::parser::{self, Statement};
use crate::resolver::{Action, AliasCommand, Resolver};
use crate::value::Value;
use log::{debug, warn};
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use std::io::{Read, Write};
use std::sync::Arc;

/// One shell session.
///
/// Sessions own their variables, aliases and I/O streams, and share the
/// command namespace through the [`Kernel`]. Several sessions may run on
/// different threads against the same kernel.
///
/// Example
/// ```
/// use shell_kernel::{Interpreter, Kernel, Value};
/// use std::sync::Arc;
///
/// let kernel = Arc::new(Kernel::with_builtins().unwrap());
/// let (mut sh, out) = Interpreter::captured(kernel);
/// sh.execute("alias greet echo hello; greet world").unwrap();
/// assert_eq!(out.text(), "hello world\n");
/// assert_eq!(sh.execute("pwd").unwrap(), Some(Value::from("/")));
/// ```
pub struct Interpreter {
    kernel: Arc<Kernel>,
    env: Environment,
    aliases: AliasTable,
    config: ShellConfig,
    evaluator: Arc<dyn Evaluator>,
    stdin: Box<dyn Read + Send>,
    stdout: Box<dyn Write + Send>,
    stderr: Box<dyn Write + Send>,
    alias_depth: usize,
}

impl Interpreter {
    /// A session on the process's standard streams with an empty
    /// environment.
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self {
            kernel,
            env: Environment::new(),
            aliases: AliasTable::new(),
            config: ShellConfig::default(),
            evaluator: Arc::new(VariableEvaluator),
            stdin: Box::new(std::io::stdin()),
            stdout: Box::new(std::io::stdout()),
            stderr: Box::new(std::io::stderr()),
            alias_depth: 0,
        }
    }

    /// A session with no input whose stdout and stderr both go to the
    /// returned buffer.
    pub fn captured(kernel: Arc<Kernel>) -> (Self, Captured) {
        let (out, captured) = MemWriter::with_handle();
        let err = MemWriter::from_handle(captured.clone());
        let shell = Self::new(kernel).with_io(MemReader::new(Vec::new()), out, err);
        (shell, captured)
    }

    pub fn with_config(mut self, config: ShellConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_io(
        mut self,
        stdin: impl Read + Send + 'static,
        stdout: impl Write + Send + 'static,
        stderr: impl Write + Send + 'static,
    ) -> Self {
        self.stdin = Box::new(stdin);
        self.stdout = Box::new(stdout);
        self.stderr = Box::new(stderr);
        self
    }

    /// A new session on the same kernel, starting from a copy of this
    /// session's variables, aliases and settings. Streams are the
    /// process's standard ones.
    pub fn fork(&self) -> Self {
        let mut shell = Self::new(self.kernel.clone());
        shell.env = self.env.clone();
        shell.aliases = self.aliases.clone();
        shell.config = self.config.clone();
        shell.evaluator = self.evaluator.clone();
        shell
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut AliasTable {
        &mut self.aliases
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }

    pub fn stdin(&mut self) -> &mut dyn Read {
        &mut *self.stdin
    }

    pub fn stdout(&mut self) -> &mut dyn Write {
        &mut *self.stdout
    }

    pub fn stderr(&mut self) -> &mut dyn Write {
        &mut *self.stderr
    }

    /// Resolve `name` against this session's aliases, current group and
    /// search path.
    pub fn resolve(&self, name: &str) -> Result<Action, ShellError> {
        let tree = self.kernel.namespace.read();
        Resolver::new(&self.aliases, &self.env, &tree).resolve(name)
    }

    /// Execute a command line: every statement in order.
    ///
    /// Returns the result of the last statement that produced one, or
    /// `None` when there was nothing to run.
    pub fn execute(&mut self, line: &str) -> Result<Option<Value>, ShellError> {
        let parsed = parser::parse_line(line)?;
        let mut last = None;
        for statement in &parsed.statements {
            match self.execute_statement(statement) {
                Ok(Some(value)) => last = Some(value),
                Ok(None) => {}
                Err(err) if self.config.on_error == ErrorPolicy::Continue && err.is_recoverable() => {
                    writeln!(self.stderr, "{err}")?;
                    last = Some(Value::Status(1));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(last)
    }

    fn execute_statement(&mut self, statement: &Statement) -> Result<Option<Value>, ShellError> {
        let tokens = expand::expand_statement(self, statement)?;
        let Some((path, args)) = tokens.split_first() else {
            return Ok(None);
        };
        self.run(path, args).map(Some)
    }

    /// Dispatch one invocation: resolve `path`, build a fresh working copy,
    /// bind `args` onto it and run it.
    ///
    /// Failures of the command itself come back as
    /// [`ShellError::Execution`]. A [`ShellError`] raised by a nested line
    /// and an [`ExitNotification`] are passed through as they are.
    pub fn run(&mut self, path: &str, args: &[String]) -> Result<Value, ShellError> {
        let (mut command, opaque): (Box<dyn Command>, bool) = match self.resolve(path)? {
            Action::Group(group) => return Err(ShellError::IsAGroup(group.to_string())),
            Action::Alias(alias) => (Box::new(AliasCommand::new(alias)) as Box<dyn Command>, true),
            Action::Command { descriptor, .. } => {
                (descriptor.instantiate(), descriptor.opaque_arguments())
            }
        };

        if !opaque {
            if let Binding::Help(text) = command.bind(args)? {
                writeln!(self.stdout, "{}", text.trim_end())?;
                return Ok(Value::Status(0));
            }
        }

        debug!("run {path} {args:?}");
        let result = {
            let mut ctx = ExecContext::new(self, path, args);
            command.execute(&mut ctx)
        };
        result.map_err(|err| execution_error(path, args, err))
    }

    /// Execute the expansion of alias `name`.
    ///
    /// Fails with [`ShellError::AliasDepthExceeded`] once aliases have
    /// expanded inside one another more than the configured number of
    /// times.
    pub fn execute_alias(&mut self, name: &str, line: &str) -> Result<Option<Value>, ShellError> {
        let limit = self.config.max_alias_depth;
        if self.alias_depth >= limit {
            warn!("alias {name}: expansion depth limit {limit} reached");
            return Err(ShellError::AliasDepthExceeded {
                name: name.to_string(),
                limit,
            });
        }
        debug!("alias {name} -> {line}");
        self.alias_depth += 1;
        let result = self.execute(line);
        self.alias_depth -= 1;
        result
    }

    /// Run `line` with stdout captured.
    ///
    /// Yields the captured text without trailing newlines, or the line's
    /// result stringified when nothing was written.
    pub(crate) fn substitute_command(&mut self, line: &str) -> Result<String, ShellError> {
        let (writer, captured) = MemWriter::with_handle();
        let saved = std::mem::replace(&mut self.stdout, Box::new(writer));
        let result = self.execute(line);
        self.stdout = saved;

        let value = result?;
        let text = captured.text();
        if text.is_empty() {
            return Ok(value.map(|v| v.to_string()).unwrap_or_default());
        }
        Ok(text.trim_end_matches('\n').to_string())
    }

    /// Interactive loop on the terminal.
    ///
    /// Returns the status requested by `exit`, or 0 at end of input.
    pub fn repl(&mut self) -> anyhow::Result<ExitCode> {
        let mut rl = Editor::<ShellHelper, DefaultHistory>::new()?;
        rl.set_helper(Some(ShellHelper {
            kernel: self.kernel.clone(),
        }));

        loop {
            let prompt = self.config.prompt.clone();
            match rl.readline(&prompt) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line.as_str())?;
                    match self.execute(&line) {
                        Ok(value) => self.print_value(value)?,
                        Err(ShellError::Exit(exit)) => return Ok(exit.code),
                        Err(err) => writeln!(self.stderr, "{err}")?,
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => return Ok(0),
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Show a line result the way the REPL does. Nulls and statuses are
    /// not printed; lists go one item per line.
    pub fn print_value(&mut self, value: Option<Value>) -> std::io::Result<()> {
        match value {
            None | Some(Value::Null) | Some(Value::Status(_)) => Ok(()),
            Some(Value::List(items)) => items
                .iter()
                .try_for_each(|item| writeln!(self.stdout, "{item}")),
            Some(other) => writeln!(self.stdout, "{other}"),
        }
    }
}

fn execution_error(path: &str, args: &[String], err: anyhow::Error) -> ShellError {
    let err = match err.downcast::<ShellError>() {
        Ok(shell) => return shell,
        Err(err) => err,
    };
    match err.downcast::<ExitNotification>() {
        Ok(exit) => ShellError::Exit(exit),
        Err(err) => ShellError::Execution {
            path: path.to_string(),
            args: args.to_vec(),
            source: err.into(),
        },
    }
}

/// Tab completion of command names for the REPL.
struct ShellHelper {
    kernel: Arc<Kernel>,
}

impl Completer for ShellHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let start = line[..pos]
            .rfind(|c: char| c.is_ascii_whitespace() || c == ';')
            .map_or(0, |i| i + 1);
        Ok((start, self.kernel.completions.complete(&line[start..pos])))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Highlighter for ShellHelper {}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}
