use crate::command::{Binding, Command, CommandDescriptor, ExecContext, ExitNotification, UsageError};
use crate::error::ShellError;
use crate::path::NamePath;
use crate::registry::{self, CommandRegistry, RegistryError};
use crate::resolver::Action;
use crate::value::Value;
use anyhow::{Context, Result, anyhow, bail};
use argh::{EarlyExit, FromArgs};
use log::debug;
use regex::Regex;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`): a fresh value
/// is parsed for every invocation and consumed by `execute`.
pub(crate) trait BuiltinCommand: Sized + FromArgs + 'static {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// One-line summary shown by `help`.
    fn description() -> &'static str;

    fn execute(self, ctx: &mut ExecContext<'_>) -> Result<Value>;
}

/// Adapts a [`BuiltinCommand`] to the [`Command`] protocol: `bind` parses,
/// `execute` consumes the parsed value.
struct Builtin<T> {
    bound: Option<T>,
}

impl<T: BuiltinCommand> Command for Builtin<T> {
    fn bind(&mut self, args: &[String]) -> Result<Binding, UsageError> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match T::from_args(&[T::name()], &args) {
            Ok(cmd) => {
                self.bound = Some(cmd);
                Ok(Binding::Ready)
            }
            Err(EarlyExit {
                output,
                status: Ok(()),
            }) => Ok(Binding::Help(output)),
            Err(EarlyExit {
                output,
                status: Err(()),
            }) => Err(UsageError::new(T::name(), output.trim_end())),
        }
    }

    fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<Value> {
        let cmd = self
            .bound
            .take()
            .ok_or_else(|| anyhow!("{}: executed without binding arguments", T::name()))?;
        cmd.execute(ctx)
    }
}

fn descriptor<T: BuiltinCommand>() -> CommandDescriptor {
    CommandDescriptor::new(T::name(), || Box::new(Builtin::<T> { bound: None }))
        .with_description(T::description())
}

/// Register every built-in command at the root of `registry`.
pub fn register_all(registry: &CommandRegistry) -> Result<(), RegistryError> {
    let descriptors = [
        descriptor::<Echo>(),
        descriptor::<Exit>(),
        descriptor::<Unalias>(),
        descriptor::<Set>(),
        descriptor::<Unset>(),
        descriptor::<Cd>(),
        descriptor::<Pwd>(),
        descriptor::<Ls>(),
        descriptor::<Which>(),
        descriptor::<Help>(),
        CommandDescriptor::new("alias", || Box::new(Alias))
            .with_description("define or list aliases")
            .with_opaque_arguments(),
    ];
    for d in descriptors {
        registry.register(d)?;
    }
    debug!("built-in commands registered");
    Ok(())
}

#[derive(FromArgs)]
/// write the arguments to standard output, separated by spaces.
/// by default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn description() -> &'static str {
        "print arguments"
    }

    fn execute(self, ctx: &mut ExecContext<'_>) -> Result<Value> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(ctx.stdout(), "{}", s)?;
        } else {
            writeln!(ctx.stdout(), "{}", s)?;
        }
        Ok(Value::Null)
    }
}

#[derive(FromArgs)]
/// End the session.
pub struct Exit {
    #[argh(positional)]
    /// status to exit with, 0 when omitted.
    pub code: Option<i32>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn description() -> &'static str {
        "end the session"
    }

    fn execute(self, _ctx: &mut ExecContext<'_>) -> Result<Value> {
        Err(ExitNotification {
            code: self.code.unwrap_or(0),
        }
        .into())
    }
}

/// `alias`, `alias name`, `alias name text...` or `alias name=text`.
///
/// Takes its argv verbatim since alias text usually contains flags.
struct Alias;

impl Command for Alias {
    fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<Value> {
        let args = ctx.args().to_vec();
        let Some((first, rest)) = args.split_first() else {
            let listing: Vec<String> = ctx
                .shell()
                .aliases()
                .list()
                .map(|(name, text)| format!("{name}='{text}'"))
                .collect();
            for line in listing {
                writeln!(ctx.stdout(), "{line}")?;
            }
            return Ok(Value::Null);
        };

        let (name, text) = match first.split_once('=') {
            Some((name, head)) => {
                let text = std::iter::once(head)
                    .chain(rest.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ");
                (name.to_string(), text)
            }
            None if rest.is_empty() => {
                let text = ctx
                    .shell()
                    .aliases()
                    .lookup(first)
                    .map(str::to_string)
                    .ok_or_else(|| ShellError::from(crate::alias::NoSuchAlias(first.clone())))?;
                writeln!(ctx.stdout(), "{first}='{text}'")?;
                return Ok(Value::Null);
            }
            None => (first.clone(), rest.join(" ")),
        };

        if !registry::is_valid_segment(&name) {
            return Err(ShellError::from(UsageError::new(
                "alias",
                format!("invalid alias name {name:?}"),
            ))
            .into());
        }
        debug!("alias {name}={text}");
        ctx.shell().aliases_mut().define(name, text);
        Ok(Value::Null)
    }
}

#[derive(FromArgs)]
/// Remove an alias.
pub struct Unalias {
    #[argh(positional)]
    /// alias to remove.
    pub name: String,
}

impl BuiltinCommand for Unalias {
    fn name() -> &'static str {
        "unalias"
    }

    fn description() -> &'static str {
        "remove an alias"
    }

    fn execute(self, ctx: &mut ExecContext<'_>) -> Result<Value> {
        ctx.shell()
            .aliases_mut()
            .undefine(&self.name)
            .map_err(ShellError::from)?;
        Ok(Value::Null)
    }
}

#[derive(FromArgs)]
/// Set a session variable, or list all of them.
/// `set NAME` alone sets NAME to the empty string.
pub struct Set {
    #[argh(positional, greedy)]
    /// variable name followed by its value words.
    pub args: Vec<String>,
}

impl BuiltinCommand for Set {
    fn name() -> &'static str {
        "set"
    }

    fn description() -> &'static str {
        "set or list session variables"
    }

    fn execute(self, ctx: &mut ExecContext<'_>) -> Result<Value> {
        let Some((name, value)) = self.args.split_first() else {
            let listing: Vec<String> = ctx
                .env()
                .vars()
                .into_iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            for line in listing {
                writeln!(ctx.stdout(), "{line}")?;
            }
            return Ok(Value::Null);
        };
        ctx.env_mut().set_var(name.clone(), value.join(" "));
        Ok(Value::Null)
    }
}

#[derive(FromArgs)]
/// Remove a session variable.
pub struct Unset {
    #[argh(positional)]
    /// variable to remove.
    pub name: String,
}

impl BuiltinCommand for Unset {
    fn name() -> &'static str {
        "unset"
    }

    fn description() -> &'static str {
        "remove a session variable"
    }

    fn execute(self, ctx: &mut ExecContext<'_>) -> Result<Value> {
        ctx.env_mut().remove_var(&self.name);
        Ok(Value::Null)
    }
}

/// Absolute path of the group `target` names, relative to the current group.
fn locate_group(ctx: &mut ExecContext<'_>, target: &str) -> Result<NamePath> {
    let wanted = ctx
        .env()
        .current_group()
        .join(&NamePath::parse(target).context("empty group name")?)
        .normalize();
    let kernel = ctx.shell().kernel().clone();
    let tree = kernel.namespace.read();
    let id = tree
        .find(tree.root(), &wanted)
        .with_context(|| format!("no such group: {target}"))?;
    if !tree.node(id).is_some_and(|n| n.is_group()) {
        bail!("not a group: {target}");
    }
    Ok(tree.full_path(id))
}

#[derive(FromArgs)]
/// Change the current group.
/// If no target is provided, changes to the root.
pub struct Cd {
    #[argh(positional)]
    /// group to switch to; absolute or relative to the current group.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn description() -> &'static str {
        "change the current group"
    }

    fn execute(self, ctx: &mut ExecContext<'_>) -> Result<Value> {
        let group = match self.target.as_deref() {
            Some(t) if !t.is_empty() => locate_group(ctx, t)?,
            _ => NamePath::root(),
        };
        debug!("cd {group}");
        ctx.env_mut().set_current_group(&group);
        Ok(Value::Null)
    }
}

#[derive(FromArgs)]
/// Show the current group.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn description() -> &'static str {
        "show the current group"
    }

    fn execute(self, ctx: &mut ExecContext<'_>) -> Result<Value> {
        Ok(Value::Str(ctx.env().current_group().to_string()))
    }
}

#[derive(FromArgs)]
/// List the contents of a group. Groups are shown with a trailing `/`.
pub struct Ls {
    #[argh(positional)]
    /// group to list, the current group when omitted.
    pub group: Option<String>,

    #[argh(option, short = 'm', long = "match")]
    /// only show names matching this regular expression.
    pub pattern: Option<String>,
}

impl BuiltinCommand for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn description() -> &'static str {
        "list a group"
    }

    fn execute(self, ctx: &mut ExecContext<'_>) -> Result<Value> {
        let filter = self
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("ls: invalid pattern")?;
        let group = match self.group.as_deref() {
            Some(g) => locate_group(ctx, g)?,
            None => ctx.env().current_group(),
        };

        let kernel = ctx.shell().kernel().clone();
        let tree = kernel.namespace.read();
        let id = tree
            .find(tree.root(), &group)
            .with_context(|| format!("no such group: {group}"))?;
        let node = tree.node(id).context("dangling node")?;
        let entries = node
            .children()
            .filter(|(name, _)| filter.as_ref().is_none_or(|re| re.is_match(name)))
            .map(|(name, child)| {
                let is_group = tree.node(child).is_some_and(|n| n.is_group());
                Value::Str(if is_group {
                    format!("{name}/")
                } else {
                    name.to_string()
                })
            })
            .collect();
        Ok(Value::List(entries))
    }
}

#[derive(FromArgs)]
/// Show what a name resolves to.
pub struct Which {
    #[argh(positional)]
    /// name to resolve.
    pub name: String,
}

impl BuiltinCommand for Which {
    fn name() -> &'static str {
        "which"
    }

    fn description() -> &'static str {
        "show what a name resolves to"
    }

    fn execute(self, ctx: &mut ExecContext<'_>) -> Result<Value> {
        let shown = match ctx.shell().resolve(&self.name)? {
            Action::Alias(alias) => format!("{}: alias for '{}'", alias.name, alias.text),
            Action::Command { path, .. } => path.to_string(),
            Action::Group(path) => format!("{path}/"),
        };
        Ok(Value::Str(shown))
    }
}

#[derive(FromArgs)]
/// List registered commands with their descriptions.
pub struct Help {}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn description() -> &'static str {
        "list commands"
    }

    fn execute(self, ctx: &mut ExecContext<'_>) -> Result<Value> {
        let commands = ctx.shell().kernel().registry.all();
        let width = commands
            .iter()
            .map(|d| d.name().to_string().len())
            .max()
            .unwrap_or(0);
        for d in commands {
            let name = d.name().to_string();
            match d.description() {
                Some(text) => writeln!(ctx.stdout(), "{name:width$}  {text}")?,
                None => writeln!(ctx.stdout(), "{name}")?,
            }
        }
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Interpreter;
    use crate::io_adapters::Captured;
    use crate::kernel::Kernel;
    use std::sync::Arc;

    fn shell() -> (Interpreter, Captured) {
        Interpreter::captured(Arc::new(Kernel::with_builtins().unwrap()))
    }

    fn list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn test_echo() {
        let (mut sh, out) = shell();
        sh.execute("echo -n foo; echo -n bar; echo baz").unwrap();
        assert_eq!(out.text(), "foobarbaz\n");
    }

    #[test]
    fn test_echo_help_is_not_an_error() {
        let (mut sh, out) = shell();
        assert_eq!(sh.execute("echo --help").unwrap(), Some(Value::Status(0)));
        assert!(out.text().starts_with("Usage: echo"));
    }

    #[test]
    fn test_unknown_flag_is_usage_error() {
        let (mut sh, _out) = shell();
        assert!(matches!(
            sh.execute("echo --bogus"),
            Err(ShellError::Usage(UsageError { command, .. })) if command == "echo"
        ));
    }

    #[test]
    fn test_exit_codes() {
        let (mut sh, _out) = shell();
        assert_eq!(sh.execute("exit").unwrap_err().exit_code(), Some(0));
        assert_eq!(sh.execute("exit 3").unwrap_err().exit_code(), Some(3));
        assert!(matches!(sh.execute("exit x"), Err(ShellError::Usage(_))));
    }

    #[test]
    fn test_alias_forms() {
        let (mut sh, out) = shell();
        sh.execute("alias ll ls -l; alias la='ls -a'").unwrap();
        assert_eq!(sh.aliases().lookup("ll"), Some("ls -l"));
        assert_eq!(sh.aliases().lookup("la"), Some("ls -a"));

        sh.execute("alias ll").unwrap();
        assert_eq!(out.text(), "ll='ls -l'\n");
        out.clear();
        sh.execute("alias").unwrap();
        assert_eq!(out.text(), "la='ls -a'\nll='ls -l'\n");

        assert!(matches!(sh.execute("alias nope"), Err(ShellError::NoSuchAlias(_))));
        assert!(matches!(sh.execute("alias 'a b' x"), Err(ShellError::Usage(_))));
    }

    #[test]
    fn test_unalias() {
        let (mut sh, _out) = shell();
        sh.execute("alias k echo").unwrap();
        sh.execute("unalias k").unwrap();
        assert!(sh.aliases().is_empty());
        assert!(matches!(
            sh.execute("unalias k"),
            Err(ShellError::NoSuchAlias(a)) if a.0 == "k"
        ));
    }

    #[test]
    fn test_set_and_unset() {
        let (mut sh, out) = shell();
        sh.execute("set GREETING hello there; set EMPTY").unwrap();
        assert_eq!(sh.env().get_var("GREETING"), Some("hello there"));
        assert_eq!(sh.env().get_var("EMPTY"), Some(""));
        sh.execute("echo $GREETING").unwrap();
        assert_eq!(out.text(), "hello there\n");

        sh.execute("unset GREETING").unwrap();
        assert_eq!(sh.env().get_var("GREETING"), None);
        out.clear();
        sh.execute("set").unwrap();
        assert_eq!(out.text(), "EMPTY=\n");
    }

    fn with_tools() -> (Interpreter, Captured) {
        let (sh, out) = shell();
        for name in ["/tool/build", "/tool/bench", "/tool/sub/deep"] {
            sh.kernel()
                .registry
                .register(CommandDescriptor::new(name, || {
                    Box::new(Builtin::<Pwd> { bound: None })
                }))
                .unwrap();
        }
        (sh, out)
    }

    #[test]
    fn test_cd_and_pwd() {
        let (mut sh, _out) = with_tools();
        assert_eq!(sh.execute("pwd").unwrap(), Some(Value::from("/")));
        sh.execute("cd tool/sub").unwrap();
        assert_eq!(sh.execute("pwd").unwrap(), Some(Value::from("/tool/sub")));
        sh.execute("cd ..").unwrap();
        assert_eq!(sh.execute("pwd").unwrap(), Some(Value::from("/tool")));
        sh.execute("cd").unwrap();
        assert_eq!(sh.execute("pwd").unwrap(), Some(Value::from("/")));

        assert!(matches!(sh.execute("cd missing"), Err(ShellError::Execution { .. })));
        assert!(matches!(sh.execute("cd tool/build"), Err(ShellError::Execution { .. })));
        assert_eq!(sh.execute("pwd").unwrap(), Some(Value::from("/")));
    }

    #[test]
    fn test_ls() {
        let (mut sh, _out) = with_tools();
        assert_eq!(
            sh.execute("ls tool").unwrap(),
            Some(list(&["bench", "build", "sub/"]))
        );
        assert_eq!(
            sh.execute("ls /tool --match ^b").unwrap(),
            Some(list(&["bench", "build"]))
        );
        sh.execute("cd tool").unwrap();
        assert_eq!(sh.execute("ls -m u").unwrap(), Some(list(&["build", "sub/"])));
        assert!(matches!(sh.execute("ls -m ("), Err(ShellError::Execution { .. })));
    }

    #[test]
    fn test_which() {
        let (mut sh, _out) = with_tools();
        sh.execute("alias b tool/build").unwrap();
        assert_eq!(sh.execute("which b").unwrap(), Some(Value::from("b: alias for 'tool/build'")));
        assert_eq!(sh.execute("which tool/build").unwrap(), Some(Value::from("/tool/build")));
        assert_eq!(sh.execute("which tool").unwrap(), Some(Value::from("/tool/")));
        assert!(matches!(sh.execute("which zzz"), Err(ShellError::CommandNotFound(_))));
    }

    #[test]
    fn test_help_lists_descriptions() {
        let (mut sh, out) = shell();
        sh.execute("help").unwrap();
        let text = out.text();
        assert!(text.contains("/echo"));
        assert!(text.contains("print arguments"));
        assert!(text.lines().any(|l| l.starts_with("/alias") && l.ends_with("define or list aliases")));
    }
}
