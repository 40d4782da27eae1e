//! Turning the head token of a statement into something runnable.

use crate::alias::AliasTable;
use crate::command::{Command, CommandRef, ExecContext};
use crate::env::Environment;
use crate::error::ShellError;
use crate::path::NamePath;
use crate::tree::{NodeId, Payload, Tree};
use crate::value::Value;
use anyhow::Result;
use log::debug;

/// Outcome of resolving a name.
#[derive(Debug, Clone)]
pub enum Action {
    /// An alias answered before the tree was consulted.
    Alias(AliasAction),
    Command {
        path: NamePath,
        descriptor: CommandRef,
    },
    /// The name denotes a group. Groups cannot be executed.
    Group(NamePath),
}

/// Alias hit: the replacement text and the name it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasAction {
    pub name: String,
    pub text: String,
}

impl AliasAction {
    /// Replacement text followed by the invocation's arguments.
    ///
    /// `ll -a` with `ll` = `ls -l` expands to `ls -l -a`. Arguments are
    /// already evaluated, so any that the lexer would split or substitute
    /// again are single-quoted.
    pub fn expand(&self, args: &[String]) -> String {
        let mut line = self.text.clone();
        for arg in args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        line
    }
}

/// Quote `arg` so that lexing it yields exactly `arg` again.
fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && !arg
            .chars()
            .any(|c| c.is_whitespace() || ";'\"$\\|&<>#".contains(c));
    if plain {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Runs an alias expansion through the invoking interpreter.
///
/// Registered as opaque-arguments: the argv is appended to the replacement
/// text untouched and the whole line is parsed again.
pub(crate) struct AliasCommand {
    alias: AliasAction,
}

impl AliasCommand {
    pub(crate) fn new(alias: AliasAction) -> Self {
        Self { alias }
    }
}

impl Command for AliasCommand {
    fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<Value> {
        let line = self.alias.expand(ctx.args());
        let value = ctx.shell().execute_alias(&self.alias.name, &line)?;
        Ok(value.unwrap_or_default())
    }
}

/// Name lookup over one consistent view of the session and the tree.
pub struct Resolver<'a> {
    aliases: &'a AliasTable,
    env: &'a Environment,
    tree: &'a Tree,
}

impl<'a> Resolver<'a> {
    pub fn new(aliases: &'a AliasTable, env: &'a Environment, tree: &'a Tree) -> Self {
        Self { aliases, env, tree }
    }

    /// Resolve `name`.
    ///
    /// Aliases win over everything. Otherwise each search path entry, taken
    /// relative to the current group, is tried in order and the first one
    /// that contains `name` wins. Entries that do not exist are skipped.
    pub fn resolve(&self, name: &str) -> Result<Action, ShellError> {
        if let Some(text) = self.aliases.lookup(name) {
            debug!("resolve {name}: alias");
            return Ok(Action::Alias(AliasAction {
                name: name.to_string(),
                text: text.to_string(),
            }));
        }

        let path =
            NamePath::parse(name).map_err(|_| ShellError::CommandNotFound(name.to_string()))?;
        let tree = self.tree;

        // absolute names do not depend on the search path
        if path.is_absolute() {
            if let Some(action) = self.action_at(tree.find(tree.root(), &path)) {
                debug!("resolve {name}: absolute");
                return Ok(action);
            }
            debug!("resolve {name}: not found");
            return Err(ShellError::CommandNotFound(name.to_string()));
        }

        let group = self.env.current_group();
        for entry in self.env.search_path() {
            let base = group.join(&entry).normalize();
            let Some(base_id) = tree.find(tree.root(), &base) else {
                continue;
            };
            if !tree.node(base_id).is_some_and(|n| n.is_group()) {
                continue;
            }
            if let Some(action) = self.action_at(tree.find(base_id, &path)) {
                debug!("resolve {name}: via {base}");
                return Ok(action);
            }
        }

        debug!("resolve {name}: not found");
        Err(ShellError::CommandNotFound(name.to_string()))
    }

    fn action_at(&self, hit: Option<NodeId>) -> Option<Action> {
        let hit = hit?;
        let node = self.tree.node(hit)?;
        let full = self.tree.full_path(hit);
        Some(match node.payload() {
            Payload::Command(descriptor) => Action::Command {
                path: full,
                descriptor: descriptor.clone(),
            },
            Payload::Group => Action::Group(full),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandDescriptor;

    struct Noop;

    impl Command for Noop {
        fn execute(&mut self, _ctx: &mut ExecContext<'_>) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn tree(paths: &[&str]) -> Tree {
        let mut tree = Tree::new();
        for p in paths {
            let d = CommandDescriptor::new(p, || Box::new(Noop));
            let path = d.name().clone();
            tree.add(&path, Payload::Command(CommandRef::new(d))).unwrap();
        }
        tree
    }

    fn resolved(action: Action) -> String {
        match action {
            Action::Alias(a) => format!("alias:{}", a.text),
            Action::Command { path, .. } => path.to_string(),
            Action::Group(path) => format!("group:{path}"),
        }
    }

    #[test]
    fn test_alias_wins_over_command() {
        let tree = tree(&["/ls"]);
        let mut aliases = AliasTable::new();
        let env = Environment::new();
        let r = Resolver::new(&aliases, &env, &tree);
        assert_eq!(resolved(r.resolve("ls").unwrap()), "/ls");

        aliases.define("ls", "ls -l");
        let r = Resolver::new(&aliases, &env, &tree);
        assert_eq!(resolved(r.resolve("ls").unwrap()), "alias:ls -l");
    }

    #[test]
    fn test_current_group_searched_before_root() {
        let tree = tree(&["/build", "/tool/build"]);
        let aliases = AliasTable::new();
        let mut env = Environment::new();
        let r = Resolver::new(&aliases, &env, &tree);
        assert_eq!(resolved(r.resolve("build").unwrap()), "/build");

        env.set_current_group(&NamePath::parse("/tool").unwrap());
        let r = Resolver::new(&aliases, &env, &tree);
        assert_eq!(resolved(r.resolve("build").unwrap()), "/tool/build");
        assert_eq!(resolved(r.resolve("/build").unwrap()), "/build");
        assert_eq!(resolved(r.resolve("../build").unwrap()), "/build");
    }

    #[test]
    fn test_search_path_order() {
        let tree = tree(&["/a/run", "/b/run", "/b/only"]);
        let aliases = AliasTable::new();
        let mut env = Environment::new();
        env.set_search_path(&[
            NamePath::parse("/missing").unwrap(),
            NamePath::parse("/b").unwrap(),
            NamePath::parse("/a").unwrap(),
        ]);
        let r = Resolver::new(&aliases, &env, &tree);
        assert_eq!(resolved(r.resolve("run").unwrap()), "/b/run");
        assert_eq!(resolved(r.resolve("only").unwrap()), "/b/only");
        assert!(matches!(
            r.resolve("nothing"),
            Err(ShellError::CommandNotFound(n)) if n == "nothing"
        ));
    }

    #[test]
    fn test_groups_resolve_as_groups() {
        let tree = tree(&["/tool/build"]);
        let aliases = AliasTable::new();
        let env = Environment::new();
        let r = Resolver::new(&aliases, &env, &tree);
        assert_eq!(resolved(r.resolve("tool").unwrap()), "group:/tool");
        assert_eq!(resolved(r.resolve("tool/build").unwrap()), "/tool/build");
    }

    #[test]
    fn test_alias_expand_appends_args() {
        let alias = AliasAction {
            name: "ll".to_string(),
            text: "ls -l".to_string(),
        };
        assert_eq!(alias.expand(&["-a".to_string()]), "ls -l -a");
        assert_eq!(alias.expand(&[]), "ls -l");
    }

    #[test]
    fn test_alias_expand_quotes_evaluated_args() {
        let alias = AliasAction {
            name: "say".to_string(),
            text: "echo".to_string(),
        };
        assert_eq!(alias.expand(&["$Y".to_string()]), "echo '$Y'");
        assert_eq!(alias.expand(&["a;exit 9".to_string()]), "echo 'a;exit 9'");
        assert_eq!(alias.expand(&["it's".to_string()]), r"echo 'it'\''s'");
        assert_eq!(
            alias.expand(&["-n".to_string(), "x y".to_string()]),
            "echo -n 'x y'"
        );
    }

    #[test]
    fn test_absolute_names_ignore_search_path() {
        let tree = tree(&["/pwd", "/tool/build"]);
        let aliases = AliasTable::new();
        let mut env = Environment::new();
        env.set_var("SEARCH_PATH", "/nowhere");
        let r = Resolver::new(&aliases, &env, &tree);
        assert_eq!(resolved(r.resolve("/pwd").unwrap()), "/pwd");
        assert!(matches!(r.resolve("pwd"), Err(ShellError::CommandNotFound(_))));

        env.set_var("SEARCH_PATH", "");
        let r = Resolver::new(&aliases, &env, &tree);
        assert_eq!(resolved(r.resolve("/tool/build").unwrap()), "/tool/build");
        assert_eq!(resolved(r.resolve("/tool").unwrap()), "group:/tool");
        assert!(matches!(r.resolve("/missing"), Err(ShellError::CommandNotFound(_))));
    }
}
