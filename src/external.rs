//! Programs found on disk, mirrored into the registry.

use crate::command::{Command, CommandDescriptor, ExecContext};
use crate::path::{NamePath, PathError};
use crate::registry::{self, CommandRegistry};
use crate::value::Value;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

/// Group external programs are registered under unless told otherwise.
pub const DEFAULT_GROUP: &str = "/ext";

/// Command backed by an executable file.
///
/// Arguments are passed to the program untouched; its output is copied to
/// the invoking session's streams once it exits.
pub struct ExternalCommand {
    program: PathBuf,
}

impl ExternalCommand {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

impl Command for ExternalCommand {
    fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<Value> {
        let vars: Vec<(String, String)> = ctx
            .env()
            .vars()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let output = std::process::Command::new(&self.program)
            .args(ctx.args())
            .envs(vars)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("can't run {}", self.program.display()))?;

        ctx.stdout().write_all(&output.stdout)?;
        ctx.stderr().write_all(&output.stderr)?;
        let code = match output.status.code() {
            Some(x) => x,
            None => terminated_by_signal(output.status),
        };
        Ok(Value::Status(code))
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Executables in `search_paths` (PATH syntax), by file name.
///
/// Like a PATH lookup, the first directory providing a name wins. Names
/// that cannot be used as command names are skipped.
pub fn scan(search_paths: &OsStr) -> BTreeMap<String, PathBuf> {
    let mut found = BTreeMap::new();
    for dir in std::env::split_paths(search_paths) {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            debug!("skipping unreadable {}", dir.display());
            continue;
        };
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if found.contains_key(&name) || !registry::is_valid_segment(&name) {
                continue;
            }
            let path = entry.path();
            if is_executable(&path) {
                found.insert(name, path);
            }
        }
    }
    found
}

/// What a rescan changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub added: usize,
    pub removed: usize,
}

/// The set of external programs currently registered under one group.
pub struct ExternalCommands {
    group: NamePath,
    known: BTreeMap<String, PathBuf>,
}

impl ExternalCommands {
    pub fn new(group: &str) -> Result<Self, PathError> {
        let group = NamePath::root().join(&NamePath::parse(group)?).normalize();
        Ok(Self {
            group,
            known: BTreeMap::new(),
        })
    }

    pub fn group(&self) -> &NamePath {
        &self.group
    }

    /// Registered programs by command name.
    pub fn known(&self) -> &BTreeMap<String, PathBuf> {
        &self.known
    }

    /// Bring `registry` in line with what `search_paths` holds now.
    ///
    /// Programs that disappeared or moved are unregistered, new ones are
    /// registered. A name someone else already registered is left alone.
    pub fn rescan(&mut self, registry: &CommandRegistry, search_paths: &OsStr) -> ScanReport {
        let found = scan(search_paths);
        let mut report = ScanReport::default();

        let stale: Vec<String> = self
            .known
            .iter()
            .filter(|(name, path)| found.get(*name) != Some(*path))
            .map(|(name, _)| name.clone())
            .collect();
        for name in stale {
            self.known.remove(&name);
            let path = self.group.child(name.as_str()).to_string();
            match registry.unregister(&path) {
                Ok(_) => report.removed += 1,
                Err(err) => warn!("external: {err}"),
            }
        }

        for (name, program) in found {
            if self.known.contains_key(&name) {
                continue;
            }
            let path = self.group.child(name.as_str()).to_string();
            let target = program.clone();
            let descriptor = CommandDescriptor::new(&path, move || {
                Box::new(ExternalCommand::new(target.clone()))
            })
            .with_description(program.display().to_string())
            .with_opaque_arguments();
            match registry.register(descriptor) {
                Ok(_) => {
                    self.known.insert(name, program);
                    report.added += 1;
                }
                Err(err) => warn!("external: {err}"),
            }
        }

        info!(
            "external scan of {}: {} added, {} removed",
            self.group, report.added, report.removed
        );
        report
    }
}

/// Register every executable in `search_paths` under `group`.
pub fn discover(
    registry: &CommandRegistry,
    search_paths: &OsStr,
    group: &str,
) -> Result<ExternalCommands, PathError> {
    let mut commands = ExternalCommands::new(group)?;
    commands.rescan(registry, search_paths);
    Ok(commands)
}
