use anyhow::{Context, Result};
use argh::FromArgs;
use shell_kernel::command::ExitCode;
use shell_kernel::config::{ErrorPolicy, ShellConfig};
use shell_kernel::{Environment, Interpreter, Kernel, ShellError, external, logger};
use std::sync::Arc;

#[derive(FromArgs)]
/// Interactive shell over a hierarchical command namespace.
struct Args {
    #[argh(option, short = 'c')]
    /// run this line and exit instead of starting the prompt.
    command: Option<String>,

    #[argh(option)]
    /// file whose lines are run before anything else.
    rc: Option<String>,

    #[argh(switch)]
    /// report recoverable errors and keep going instead of stopping.
    keep_going: bool,

    #[argh(option, default = "16")]
    /// how deep aliases may expand inside one another.
    max_alias_depth: usize,

    #[argh(option)]
    /// log level: error, warn, info, debug or trace.
    log: Option<String>,

    #[argh(switch)]
    /// register the executables found on PATH under /ext.
    path_commands: bool,
}

fn main() {
    let args: Args = argh::from_env();
    if let Err(err) = logger::init(args.log.as_deref()) {
        eprintln!("logger: {err}");
    }
    let code = match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run(args: Args) -> Result<ExitCode> {
    let kernel = Arc::new(Kernel::with_builtins()?);
    if args.path_commands {
        let path = std::env::var_os("PATH").unwrap_or_default();
        external::discover(&kernel.registry, &path, external::DEFAULT_GROUP)?;
    }

    let config = ShellConfig {
        max_alias_depth: args.max_alias_depth,
        on_error: if args.keep_going {
            ErrorPolicy::Continue
        } else {
            ErrorPolicy::StopOnError
        },
        ..ShellConfig::default()
    };
    let mut shell = Interpreter::new(kernel)
        .with_config(config)
        .with_env(Environment::inherit());

    if let Some(rc) = &args.rc {
        let text = std::fs::read_to_string(rc).with_context(|| format!("can't read {rc}"))?;
        if let Some(code) = run_line(&mut shell, &text)? {
            return Ok(code);
        }
    }

    match &args.command {
        Some(line) => Ok(run_line(&mut shell, line)?.unwrap_or(0)),
        None => shell.repl(),
    }
}

/// Run `line` non-interactively. `Some(code)` means the session ended.
fn run_line(shell: &mut Interpreter, line: &str) -> Result<Option<ExitCode>> {
    match shell.execute(line) {
        Ok(value) => {
            shell.print_value(value)?;
            Ok(None)
        }
        Err(ShellError::Exit(exit)) => Ok(Some(exit.code)),
        Err(err) if err.is_recoverable() => {
            writeln!(shell.stderr(), "{err}")?;
            Ok(Some(1))
        }
        Err(err) => Err(err.into()),
    }
}
