use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use owo_colors::{AnsiColors, OwoColorize};
use tracing::debug;

use rh_build_backend::{Builder, CondaApi, CondaStage, Error, PipInstaller};
use rh_fs::Simplified;

use crate::logging::{Verbosity, setup_logging};

mod logging;

#[derive(Parser)]
#[command(name = "repo-helper", author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use verbose output.
    ///
    /// You can configure fine-grained logging using the `RUST_LOG` environment variable.
    /// (<https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#directives>)
    #[arg(global = true, long, short)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a wheel, a source distribution or a Conda package for the given repository.
    Build(BuildArgs),
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
struct BuildArgs {
    /// The repository to build.
    ///
    /// Parent directories are searched for a `repo_helper.yml` file.
    #[arg(default_value = ".")]
    repository: PathBuf,

    /// The temporary build directory.
    ///
    /// Defaults to `build/repo_helper_build` within the repository.
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// The output directory to which distributions should be written.
    ///
    /// Defaults to the `dist` subdirectory within the repository.
    #[arg(long, short)]
    out_dir: Option<PathBuf>,

    /// Build a binary distribution ("wheel").
    #[arg(long, short)]
    binary: bool,

    /// Build a source distribution ("sdist").
    #[arg(long, short)]
    source: bool,

    /// Build a Conda package, from a wheel installed with `pip`.
    #[arg(long, short)]
    conda: bool,
}

#[derive(Copy, Clone)]
enum ExitStatus {
    /// The command succeeded.
    Success,

    /// The command failed with an error.
    Error,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => Self::from(0),
            ExitStatus::Error => Self::from(2),
        }
    }
}

#[allow(clippy::print_stderr)]
fn build(args: BuildArgs) -> Result<ExitStatus> {
    let (binary, source) = if !args.binary && !args.source && !args.conda {
        (true, true)
    } else {
        (args.binary, args.source)
    };
    debug!(
        "Building from {} (wheel: {binary}, sdist: {source}, conda: {})",
        args.repository.user_display(),
        args.conda
    );

    let mut builder = Builder::new(
        &args.repository,
        args.build_dir.as_deref(),
        args.out_dir.as_deref(),
    )?;

    if args.conda {
        let installer = PipInstaller::from_path()?;
        let channels = CondaApi::from_env()?;
        let filename = builder.build_conda(&installer, &channels)?;
        let path = builder.out_dir().join(filename.to_string());
        anstream::eprintln!(
            "{} {}",
            "Conda package created at".green(),
            path.user_display().bold()
        );
    } else if binary {
        let filename = builder.build_wheel()?;
        let path = builder.out_dir().join(filename.to_string());
        anstream::eprintln!(
            "{} {}",
            "Wheel created at".green(),
            path.user_display().bold()
        );
    }

    if source {
        let filename = builder.build_sdist()?;
        let path = builder.out_dir().join(filename.to_string());
        anstream::eprintln!(
            "{} {}",
            "Source distribution created at".green(),
            path.user_display().bold()
        );
    }

    Ok(ExitStatus::Success)
}

fn run(cli: Cli) -> Result<ExitStatus> {
    setup_logging(if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Quiet
    })?;
    rh_warnings::enable();

    match cli.command {
        Commands::Build(args) => build(args),
    }
}

/// Hints for errors that users can fix on their own.
fn hints(err: &anyhow::Error) -> Vec<String> {
    let Some(err) = err.downcast_ref::<Error>() else {
        return Vec::new();
    };
    match err {
        Error::PythonNotFound(_) => vec![format!(
            "{}{} Building a Conda package requires `python3` with `pip` on the `PATH`",
            "hint".cyan().bold(),
            ":".bold()
        )],
        Error::CondaStage {
            stage: CondaStage::Install,
            ..
        } => vec![format!(
            "{}{} Is `pip` installed for the interpreter on the `PATH`?",
            "hint".cyan().bold(),
            ":".bold()
        )],
        Error::CondaStage {
            stage: CondaStage::Dependencies,
            source,
        } if matches!(**source, Error::UnavailableRequirement { .. }) => vec![format!(
            "{}{} Add a channel that provides it to `conda_channels` in `repo_helper.yml`",
            "hint".cyan().bold(),
            ":".bold()
        )],
        _ => Vec::new(),
    }
}

#[allow(clippy::print_stderr)]
fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(status) => status.into(),
        Err(err) => {
            let mut message = String::new();
            let hints = hints(&err);
            if rh_warnings::write_error_chain_with_hints(
                &*err,
                &mut message,
                "error",
                AnsiColors::Red,
                &hints,
            )
            .is_ok()
            {
                anstream::eprint!("{message}");
            } else {
                anstream::eprintln!("{}: {err:#}", "error".red().bold());
            }
            ExitStatus::Error.into()
        }
    }
}
