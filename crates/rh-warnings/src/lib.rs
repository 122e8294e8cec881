use std::error::Error;
use std::fmt::{Arguments, Write};
use std::iter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex};

use owo_colors::{AnsiColors, DynColor, OwoColorize};
use rustc_hash::FxHashSet;

/// Warnings are only printed by the command line interface, libraries and tests stay quiet.
static ENABLED: AtomicBool = AtomicBool::new(false);

/// Continuation lines start below the text after `  Caused by: `.
const INDENT: &str = "             ";

/// Messages already shown through [`warn_user_once!`].
static SHOWN: LazyLock<Mutex<FxHashSet<String>>> = LazyLock::new(Mutex::default);

/// Print warnings from now on.
pub fn enable() {
    ENABLED.store(true, Ordering::Relaxed);
}

#[doc(hidden)]
pub fn emit(args: Arguments<'_>, once: bool) {
    if !ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let message = args.to_string();
    if once {
        let Ok(mut shown) = SHOWN.lock() else {
            return;
        };
        if !shown.insert(message.clone()) {
            return;
        }
    }
    anstream::eprintln!(
        "{}{} {}",
        "warning".yellow().bold(),
        ":".bold(),
        message.bold()
    );
}

/// Print a warning to stderr.
#[macro_export]
macro_rules! warn_user {
    ($($arg:tt)*) => {
        $crate::emit(format_args!($($arg)*), false)
    };
}

/// Print a warning to stderr, unless the same message was printed before.
#[macro_export]
macro_rules! warn_user_once {
    ($($arg:tt)*) => {
        $crate::emit(format_args!($($arg)*), true)
    };
}

/// Format an error chain, one `Caused by:` line per source, followed by any hints.
///
/// Multi-line messages keep their line breaks, with continuation lines aligned under the first.
///
/// ```text
/// error: Failed to build conda package for `domdf-python-tools`
///   Caused by: Installing the wheel into the staging prefix failed
///   Caused by: `python -m pip install ...` exited with status 1
///
/// hint: Is `pip` installed for the selected interpreter?
/// ```
pub fn write_error_chain_with_hints<'a>(
    err: &dyn Error,
    mut stream: impl std::fmt::Write,
    level: impl AsRef<str>,
    color: impl DynColor + Copy,
    hints: impl IntoIterator<Item = impl std::fmt::Display + 'a>,
) -> std::fmt::Result {
    let level = level.as_ref();
    writeln!(
        stream,
        "{}{} {}",
        level.color(color).bold(),
        ":".bold(),
        err.to_string().trim()
    )?;

    let causes = iter::successors(err.source(), |&source| source.source());
    for cause in causes.map(ToString::to_string) {
        for (index, line) in cause.lines().enumerate() {
            let line = line.trim_end();
            if index == 0 {
                writeln!(
                    stream,
                    "  {}: {}",
                    "Caused by".color(color).bold(),
                    line.trim_start()
                )?;
            } else if line.is_empty() {
                writeln!(stream)?;
            } else {
                writeln!(stream, "{INDENT}{line}")?;
            }
        }
    }

    for hint in hints {
        write!(stream, "\n{hint}\n")?;
    }

    Ok(())
}

/// Format an error chain at the error level, in red.
pub fn write_error_chain(err: &dyn Error, stream: impl std::fmt::Write) -> std::fmt::Result {
    write_error_chain_with_hints(err, stream, "error", AnsiColors::Red, iter::empty::<&str>())
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn error_chain() {
        let err = anyhow!("No such file or directory (os error 2)")
            .context("Failed to read `requirements.txt`")
            .context("Failed to build wheel for `consolekit`");

        let mut rendered = String::new();
        write_error_chain(err.as_ref(), &mut rendered).unwrap();
        let rendered = anstream::adapter::strip_str(&rendered);

        assert_snapshot!(rendered, @r"
        error: Failed to build wheel for `consolekit`
          Caused by: Failed to read `requirements.txt`
          Caused by: No such file or directory (os error 2)
        ");
    }

    #[test]
    fn multiline_cause_with_hint() {
        #[derive(Debug, thiserror::Error)]
        #[error("Command exited with status 1\nERROR: No matching distribution\n\nfound")]
        struct Install;

        #[derive(Debug, thiserror::Error)]
        #[error("Failed to build conda package")]
        struct Build {
            #[source]
            source: Install,
        }

        let mut rendered = String::new();
        write_error_chain_with_hints(
            &Build { source: Install },
            &mut rendered,
            "error",
            AnsiColors::Red,
            ["hint: Is `pip` installed?"],
        )
        .unwrap();
        let rendered = anstream::adapter::strip_str(&rendered);

        assert_snapshot!(rendered, @r"
        error: Failed to build conda package
          Caused by: Command exited with status 1
                     ERROR: No matching distribution

                     found

        hint: Is `pip` installed?
        ");
    }
}
