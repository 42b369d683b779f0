//! Reporting errors to the user.

use std::{backtrace::BacktraceStatus, fmt};

use anyhow::Error;

/// Extension trait for formatting an error along with its whole cause chain.
pub trait ReportExt {
    /// A printable report of this error. Includes the backtrace, if one was
    /// captured, unless `Report::without_backtrace` is called.
    fn report(&self) -> Report<'_>;
}

impl ReportExt for Error {
    fn report(&self) -> Report<'_> {
        Report {
            err: self,
            backtrace: true,
        }
    }
}

/// An error formatted one cause per line.
pub struct Report<'a> {
    err: &'a Error,
    backtrace: bool,
}

impl Report<'_> {
    pub fn without_backtrace(self) -> Self {
        Report {
            backtrace: false,
            ..self
        }
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chain = self.err.chain();
        if let Some(top) = chain.next() {
            writeln!(f, "ERROR: {}", top)?;
        }
        for cause in chain {
            writeln!(f, "  caused by: {}", cause)?;
        }

        // Set `RUST_BACKTRACE=1` to capture one.
        let backtrace = self.err.backtrace();
        if self.backtrace && backtrace.status() == BacktraceStatus::Captured {
            write!(f, "{}", backtrace)?;
        }
        Ok(())
    }
}

/// Define `main` in terms of a `fn() -> Result<()>`, reporting any error on
/// stderr and exiting with status 1.
#[macro_export]
macro_rules! quick_main {
    ($run:ident) => {
        fn main() {
            if let Err(err) = $run() {
                use $crate::errors::ReportExt;
                eprint!("{}", err.report());
                ::std::process::exit(1);
            }
        }
    };
}
