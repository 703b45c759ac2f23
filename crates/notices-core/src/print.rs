//! Hand finished letters to a printer.
//!
//! Printing is best effort from the orchestrator's point of view; a
//! [`Printer`] reports failures and the caller decides what they mean.

use crate::config::PrintConfig;
use crate::error::{NoticeError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Stand-in in print command arguments for the letter's path.
pub const PATH_TOKEN: &str = "{path}";

pub trait Printer {
    fn print(&self, document: &Path) -> Result<()>;
}

/// Logs the letter and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPrinter;

impl Printer for NoopPrinter {
    fn print(&self, document: &Path) -> Result<()> {
        tracing::info!(
            path = %document.display(),
            "no printer configured, letter left in output directory"
        );
        Ok(())
    }
}

/// Runs a configured command (`lp`, `lpr`, a spooler script, ...) per letter.
#[derive(Debug, Clone)]
pub struct CommandPrinter {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandPrinter {
    /// Resolve the program on `PATH`; `{path}` in `args` is substituted at print
    /// time, and appended when no argument mentions it.
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| NoticeError::Print("print command is empty".into()))?;
        let program = which::which(program)
            .map_err(|e| NoticeError::Print(format!("print program '{program}' not found: {e}")))?;
        let mut args = args.to_vec();
        if !args.iter().any(|a| a.contains(PATH_TOKEN)) {
            args.push(PATH_TOKEN.to_string());
        }
        Ok(Self { program, args })
    }
}

impl Printer for CommandPrinter {
    fn print(&self, document: &Path) -> Result<()> {
        if !document.is_file() {
            return Err(NoticeError::Print(format!(
                "{} does not exist",
                document.display()
            )));
        }
        let path = document.to_string_lossy();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(PATH_TOKEN, &path))
            .collect();

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                NoticeError::Print(format!("failed to start {}: {e}", self.program.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let hint: String = stderr.trim().chars().take(300).collect();
            return Err(NoticeError::Print(format!(
                "{} exited with {}: {hint}",
                self.program.display(),
                output.status
            )));
        }
        tracing::info!(
            path = %document.display(),
            printer = %self.program.display(),
            "letter sent to printer"
        );
        Ok(())
    }
}

pub fn printer_from_config(cfg: Option<&PrintConfig>) -> Result<Box<dyn Printer>> {
    match cfg {
        Some(p) => Ok(Box::new(CommandPrinter::new(&p.command)?)),
        None => Ok(Box::new(NoopPrinter)),
    }
}
