//! The flash workflow state machine.
//!
//! Flashing is a strictly ordered, fallible sequence:
//! resolve → locate file → derive path → confirm → unmount → copy.
//! Each state is one method returning the next state's input or a typed
//! failure. Unmount is the single non-fatal step; everything else aborts.
//! Once the copy starts the process blocks on it with no cancellation --
//! abandoning a raw copy mid-write is unsafe for the target device.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::{self, CatalogEntry, CatalogError, CatalogSource};
use crate::device::{FlashTarget, PlatformPolicy};

#[derive(Debug, Error)]
pub enum FlashError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The image has not been downloaded yet. The workflow never triggers a
    /// download on its own.
    #[error("image file `{file}` not found in `{dir}`; run the download command first")]
    ImageFileMissing { file: String, dir: PathBuf },

    #[error("failed to read confirmation: {0}")]
    Prompt(#[source] io::Error),

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The raw copy exited nonzero; the code is surfaced verbatim.
    #[error("copy command exited with status {code}")]
    CopyFailed { code: i32 },
}

/// How a completed workflow ended. Cancellation at the confirmation prompt
/// is a clean outcome, not an error.
#[derive(Debug, PartialEq, Eq)]
pub enum FlashOutcome {
    Completed { target: String },
    Cancelled,
}

/// Executes external commands for the workflow.
///
/// The production runner spawns real processes with inherited standard
/// streams, so dd's native progress output stays on the user's terminal.
/// Tests substitute a scripted runner.
pub trait CommandRunner {
    /// Run `argv`, returning the process exit code.
    fn run(&mut self, argv: &[String]) -> io::Result<i32>;
}

/// Spawns real processes.
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&mut self, argv: &[String]) -> io::Result<i32> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;

        let status = Command::new(program).args(args).status()?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// The workflow's linear states. Each variant carries exactly the input its
/// state function needs.
enum Step {
    Resolve,
    Locate { entry: CatalogEntry },
    Derive { image: PathBuf },
    Confirm { image: PathBuf, target: FlashTarget },
    Unmount { image: PathBuf, target: String },
    Copy { image: PathBuf, target: String },
}

pub struct FlashWorkflow<'a> {
    catalog: &'a dyn CatalogSource,
    policy: &'a dyn PlatformPolicy,
    runner: &'a mut dyn CommandRunner,
    download_dir: PathBuf,
}

impl<'a> FlashWorkflow<'a> {
    pub fn new(
        catalog: &'a dyn CatalogSource,
        policy: &'a dyn PlatformPolicy,
        runner: &'a mut dyn CommandRunner,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            catalog,
            policy,
            runner,
            download_dir,
        }
    }

    /// Drive the state machine to completion for `identifier` and `drive`.
    ///
    /// `input` answers the confirmation prompt; production passes a locked
    /// stdin.
    pub async fn run(
        &mut self,
        identifier: &str,
        drive: &str,
        input: &mut dyn BufRead,
    ) -> Result<FlashOutcome, FlashError> {
        let mut step = Step::Resolve;

        loop {
            step = match step {
                Step::Resolve => {
                    let entry = self.resolve(identifier).await?;
                    Step::Locate { entry }
                }
                Step::Locate { entry } => {
                    let image = self.locate_file(&entry)?;
                    Step::Derive { image }
                }
                Step::Derive { image } => {
                    let target = self.policy.derive_flash_path(drive);
                    for warning in &target.warnings {
                        warn!("{warning}");
                    }
                    Step::Confirm { image, target }
                }
                Step::Confirm { image, target } => {
                    if !self.confirm(&image, &target.path, input)? {
                        info!("Flash cancelled; no data was written");
                        return Ok(FlashOutcome::Cancelled);
                    }
                    Step::Unmount {
                        image,
                        target: target.path,
                    }
                }
                Step::Unmount { image, target } => {
                    self.unmount(&target);
                    Step::Copy { image, target }
                }
                Step::Copy { image, target } => {
                    self.copy(&image, &target)?;
                    return Ok(FlashOutcome::Completed { target });
                }
            };
        }
    }

    async fn resolve(&self, identifier: &str) -> Result<CatalogEntry, FlashError> {
        let entries = self.catalog.fetch().await?;
        Ok(catalog::resolve(&entries, identifier)?.clone())
    }

    fn locate_file(&self, entry: &CatalogEntry) -> Result<PathBuf, FlashError> {
        let file = entry.file_name()?;
        let path = self.download_dir.join(file);

        if !path.exists() {
            return Err(FlashError::ImageFileMissing {
                file: file.to_string(),
                dir: self.download_dir.clone(),
            });
        }

        Ok(path)
    }

    fn confirm(
        &mut self,
        image: &Path,
        target: &str,
        input: &mut dyn BufRead,
    ) -> Result<bool, FlashError> {
        let command =
            shell_equivalent(&self.policy.copy_argv(&image.display().to_string(), target));

        println!("About to run: {command}");
        println!("This will erase ALL data on {target}.");
        print!("Continue? [y/N] ");
        io::stdout().flush().map_err(FlashError::Prompt)?;

        let mut answer = String::new();
        input.read_line(&mut answer).map_err(FlashError::Prompt)?;

        Ok(is_affirmative(&answer))
    }

    fn unmount(&mut self, target: &str) {
        let argv = self.policy.unmount_argv(target);
        info!(command = %shell_equivalent(&argv), "Unmounting target device");

        // Unmount failure is non-fatal; the copy step is the authoritative
        // pass/fail signal.
        match self.runner.run(&argv) {
            Ok(0) => {}
            Ok(code) => warn!(code, "Unmount failed; flashing may fail"),
            Err(e) => warn!(error = %e, "Could not run unmount command; flashing may fail"),
        }
    }

    fn copy(&mut self, image: &Path, target: &str) -> Result<(), FlashError> {
        let argv = self
            .policy
            .copy_argv(&image.display().to_string(), target);
        info!(command = %shell_equivalent(&argv), "Starting raw copy");

        let code = self.runner.run(&argv).map_err(|e| FlashError::Spawn {
            command: shell_equivalent(&argv),
            source: e,
        })?;

        if code != 0 {
            return Err(FlashError::CopyFailed { code });
        }

        info!(target = %target, "Flash complete");
        println!(
            "Flashed {} to {target}. You can now eject the drive.",
            image.display()
        );
        Ok(())
    }
}

/// Only an exact `y`, in either case, confirms a destructive action.
fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

/// Render an argv as the shell command the user would type.
pub fn shell_equivalent(argv: &[String]) -> String {
    argv.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bare_y_confirms() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative("Y\n"));
        assert!(is_affirmative("  y  "));
        assert!(!is_affirmative("yes\n"));
        assert!(!is_affirmative("n\n"));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn shell_equivalent_joins_argv() {
        let argv = vec!["sudo".to_string(), "dd".to_string(), "if=a".to_string()];
        assert_eq!(shell_equivalent(&argv), "sudo dd if=a");
    }
}
