// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Symlink management.
//!
//! An Experience Builder installation only sees an app repository through
//! __bindings__: symbolic links placed at fixed offsets inside the
//! installation that point into the app's clone. A binding is nothing more
//! than a pair of paths, i.e., the link path and its target path. It is not
//! persisted anywhere else.
//!
//! # Binding Creation
//!
//! A binding is created directly first. If, and only if, the operating system
//! denies link creation for lack of privileges, exb-dev falls back to creating
//! the same link through an elevated command. Windows hosts request
//! administrator consent through PowerShell, Linux and macOS hosts go through
//! sudo. Any other failure is fatal for the binding, and nothing is ever
//! retried.
//!
//! Targets are never validated. A dangling link is a perfectly valid binding
//! until something tries to dereference it.
//!
//! # Replacement
//!
//! Plain binding refuses to touch an existing entry at the link path.
//! Rebinding removes the existing entry first, which makes it idempotent. By
//! default only an existing symlink is removed, because a real file or
//! directory at a link path is most likely user data. Callers can opt into
//! [`Replace::Force`] to remove whatever sits there.

use std::{
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{self, Metadata},
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{debug, info, instrument, warn};

/// Create symlinks at the file system level.
pub trait Linker {
    /// Create symlink at `link` pointing to `target`.
    fn link(&self, target: &Path, link: &Path) -> io::Result<()>;
}

/// Linker backed by the host operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLinker;

impl Linker for NativeLinker {
    #[cfg(unix)]
    fn link(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    fn link(&self, target: &Path, link: &Path) -> io::Result<()> {
        if target.is_file() {
            std::os::windows::fs::symlink_file(target, link)
        } else {
            std::os::windows::fs::symlink_dir(target, link)
        }
    }

    #[cfg(not(any(unix, windows)))]
    fn link(&self, _target: &Path, _link: &Path) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

/// Run commands with elevated privileges.
pub trait Elevator {
    /// Run already elevated command to completion.
    fn run(&self, command: &ElevatedCommand) -> io::Result<CommandOutput>;
}

/// Elevator that spawns the elevated command as a child process.
///
/// Standard input and output are inherited so the user can answer password
/// or consent prompts. Standard error is captured for error reporting.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemElevator;

impl Elevator for SystemElevator {
    fn run(&self, command: &ElevatedCommand) -> io::Result<CommandOutput> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()?;

        Ok(CommandOutput {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        })
    }
}

/// Result of an elevated command.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, if the command was not terminated by a signal.
    pub code: Option<i32>,

    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Command to run under elevated privileges.
///
/// Always an argument vector. Never handed to a shell as one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevatedCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl Display for ElevatedCommand {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.program.to_string_lossy().as_ref())?;
        for arg in &self.args {
            write!(fmt, " {}", arg.to_string_lossy())?;
        }

        Ok(())
    }
}

/// Host operating system family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Windows,

    /// Linux and macOS.
    Posix,

    /// Anything else, by name.
    Other(String),
}

impl Platform {
    /// Detect platform of current host.
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Classify platform by [`std::env::consts::OS`] name.
    pub fn from_os(os: impl AsRef<str>) -> Self {
        match os.as_ref() {
            "windows" => Self::Windows,
            "linux" | "macos" => Self::Posix,
            other => Self::Other(other.into()),
        }
    }

    /// Build elevated command that creates symlink at `link` to `target`.
    ///
    /// # Errors
    ///
    /// - Return [`SymlinkError::UnsupportedPlatform`] for unknown platforms.
    pub fn link_command(&self, target: &Path, link: &Path) -> Result<ElevatedCommand> {
        match self {
            Self::Windows => Ok(windows_link_command(target, link)),
            Self::Posix => Ok(ElevatedCommand {
                program: "sudo".into(),
                args: vec![
                    "ln".into(),
                    "-s".into(),
                    "--".into(),
                    target.as_os_str().to_owned(),
                    link.as_os_str().to_owned(),
                ],
            }),
            Self::Other(name) => Err(SymlinkError::UnsupportedPlatform {
                platform: name.clone(),
            }),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Windows => fmt.write_str("windows"),
            Self::Posix => fmt.write_str("posix"),
            Self::Other(name) => fmt.write_str(name),
        }
    }
}

// Start-Process runs cmd.exe's mklink under the RunAs verb and hands back its
// exit code. PowerShell literals only need doubled single quotes, and Windows
// paths cannot contain double quotes.
fn windows_link_command(target: &Path, link: &Path) -> ElevatedCommand {
    let mut mklink = vec!["/c".to_string(), "mklink".to_string()];
    if !target.is_file() {
        mklink.push("/D".into());
    }
    mklink.push(format!("\"{}\"", link.display()));
    mklink.push(format!("\"{}\"", target.display()));

    let argument_list = mklink
        .iter()
        .map(|arg| format!("'{}'", arg.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(",");
    let script = format!(
        "$p = Start-Process -FilePath 'cmd.exe' -ArgumentList {argument_list} \
         -Verb RunAs -Wait -PassThru -WindowStyle Hidden; exit $p.ExitCode"
    );

    ElevatedCommand {
        program: "powershell".into(),
        args: vec![
            "-NoProfile".into(),
            "-NonInteractive".into(),
            "-Command".into(),
            script.into(),
        ],
    }
}

/// How a rebind treats an entry that already exists at the link path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Replace {
    /// Remove existing symlinks only. Anything else is a conflict.
    #[default]
    LinksOnly,

    /// Remove whatever exists at the link path.
    ///
    /// Destroys real files and directories that happen to sit there.
    Force,
}

/// How a binding came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// Created directly.
    Created,

    /// Created through elevated command.
    CreatedElevated,
}

/// Create, replace, and remove bindings.
#[derive(Debug)]
pub struct SymlinkManager<L = NativeLinker, E = SystemElevator>
where
    L: Linker,
    E: Elevator,
{
    platform: Platform,
    linker: L,
    elevator: E,
}

impl SymlinkManager {
    /// Construct manager for current host.
    pub fn new() -> Self {
        Self::with_parts(Platform::current(), NativeLinker, SystemElevator)
    }
}

impl Default for SymlinkManager {
    fn default() -> Self {
        Self::new()
    }
}

impl<L, E> SymlinkManager<L, E>
where
    L: Linker,
    E: Elevator,
{
    /// Construct manager from explicit parts.
    pub fn with_parts(platform: Platform, linker: L, elevator: E) -> Self {
        Self {
            platform,
            linker,
            elevator,
        }
    }

    /// Platform elevation is dispatched on.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn elevator(&self) -> &E {
        &self.elevator
    }

    /// Create binding at `link` pointing to `target`.
    ///
    /// Falls back to [`bind_with_elevation`](Self::bind_with_elevation) once
    /// if the operating system denies link creation for lack of privileges.
    ///
    /// # Errors
    ///
    /// - Return [`SymlinkError::Create`] if link creation fails for any reason
    ///   other than missing privileges, e.g., an entry already exists at
    ///   `link`, or its parent directory is missing.
    /// - Return any error of the elevation fallback.
    #[instrument(skip(self, target, link), level = "debug")]
    pub fn bind(&self, target: impl AsRef<Path>, link: impl AsRef<Path>) -> Result<BindOutcome> {
        let (target, link) = (target.as_ref(), link.as_ref());
        match self.linker.link(target, link) {
            Ok(()) => {
                info!("symlink created: {} -> {}", link.display(), target.display());
                Ok(BindOutcome::Created)
            }
            Err(error) if is_permission_denied(&error) => {
                warn!("admin privileges required to create symlink {}", link.display());
                self.bind_with_elevation(target, link)
            }
            Err(source) => Err(SymlinkError::Create {
                source,
                link: link.into(),
                target: target.into(),
            }),
        }
    }

    /// Create binding through an elevated command.
    ///
    /// Exactly one elevated command is run. A failed elevation is terminal for
    /// the binding.
    ///
    /// # Errors
    ///
    /// - Return [`SymlinkError::UnsupportedPlatform`] if the platform has no
    ///   elevation method. Nothing is executed in that case.
    /// - Return [`SymlinkError::FailedElevation`] if the elevated command
    ///   cannot be spawned, or exits unsuccessfully.
    #[instrument(skip(self, target, link), level = "debug")]
    pub fn bind_with_elevation(
        &self,
        target: impl AsRef<Path>,
        link: impl AsRef<Path>,
    ) -> Result<BindOutcome> {
        let (target, link) = (target.as_ref(), link.as_ref());
        let command = self.platform.link_command(target, link)?;
        info!("run with elevated privileges: {command}");

        let output = self
            .elevator
            .run(&command)
            .map_err(|error| SymlinkError::FailedElevation {
                link: link.into(),
                message: error.to_string(),
            })?;

        if !output.success() {
            let message = match (output.stderr.is_empty(), output.code) {
                (false, _) => output.stderr,
                (true, Some(code)) => format!("exit code {code}"),
                (true, None) => "terminated by signal".into(),
            };
            return Err(SymlinkError::FailedElevation {
                link: link.into(),
                message,
            });
        }

        info!(
            "symlink created with elevated privileges: {} -> {}",
            link.display(),
            target.display()
        );
        Ok(BindOutcome::CreatedElevated)
    }

    /// Replace whatever exists at `link` with binding to `target`.
    ///
    /// Calling this repeatedly with the same arguments always leaves exactly
    /// one link at `link` pointing to `target`.
    ///
    /// # Errors
    ///
    /// - Return [`SymlinkError::ConflictingPath`] if a non-link entry exists at
    ///   `link` under [`Replace::LinksOnly`].
    /// - Return [`SymlinkError::Inspect`] or [`SymlinkError::Remove`] if the
    ///   existing entry cannot be inspected or removed.
    /// - Return any error of [`bind`](Self::bind).
    #[instrument(skip(self, target, link), level = "debug")]
    pub fn rebind(
        &self,
        target: impl AsRef<Path>,
        link: impl AsRef<Path>,
        replace: Replace,
    ) -> Result<BindOutcome> {
        let (target, link) = (target.as_ref(), link.as_ref());
        if let Some(metadata) = inspect(link)? {
            remove_entry(link, &metadata, replace)?;
        }

        self.bind(target, link)
    }

    /// Remove binding at `link`.
    ///
    /// Only symlinks are removed. Returns `false` if there was no symlink to
    /// remove.
    ///
    /// # Errors
    ///
    /// - Return [`SymlinkError::Inspect`] or [`SymlinkError::Remove`] if the
    ///   entry cannot be inspected or removed.
    #[instrument(skip(self, link), level = "debug")]
    pub fn unbind(&self, link: impl AsRef<Path>) -> Result<bool> {
        let link = link.as_ref();
        match inspect(link)? {
            Some(metadata) if metadata.file_type().is_symlink() => {
                remove_link(link)?;
                info!("symlink removed: {}", link.display());
                Ok(true)
            }
            Some(_) => {
                warn!("not a symlink, leaving {} alone", link.display());
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

fn inspect(link: &Path) -> Result<Option<Metadata>> {
    match fs::symlink_metadata(link) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SymlinkError::Inspect {
            source,
            link: link.into(),
        }),
    }
}

fn remove_entry(link: &Path, metadata: &Metadata, replace: Replace) -> Result<()> {
    if metadata.file_type().is_symlink() {
        debug!("remove existing symlink {}", link.display());
        return remove_link(link);
    }

    match replace {
        Replace::LinksOnly => Err(SymlinkError::ConflictingPath { link: link.into() }),
        Replace::Force => {
            warn!("forcefully removing non-symlink entry {}", link.display());
            let result = if metadata.is_dir() {
                fs::remove_dir_all(link)
            } else {
                fs::remove_file(link)
            };
            result.map_err(|source| SymlinkError::Remove {
                source,
                link: link.into(),
            })
        }
    }
}

// INVARIANT: Directory symlinks on Windows must be removed as directories.
fn remove_link(link: &Path) -> Result<()> {
    fs::remove_file(link)
        .or_else(|error| {
            if cfg!(windows) {
                fs::remove_dir(link)
            } else {
                Err(error)
            }
        })
        .map_err(|source| SymlinkError::Remove {
            source,
            link: link.into(),
        })
}

fn is_permission_denied(error: &io::Error) -> bool {
    // ERROR_PRIVILEGE_NOT_HELD is what Windows reports without developer mode.
    const ERROR_PRIVILEGE_NOT_HELD: i32 = 1314;

    error.kind() == io::ErrorKind::PermissionDenied
        || (cfg!(windows) && error.raw_os_error() == Some(ERROR_PRIVILEGE_NOT_HELD))
}

/// Elevator that records commands instead of running them.
///
/// Answers every command with a preset output.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingElevator {
    output: CommandOutput,
    commands: std::cell::RefCell<Vec<ElevatedCommand>>,
}

#[cfg(test)]
impl RecordingElevator {
    pub(crate) fn new(output: CommandOutput) -> Self {
        Self {
            output,
            commands: std::cell::RefCell::new(Vec::new()),
        }
    }

    /// Commands received so far.
    pub(crate) fn commands(&self) -> Vec<ElevatedCommand> {
        self.commands.borrow().clone()
    }
}

#[cfg(test)]
impl Elevator for RecordingElevator {
    fn run(&self, command: &ElevatedCommand) -> io::Result<CommandOutput> {
        self.commands.borrow_mut().push(command.clone());
        Ok(self.output.clone())
    }
}

/// Symlink error types.
#[derive(Debug, thiserror::Error)]
pub enum SymlinkError {
    /// Link creation failed for reasons other than missing privileges.
    #[error("failed to create symlink {:?} -> {:?}", link.display(), target.display())]
    Create {
        #[source]
        source: io::Error,
        link: PathBuf,
        target: PathBuf,
    },

    /// Elevated link creation failed.
    #[error("failed to create symlink {:?} with elevated privileges: {message}", link.display())]
    FailedElevation { link: PathBuf, message: String },

    /// No elevation method exists for host platform.
    #[error("unsupported platform for privilege elevation: {platform}")]
    UnsupportedPlatform { platform: String },

    /// Non-link entry occupies link path.
    #[error("refusing to replace {:?}: existing entry is not a symlink", link.display())]
    ConflictingPath { link: PathBuf },

    /// Existing entry at link path cannot be inspected.
    #[error("failed to inspect {:?}", link.display())]
    Inspect {
        #[source]
        source: io::Error,
        link: PathBuf,
    },

    /// Existing entry at link path cannot be removed.
    #[error("failed to remove {:?}", link.display())]
    Remove {
        #[source]
        source: io::Error,
        link: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SymlinkError> = std::result::Result<T, E>;
