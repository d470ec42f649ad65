// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! App repository fetching.
//!
//! Every app, and the shared widget collection, lives in its own Git
//! repository. A __repository record__ ties an app name to the local clone
//! of that repository. The record exclusively owns its clone directory.

use crate::config::RepoSource;

use auth_git2::{GitAuthenticator, Prompter};
use git2::{build::RepoBuilder, Config, FetchOptions, RemoteCallbacks, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{
    path::{Path, PathBuf},
    time,
};
use tracing::{debug, info, instrument};

/// Local clone of an app repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRecord {
    /// App name, unique within an installation.
    pub name: String,

    /// Remote URL, if known.
    pub url: Option<String>,

    /// Path to local clone.
    pub path: PathBuf,

    /// Branch checked out at clone time, if any.
    pub branch: Option<String>,
}

impl RepositoryRecord {
    /// Clone app repository into fresh destination.
    ///
    /// Missing parent directories of the destination are created.
    ///
    /// # Errors
    ///
    /// - Return [`FetchError::AlreadyExists`] if anything exists at
    ///   `destination`. Nothing is fetched in that case.
    /// - Return [`FetchError::CreateDir`] if parent directories cannot be
    ///   created.
    /// - Return any error of the fetcher.
    #[instrument(skip(fetcher, name, source, destination), level = "debug")]
    pub fn fetch(
        fetcher: &impl Fetcher,
        name: impl Into<String>,
        source: &RepoSource,
        destination: impl Into<PathBuf>,
        branch: Option<&str>,
    ) -> Result<Self> {
        let name = name.into();
        let path = destination.into();
        if path.symlink_metadata().is_ok() {
            return Err(FetchError::AlreadyExists { name, path });
        }

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            mkdirp::mkdirp(parent).map_err(|source| FetchError::CreateDir {
                source,
                path: parent.into(),
            })?;
        }

        info!("cloning {name} from {} into {}", source.url, path.display());
        fetcher.fetch(&source.url, &path, branch)?;

        Ok(Self {
            name,
            url: Some(source.url.clone()),
            path,
            branch: branch.map(Into::into),
        })
    }

    /// Open existing clone of app repository.
    ///
    /// The remote URL is taken from the clone's "origin" remote when the
    /// clone is a Git repository.
    ///
    /// # Errors
    ///
    /// - Return [`FetchError::SourceNotFound`] if nothing exists at `path`.
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let name = name.into();
        let path = path.into();
        if !path.exists() {
            return Err(FetchError::SourceNotFound { name, path });
        }

        let url = Repository::open(&path).ok().and_then(|repository| {
            repository
                .find_remote("origin")
                .ok()
                .and_then(|remote| remote.url().map(ToString::to_string))
        });
        debug!("opened {name} at {} (origin {url:?})", path.display());

        Ok(Self {
            name,
            url,
            path,
            branch: None,
        })
    }
}

/// Fetch remote repository into local directory.
pub trait Fetcher {
    /// Clone `url` into `destination`, checking out `branch` if given.
    fn fetch(&self, url: &str, destination: &Path, branch: Option<&str>) -> Result<()>;
}

/// Fetcher through libgit2.
///
/// The progress of the clone is displayed through a progress bar. If
/// credentials are required, the user is prompted for them, blocking the
/// progress bar for input.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Fetcher;

impl Fetcher for Git2Fetcher {
    fn fetch(&self, url: &str, destination: &Path, branch: Option<&str>) -> Result<()> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(url.to_string());
        bar.enable_steady_tick(time::Duration::from_millis(100));

        let prompter = IndicatifPrompter::new(bar);
        let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
        let config = Config::open_default()?;

        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            let stats = progress.to_owned();
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                prompter.bar.set_length(stats.total_objects() as u64);
                prompter.bar.set_position(stats.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let mut builder = RepoBuilder::new();
        builder.fetch_options(fo);
        if let Some(branch) = branch {
            builder.branch(branch);
        }

        let result = builder.clone(url, destination);
        prompter.bar.finish_and_clear();
        result?;

        Ok(())
    }
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| -> Option<String> {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

/// Repository fetching error types.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Destination of fresh clone is already populated.
    #[error("repository for {name} already exists at {:?}", path.display())]
    AlreadyExists { name: String, path: PathBuf },

    /// Expected local clone is missing.
    #[error("application repo {name} not found at {:?}", path.display())]
    SourceNotFound { name: String, path: PathBuf },

    /// Parent directories of destination cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = FetchError> = std::result::Result<T, E>;
