// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Experience Builder installation.
//!
//! An __installation__ is a local copy of Experience Builder Developer
//! Edition. Its files are managed by the platform itself. Exb-dev only adds
//! bindings into it, and keeps a registry of the app repositories it has
//! processed.
//!
//! # Installation Layout
//!
//! A valid installation root always contains `client/` and
//! `server/public/apps/`. Bindings land at fixed offsets:
//!
//! - `client/<app>_widgets` points to `<clone>/Widgets`.
//! - `server/public/0` points to `<clone>/AppConfig`. This slot is shared,
//!   so only one app's config can occupy it at a time.
//! - `<app>/config` points to `<clone>/config`, and is always rebound.

use crate::{
    path::{
        app_config_folder_link, app_config_link, widgets_link, CLIENT_DIR, REPO_APP_CONFIG_DIR,
        REPO_CONFIG_DIR, REPO_WIDGETS_DIR, SERVER_APPS_DIR,
    },
    repository::{FetchError, RepositoryRecord},
    symlink::{BindOutcome, Elevator, Linker, Replace, SymlinkError, SymlinkManager},
};

use std::{
    collections::BTreeMap,
    fs::{read_dir, read_link},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Local Experience Builder installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    root: PathBuf,
    version: Option<String>,
    apps: BTreeMap<String, RepositoryRecord>,
}

impl Installation {
    /// Open existing installation.
    ///
    /// # Errors
    ///
    /// - Return [`InstallationError::InvalidLayout`] if the client or server
    ///   apps directory is missing.
    pub fn open(root: impl Into<PathBuf>, version: Option<String>) -> Result<Self> {
        let installation = Self {
            root: root.into(),
            version,
            apps: BTreeMap::new(),
        };
        installation.client_dir()?;
        installation.server_apps_dir()?;

        Ok(installation)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Client directory of installation.
    ///
    /// # Errors
    ///
    /// - Return [`InstallationError::InvalidLayout`] if it does not exist.
    pub fn client_dir(&self) -> Result<PathBuf> {
        existing_dir(self.root.join(CLIENT_DIR))
    }

    /// Server apps directory of installation.
    ///
    /// # Errors
    ///
    /// - Return [`InstallationError::InvalidLayout`] if it does not exist.
    pub fn server_apps_dir(&self) -> Result<PathBuf> {
        existing_dir(self.root.join(SERVER_APPS_DIR))
    }

    /// Registered app repository by name.
    pub fn app(&self, name: impl AsRef<str>) -> Option<&RepositoryRecord> {
        self.apps.get(name.as_ref())
    }

    /// Iterate through all registered app repositories.
    pub fn apps(&self) -> impl Iterator<Item = &RepositoryRecord> {
        self.apps.values()
    }

    /// Register app repository.
    ///
    /// # Errors
    ///
    /// - Return [`InstallationError::AlreadyRegistered`] if an app of the same
    ///   name is already registered.
    pub fn register(&mut self, record: RepositoryRecord) -> Result<&RepositoryRecord> {
        if self.apps.contains_key(&record.name) {
            return Err(InstallationError::AlreadyRegistered { name: record.name });
        }

        let name = record.name.clone();
        debug!("register {name} at {}", record.path.display());
        Ok(self.apps.entry(name).or_insert(record))
    }

    /// Register clones of apps already deployed to installation.
    ///
    /// Every directory in the server apps directory whose name matches a clone
    /// in `repos_dir` is registered. Apps that are already registered are
    /// skipped. Returns number of newly registered apps.
    ///
    /// # Errors
    ///
    /// - Return [`InstallationError::ReadDir`] if the server apps directory
    ///   cannot be read.
    #[instrument(skip(self, repos_dir), level = "debug")]
    pub fn discover_apps(&mut self, repos_dir: impl AsRef<Path>) -> Result<usize> {
        let apps_dir = self.server_apps_dir()?;
        let entries = read_dir(&apps_dir).map_err(|source| InstallationError::ReadDir {
            source,
            path: apps_dir.clone(),
        })?;

        let mut found = 0;
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let clone = repos_dir.as_ref().join(&name);
            if self.apps.contains_key(&name) || !clone.exists() {
                continue;
            }

            self.apps
                .insert(name.clone(), RepositoryRecord::open(name, clone)?);
            found += 1;
        }

        debug!("discovered {found} apps");
        Ok(found)
    }

    /// Bind app widgets into client area.
    ///
    /// # Errors
    ///
    /// - Return [`InstallationError::SourceNotFound`] if the clone is missing.
    /// - Return [`InstallationError::Symlink`] if binding fails.
    pub fn link_widgets<L, E>(
        &self,
        manager: &SymlinkManager<L, E>,
        record: &RepositoryRecord,
    ) -> Result<BindOutcome>
    where
        L: Linker,
        E: Elevator,
    {
        ensure_source(record)?;
        Ok(manager.bind(
            record.path.join(REPO_WIDGETS_DIR),
            widgets_link(&self.root, &record.name),
        )?)
    }

    /// Bind app config into the shared config slot.
    ///
    /// # Errors
    ///
    /// - Return [`InstallationError::SourceNotFound`] if the clone is missing.
    /// - Return [`InstallationError::Symlink`] if binding fails, e.g., the
    ///   slot is already occupied.
    pub fn link_app_config<L, E>(
        &self,
        manager: &SymlinkManager<L, E>,
        record: &RepositoryRecord,
    ) -> Result<BindOutcome>
    where
        L: Linker,
        E: Elevator,
    {
        ensure_source(record)?;
        Ok(manager.bind(
            record.path.join(REPO_APP_CONFIG_DIR),
            app_config_link(&self.root),
        )?)
    }

    /// Rebind app's own config folder.
    ///
    /// # Errors
    ///
    /// - Return [`InstallationError::SourceNotFound`] if the clone is missing.
    /// - Return [`InstallationError::Symlink`] if rebinding fails.
    pub fn link_app_config_folder<L, E>(
        &self,
        manager: &SymlinkManager<L, E>,
        record: &RepositoryRecord,
        replace: Replace,
    ) -> Result<BindOutcome>
    where
        L: Linker,
        E: Elevator,
    {
        ensure_source(record)?;
        Ok(manager.rebind(
            record.path.join(REPO_CONFIG_DIR),
            app_config_folder_link(&self.root, &record.name),
            replace,
        )?)
    }

    /// Bind app widgets and app config into installation.
    ///
    /// # Errors
    ///
    /// - Return [`InstallationError::SourceNotFound`] if the clone is missing.
    ///   No binding is attempted in that case.
    /// - Return [`InstallationError::Symlink`] if any binding fails.
    #[instrument(skip(self, manager, record), level = "debug")]
    pub fn link_app<L, E>(&self, manager: &SymlinkManager<L, E>, record: &RepositoryRecord) -> Result<()>
    where
        L: Linker,
        E: Elevator,
    {
        ensure_source(record)?;
        self.link_widgets(manager, record)?;
        self.link_app_config(manager, record)?;
        info!("{} linked into {}", record.name, self.root.display());

        Ok(())
    }

    /// Tear down bindings of app, then remove it from registry.
    ///
    /// Only symlinks that point into the app's clone are removed. The clone
    /// itself is left on disk.
    ///
    /// # Errors
    ///
    /// - Return [`InstallationError::UnknownApp`] if the app is not registered.
    /// - Return [`InstallationError::Symlink`] if a binding cannot be removed.
    ///   The app stays registered in that case.
    #[instrument(skip(self, manager, name), level = "debug")]
    pub fn remove_app<L, E>(
        &mut self,
        manager: &SymlinkManager<L, E>,
        name: impl AsRef<str>,
    ) -> Result<RepositoryRecord>
    where
        L: Linker,
        E: Elevator,
    {
        let name = name.as_ref();
        let record = self
            .apps
            .get(name)
            .ok_or_else(|| InstallationError::UnknownApp { name: name.into() })?;

        let links = [
            widgets_link(&self.root, name),
            app_config_link(&self.root),
            app_config_folder_link(&self.root, name),
        ];
        for link in links {
            // INVARIANT: Never tear down a binding owned by another app.
            let owned = read_link(&link)
                .map(|target| target.starts_with(&record.path))
                .unwrap_or(false);
            if owned {
                manager.unbind(&link)?;
            }
        }

        // INVARIANT: Keep app registered until every binding is gone.
        let record = self
            .apps
            .remove(name)
            .ok_or_else(|| InstallationError::UnknownApp { name: name.into() })?;
        info!("{name} removed from {}", self.root.display());
        Ok(record)
    }
}

fn existing_dir(path: PathBuf) -> Result<PathBuf> {
    if path.is_dir() {
        Ok(path)
    } else {
        Err(InstallationError::InvalidLayout { path })
    }
}

fn ensure_source(record: &RepositoryRecord) -> Result<()> {
    if record.path.exists() {
        Ok(())
    } else {
        Err(InstallationError::SourceNotFound {
            name: record.name.clone(),
            path: record.path.clone(),
        })
    }
}

/// Installation error types.
#[derive(Debug, thiserror::Error)]
pub enum InstallationError {
    /// Required installation directory is missing.
    #[error("not an Experience Builder installation, missing {:?}", path.display())]
    InvalidLayout { path: PathBuf },

    /// Clone of app is missing.
    #[error("application repo {name} not found at {:?}", path.display())]
    SourceNotFound { name: String, path: PathBuf },

    /// App is already registered.
    #[error("app {name} is already installed")]
    AlreadyRegistered { name: String },

    /// App is not registered.
    #[error("app {name} not found")]
    UnknownApp { name: String },

    /// Directory cannot be listed.
    #[error("failed to read directory {:?}", path.display())]
    ReadDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Binding management fails.
    #[error(transparent)]
    Symlink(#[from] SymlinkError),

    /// App repository cannot be opened.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Friendly result alias :3
pub type Result<T, E = InstallationError> = std::result::Result<T, E>;
