// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Developer workflows.
//!
//! Compose config resolution, repository fetching, and binding management
//! into the use cases exposed on the command line. Every step runs to
//! completion before the next one starts, and the first failure aborts the
//! whole workflow. Work already done, e.g., a clone without bindings, is left
//! in place.

use crate::{
    config::{ApplicationsConfig, ConfigError, RepoKind, VersionCatalog},
    download::{install_platform, DownloadError},
    installation::{Installation, InstallationError},
    path::{PathError, CORE_WIDGETS_CLONE_DIR},
    repository::{FetchError, Fetcher, Git2Fetcher, RepositoryRecord},
    symlink::{
        BindOutcome, Elevator, Linker, NativeLinker, Replace, SymlinkError, SymlinkManager,
        SystemElevator,
    },
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

/// Install Experience Builder version listed in version catalog file.
///
/// # Errors
///
/// - Return [`Error::Config`] if the catalog cannot be loaded.
/// - Return [`Error::Download`] if the version is unknown, or cannot be
///   downloaded and extracted.
pub async fn install(
    versions_file: impl AsRef<Path>,
    version: &str,
    destination: impl AsRef<Path>,
) -> Result<PathBuf> {
    let catalog = VersionCatalog::load(versions_file)?;
    Ok(install_platform(&catalog, version, destination).await?)
}

/// Runner of developer workflows.
#[derive(Debug)]
pub struct Workflow<F = Git2Fetcher, L = NativeLinker, E = SystemElevator>
where
    F: Fetcher,
    L: Linker,
    E: Elevator,
{
    fetcher: F,
    manager: SymlinkManager<L, E>,
}

impl Workflow {
    /// Construct workflow runner for current host.
    pub fn new() -> Self {
        Self::with_parts(Git2Fetcher, SymlinkManager::new())
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl<F, L, E> Workflow<F, L, E>
where
    F: Fetcher,
    L: Linker,
    E: Elevator,
{
    /// Construct workflow runner from explicit parts.
    pub fn with_parts(fetcher: F, manager: SymlinkManager<L, E>) -> Self {
        Self { fetcher, manager }
    }

    pub fn manager(&self) -> &SymlinkManager<L, E> {
        &self.manager
    }

    /// Clone every repository listed in applications config.
    ///
    /// Applications are cloned into `<destination>/<app>`, then the shared
    /// widgets into `<destination>/core_widgets`. Stops at the first failure.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Config`] if the config cannot be loaded.
    /// - Return [`Error::Fetch`] if any clone fails.
    #[instrument(skip(self, config_file, destination), level = "debug")]
    pub fn clone_all(
        &self,
        config_file: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        branch: Option<&str>,
    ) -> Result<Vec<RepositoryRecord>> {
        let config = ApplicationsConfig::load(config_file)?;
        let destination = destination.as_ref();

        let mut records = Vec::new();
        for name in config.applications.keys() {
            let source = config.resolve(name)?;
            records.push(RepositoryRecord::fetch(
                &self.fetcher,
                name,
                &source,
                destination.join(name),
                branch,
            )?);
        }

        if config.core_widgets.is_some() {
            let source = config.resolve(RepoKind::CoreWidgets.as_str())?;
            records.push(RepositoryRecord::fetch(
                &self.fetcher,
                RepoKind::CoreWidgets.as_str(),
                &source,
                destination.join(CORE_WIDGETS_CLONE_DIR),
                branch,
            )?);
        }

        info!("cloned {} repositories into {}", records.len(), destination.display());
        Ok(records)
    }

    /// Clone one application, or the shared widgets, into
    /// `<destination>/<app_name>`.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Config`] if the config cannot be loaded, or the name
    ///   is not listed in it.
    /// - Return [`Error::Fetch`] if the clone fails.
    #[instrument(skip(self, config_file, destination), level = "debug")]
    pub fn clone_single(
        &self,
        app_name: &str,
        config_file: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        branch: Option<&str>,
    ) -> Result<RepositoryRecord> {
        let source = ApplicationsConfig::load(config_file)?.resolve(app_name)?;
        Ok(RepositoryRecord::fetch(
            &self.fetcher,
            app_name,
            &source,
            destination.as_ref().join(app_name),
            branch,
        )?)
    }

    /// Clone app into `<repos_dir>/<app_name>`, bind it into installation, and
    /// register it.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Config`] if the config cannot be loaded, or the name
    ///   is not listed in it.
    /// - Return [`Error::Fetch`] if the clone fails.
    /// - Return [`Error::Installation`] if binding or registration fails.
    #[instrument(skip(self, config_file, installation, repos_dir), level = "debug")]
    pub fn clone_and_link<'a>(
        &self,
        app_name: &str,
        config_file: impl AsRef<Path>,
        installation: &'a mut Installation,
        repos_dir: impl AsRef<Path>,
    ) -> Result<&'a RepositoryRecord> {
        let source = ApplicationsConfig::load(config_file)?.resolve(app_name)?;
        let record = RepositoryRecord::fetch(
            &self.fetcher,
            app_name,
            &source,
            repos_dir.as_ref().join(app_name),
            None,
        )?;

        installation.link_app(&self.manager, &record)?;
        info!("{app_name} setup complete with symlinks");
        Ok(installation.register(record)?)
    }

    /// Bind existing clone at `<repos_dir>/<app_name>` into installation, and
    /// register it.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Fetch`] if the clone does not exist.
    /// - Return [`Error::Installation`] if binding or registration fails.
    #[instrument(skip(self, installation, repos_dir), level = "debug")]
    pub fn link_existing<'a>(
        &self,
        app_name: &str,
        installation: &'a mut Installation,
        repos_dir: impl AsRef<Path>,
    ) -> Result<&'a RepositoryRecord> {
        let record = RepositoryRecord::open(app_name, repos_dir.as_ref().join(app_name))?;
        installation.link_app(&self.manager, &record)?;
        Ok(installation.register(record)?)
    }

    /// Rebind config folder of existing clone at `<repos_dir>/<app_name>`.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Fetch`] if the clone does not exist.
    /// - Return [`Error::Installation`] if rebinding fails.
    pub fn link_config_folder(
        &self,
        app_name: &str,
        installation: &Installation,
        repos_dir: impl AsRef<Path>,
        replace: Replace,
    ) -> Result<BindOutcome> {
        let record = RepositoryRecord::open(app_name, repos_dir.as_ref().join(app_name))?;
        Ok(installation.link_app_config_folder(&self.manager, &record, replace)?)
    }

    /// Tear down bindings of app whose clone lives at `<repos_dir>/<app_name>`.
    ///
    /// The app is registered first if the installation does not know it yet.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Fetch`] if an unregistered app has no clone.
    /// - Return [`Error::Installation`] if bindings cannot be removed.
    #[instrument(skip(self, installation, repos_dir), level = "debug")]
    pub fn unlink(
        &self,
        app_name: &str,
        installation: &mut Installation,
        repos_dir: impl AsRef<Path>,
    ) -> Result<RepositoryRecord> {
        if installation.app(app_name).is_none() {
            let record = RepositoryRecord::open(app_name, repos_dir.as_ref().join(app_name))?;
            installation.register(record)?;
        }

        Ok(installation.remove_app(&self.manager, app_name)?)
    }
}

/// Broad classification of failures.
///
/// Each kind maps to its own process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigMissing,
    IdentifierNotFound,
    AlreadyExists,
    SourceNotFound,
    PermissionDenied,
    FailedElevation,
    UnsupportedPlatform,
    ExternalProcessFailure,
    ConflictingPath,
    InvalidInstallation,
    Other,
}

impl ErrorKind {
    /// Process exit code of error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Other => 1,
            Self::ConfigMissing => 2,
            Self::IdentifierNotFound => 3,
            Self::AlreadyExists => 4,
            Self::SourceNotFound => 5,
            Self::PermissionDenied => 6,
            Self::FailedElevation => 7,
            Self::UnsupportedPlatform => 8,
            Self::ExternalProcessFailure => 9,
            Self::ConflictingPath => 10,
            Self::InvalidInstallation => 11,
        }
    }

    fn of_io(error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists,
            _ => Self::Other,
        }
    }

    fn of_config(error: &ConfigError) -> Self {
        match error {
            ConfigError::Missing { .. } => Self::ConfigMissing,
            ConfigError::IdentifierNotFound { .. } => Self::IdentifierNotFound,
            ConfigError::Read { source, .. } => Self::of_io(source),
            ConfigError::Deserialize(_) => Self::Other,
        }
    }

    fn of_fetch(error: &FetchError) -> Self {
        match error {
            FetchError::AlreadyExists { .. } => Self::AlreadyExists,
            FetchError::SourceNotFound { .. } => Self::SourceNotFound,
            FetchError::CreateDir { source, .. } => Self::of_io(source),
            FetchError::Git2(_) => Self::ExternalProcessFailure,
            FetchError::IndicatifStyleTemplate(_) => Self::Other,
        }
    }

    fn of_symlink(error: &SymlinkError) -> Self {
        match error {
            SymlinkError::Create { source, .. }
            | SymlinkError::Inspect { source, .. }
            | SymlinkError::Remove { source, .. } => Self::of_io(source),
            SymlinkError::FailedElevation { .. } => Self::FailedElevation,
            SymlinkError::UnsupportedPlatform { .. } => Self::UnsupportedPlatform,
            SymlinkError::ConflictingPath { .. } => Self::ConflictingPath,
        }
    }

    fn of_installation(error: &InstallationError) -> Self {
        match error {
            InstallationError::InvalidLayout { .. } => Self::InvalidInstallation,
            InstallationError::SourceNotFound { .. } => Self::SourceNotFound,
            InstallationError::AlreadyRegistered { .. } => Self::AlreadyExists,
            InstallationError::UnknownApp { .. } => Self::IdentifierNotFound,
            InstallationError::ReadDir { source, .. } => Self::of_io(source),
            InstallationError::Symlink(error) => Self::of_symlink(error),
            InstallationError::Fetch(error) => Self::of_fetch(error),
        }
    }

    fn of_download(error: &DownloadError) -> Self {
        match error {
            DownloadError::Config(error) => Self::of_config(error),
            DownloadError::Request(_)
            | DownloadError::HttpStatus { .. }
            | DownloadError::Zip(_) => Self::ExternalProcessFailure,
            DownloadError::Io { source, .. } => Self::of_io(source),
            DownloadError::IndicatifStyleTemplate(_) => Self::Other,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{self:?}")
    }
}

/// All possible error types of developer workflows.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Symlink(#[from] SymlinkError),

    #[error(transparent)]
    Installation(#[from] InstallationError),

    #[error(transparent)]
    Download(#[from] DownloadError),
}

impl Error {
    /// Classify error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(error) => ErrorKind::of_config(error),
            Self::Path(_) => ErrorKind::Other,
            Self::Fetch(error) => ErrorKind::of_fetch(error),
            Self::Symlink(error) => ErrorKind::of_symlink(error),
            Self::Installation(error) => ErrorKind::of_installation(error),
            Self::Download(error) => ErrorKind::of_download(error),
        }
    }

    /// Process exit code of error.
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{
        repository,
        symlink::{CommandOutput, Platform, RecordingElevator},
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{
        cell::RefCell,
        fs::{create_dir_all, read_link, write},
    };

    const CONFIG: &str = indoc! {r#"
        {
            "Applications": {
                "app1": "https://x/app1.git",
                "app2": "https://x/app2.git"
            },
            "Core_Widgets": "https://x/widgets.git"
        }
    "#};

    #[derive(Default)]
    struct FakeFetcher {
        urls: RefCell<Vec<String>>,
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, url: &str, destination: &Path, _branch: Option<&str>) -> repository::Result<()> {
            for folder in ["Widgets", "AppConfig", "config"] {
                create_dir_all(destination.join(folder)).map_err(|source| {
                    FetchError::CreateDir {
                        source,
                        path: destination.into(),
                    }
                })?;
            }
            self.urls.borrow_mut().push(url.into());
            Ok(())
        }
    }

    type TestWorkflow = Workflow<FakeFetcher, NativeLinker, RecordingElevator>;

    fn workflow() -> TestWorkflow {
        Workflow::with_parts(
            FakeFetcher::default(),
            SymlinkManager::with_parts(
                Platform::Posix,
                NativeLinker,
                RecordingElevator::new(CommandOutput::default()),
            ),
        )
    }

    fn installation() -> anyhow::Result<Installation> {
        create_dir_all("exb/client")?;
        create_dir_all("exb/server/public/apps")?;
        Ok(Installation::open("exb", None)?)
    }

    #[sealed_test]
    fn clone_all_clones_apps_then_widgets() -> anyhow::Result<()> {
        write("applications.json", CONFIG)?;
        let workflow = workflow();

        let records = workflow.clone_all("applications.json", "repos", Some("dev"))?;
        let paths = records.iter().map(|r| r.path.clone()).collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("repos/app1"),
                PathBuf::from("repos/app2"),
                PathBuf::from("repos/core_widgets"),
            ]
        );
        assert_eq!(
            workflow.fetcher.urls.borrow().as_slice(),
            &["https://x/app1.git", "https://x/app2.git", "https://x/widgets.git"]
        );
        assert!(records.iter().all(|r| r.branch.as_deref() == Some("dev")));
        Ok(())
    }

    #[sealed_test]
    fn clone_all_stops_at_first_failure() -> anyhow::Result<()> {
        write("applications.json", CONFIG)?;
        create_dir_all("repos/app2")?;
        let workflow = workflow();

        let result = workflow.clone_all("applications.json", "repos", None);
        assert!(matches!(result, Err(ref error) if error.kind() == ErrorKind::AlreadyExists));
        assert_eq!(workflow.fetcher.urls.borrow().as_slice(), &["https://x/app1.git"]);
        Ok(())
    }

    #[sealed_test]
    fn clone_single_core_widgets() -> anyhow::Result<()> {
        write("applications.json", CONFIG)?;
        let record = workflow().clone_single("core-widgets", "applications.json", "repos", None)?;
        assert_eq!(record.path, PathBuf::from("repos/core-widgets"));
        assert_eq!(record.url.as_deref(), Some("https://x/widgets.git"));
        Ok(())
    }

    #[sealed_test]
    fn clone_single_unknown_app() -> anyhow::Result<()> {
        write("applications.json", CONFIG)?;
        let workflow = workflow();
        let result = workflow.clone_single("nope", "applications.json", "repos", None);
        let error = result.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::IdentifierNotFound);
        assert!(error.to_string().contains("nope"));
        assert!(workflow.fetcher.urls.borrow().is_empty());
        Ok(())
    }

    #[sealed_test]
    fn missing_config_file() {
        let result = workflow().clone_all("applications.json", "repos", None);
        assert!(matches!(result, Err(ref error) if error.exit_code() == 2));
    }

    #[sealed_test]
    fn clone_and_link_registers_app() -> anyhow::Result<()> {
        write("applications.json", CONFIG)?;
        let mut installation = installation()?;

        let record = workflow().clone_and_link("app1", "applications.json", &mut installation, "repos")?;
        assert_eq!(record.path, PathBuf::from("repos/app1"));
        assert_eq!(
            read_link("exb/client/app1_widgets")?,
            PathBuf::from("repos/app1/Widgets")
        );
        assert_eq!(
            read_link("exb/server/public/0")?,
            PathBuf::from("repos/app1/AppConfig")
        );
        assert!(installation.app("app1").is_some());
        Ok(())
    }

    #[sealed_test]
    fn link_existing_then_unlink() -> anyhow::Result<()> {
        let mut installation = installation()?;
        create_dir_all("repos/app1/Widgets")?;
        create_dir_all("repos/app1/AppConfig")?;
        let workflow = workflow();

        workflow.link_existing("app1", &mut installation, "repos")?;
        assert!(read_link("exb/client/app1_widgets").is_ok());

        let mut reopened = Installation::open("exb", None)?;
        workflow.unlink("app1", &mut reopened, "repos")?;
        assert!(read_link("exb/client/app1_widgets").is_err());
        assert!(read_link("exb/server/public/0").is_err());
        Ok(())
    }

    #[sealed_test]
    fn link_existing_requires_clone() -> anyhow::Result<()> {
        let mut installation = installation()?;
        let result = workflow().link_existing("app1", &mut installation, "repos");
        assert!(matches!(result, Err(ref error) if error.kind() == ErrorKind::SourceNotFound));
        Ok(())
    }

    #[sealed_test]
    fn link_config_folder_conflict() -> anyhow::Result<()> {
        let installation = installation()?;
        create_dir_all("repos/app1/config")?;
        create_dir_all("exb/app1/config")?;
        let workflow = workflow();

        let result = workflow.link_config_folder("app1", &installation, "repos", Replace::LinksOnly);
        assert!(matches!(result, Err(ref error) if error.kind() == ErrorKind::ConflictingPath));

        workflow.link_config_folder("app1", &installation, "repos", Replace::Force)?;
        assert_eq!(read_link("exb/app1/config")?, PathBuf::from("repos/app1/config"));
        Ok(())
    }

    #[test]
    fn exit_codes_are_distinct() {
        let kinds = [
            ErrorKind::Other,
            ErrorKind::ConfigMissing,
            ErrorKind::IdentifierNotFound,
            ErrorKind::AlreadyExists,
            ErrorKind::SourceNotFound,
            ErrorKind::PermissionDenied,
            ErrorKind::FailedElevation,
            ErrorKind::UnsupportedPlatform,
            ErrorKind::ExternalProcessFailure,
            ErrorKind::ConflictingPath,
            ErrorKind::InvalidInstallation,
        ];
        let mut codes = kinds.iter().map(ErrorKind::exit_code).collect::<Vec<_>>();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn elevation_errors_keep_their_kind() {
        let error = Error::from(InstallationError::Symlink(SymlinkError::FailedElevation {
            link: "link".into(),
            message: "denied".into(),
        }));
        assert_eq!(error.kind(), ErrorKind::FailedElevation);

        let error = Error::from(SymlinkError::UnsupportedPlatform {
            platform: "plan9".into(),
        });
        assert_eq!(error.exit_code(), 8);
    }
}
