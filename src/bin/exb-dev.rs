// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use exb_dev::{
    installation::Installation,
    path::{absolute, expand},
    symlink::Replace,
    workflow::{self, Workflow},
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Manage Experience Builder installations and app repositories.
#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  exb-dev [options] <exb-dev-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        match self.command {
            Command::Install(opts) => run_install(opts).await,
            Command::Clone(opts) => run_clone(opts),
            Command::CloneSingleRepo(opts) => run_clone_single_repo(opts),
            Command::CloneAppAndSymlink(opts) => run_clone_app_and_symlink(opts),
            Command::LinkApp(opts) => run_link_app(opts),
            Command::LinkAppConfig(opts) => run_link_app_config(opts),
            Command::UnlinkApp(opts) => run_unlink_app(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Install specific version of Experience Builder.
    #[command(override_usage = "exb-dev install [options] --version <version>")]
    Install(InstallOptions),

    /// Clone every repository listed in config file.
    #[command(override_usage = "exb-dev clone [options]")]
    Clone(CloneOptions),

    /// Clone single repository from config file, including core widgets.
    #[command(
        name = "clone_single_repo",
        override_usage = "exb-dev clone_single_repo [options] --app-name <app_name>"
    )]
    CloneSingleRepo(CloneSingleRepoOptions),

    /// Clone app repository and symlink it into Experience Builder.
    #[command(
        name = "clone_app_and_symlink",
        override_usage = "exb-dev clone_app_and_symlink [options] --app-name <app_name> --config-file <path> --exb-path <path>"
    )]
    CloneAppAndSymlink(CloneAppAndSymlinkOptions),

    /// Symlink already cloned app repository into Experience Builder.
    #[command(
        name = "link_app",
        override_usage = "exb-dev link_app [options] --app-name <app_name> --exb-path <path>"
    )]
    LinkApp(LinkOptions),

    /// Symlink config folder of already cloned app into Experience Builder.
    #[command(
        name = "link_app_config",
        override_usage = "exb-dev link_app_config [options] --app-name <app_name> --exb-path <path>"
    )]
    LinkAppConfig(LinkAppConfigOptions),

    /// Remove symlinks of app from Experience Builder.
    #[command(
        name = "unlink_app",
        override_usage = "exb-dev unlink_app [options] --app-name <app_name> --exb-path <path>"
    )]
    UnlinkApp(LinkOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallOptions {
    /// Experience Builder version to install.
    #[arg(long, required = true, value_name = "version")]
    pub version: String,

    /// Directory where to install Experience Builder.
    #[arg(long, default_value = "./", value_name = "path")]
    pub destination: PathBuf,

    /// Path to version catalog.
    #[arg(long, default_value = "versions.json", value_name = "path")]
    pub versions_file: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CloneOptions {
    /// Path to applications config file.
    #[arg(long, default_value = "applications.json", value_name = "path")]
    pub config_file: PathBuf,

    /// Directory where to clone repositories.
    #[arg(long, default_value = "./", value_name = "path")]
    pub destination: PathBuf,

    /// Branch to check out for each repository.
    #[arg(long, value_name = "branch")]
    pub branch: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CloneSingleRepoOptions {
    /// Name of application, or "core-widgets", to clone.
    #[arg(long, required = true, value_name = "app_name")]
    pub app_name: String,

    /// Path to applications config file.
    #[arg(long, default_value = "applications.json", value_name = "path")]
    pub config_file: PathBuf,

    /// Directory where to clone repository.
    #[arg(long, default_value = "./", value_name = "path")]
    pub destination: PathBuf,

    /// Branch to check out.
    #[arg(long, value_name = "branch")]
    pub branch: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CloneAppAndSymlinkOptions {
    /// Name of application to clone.
    #[arg(long, required = true, value_name = "app_name")]
    pub app_name: String,

    /// Path to applications config file.
    #[arg(long, required = true, value_name = "path")]
    pub config_file: PathBuf,

    /// Path to Experience Builder installation.
    #[arg(long, required = true, value_name = "path")]
    pub exb_path: PathBuf,

    /// Directory where to clone repository.
    #[arg(long, default_value = "./", value_name = "path")]
    pub repos_dir: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct LinkOptions {
    /// Name of application.
    #[arg(long, required = true, value_name = "app_name")]
    pub app_name: String,

    /// Path to Experience Builder installation.
    #[arg(long, required = true, value_name = "path")]
    pub exb_path: PathBuf,

    /// Directory containing app clones.
    #[arg(long, default_value = "./", value_name = "path")]
    pub repos_dir: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct LinkAppConfigOptions {
    #[command(flatten)]
    pub link: LinkOptions,

    /// Replace whatever exists at link path, even real files.
    #[arg(short, long)]
    pub force: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_default();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        let code = error
            .downcast_ref::<workflow::Error>()
            .map(workflow::Error::exit_code)
            .unwrap_or(1);
        exit(code);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

async fn run_install(opts: InstallOptions) -> Result<()> {
    let destination = expand(&opts.destination).map_err(workflow::Error::from)?;
    let versions_file = expand(&opts.versions_file).map_err(workflow::Error::from)?;
    workflow::install(versions_file, &opts.version, &destination).await?;
    info!(
        "successfully installed Experience Builder version {} into {}",
        opts.version,
        destination.display()
    );

    Ok(())
}

fn run_clone(opts: CloneOptions) -> Result<()> {
    let config_file = expand(&opts.config_file).map_err(workflow::Error::from)?;
    let destination = expand(&opts.destination).map_err(workflow::Error::from)?;
    Workflow::new().clone_all(&config_file, &destination, opts.branch.as_deref())?;
    info!(
        "successfully cloned repositories from {} into {}",
        config_file.display(),
        destination.display()
    );

    Ok(())
}

fn run_clone_single_repo(opts: CloneSingleRepoOptions) -> Result<()> {
    let config_file = expand(&opts.config_file).map_err(workflow::Error::from)?;
    let destination = expand(&opts.destination).map_err(workflow::Error::from)?;
    let record = Workflow::new().clone_single(
        &opts.app_name,
        config_file,
        destination,
        opts.branch.as_deref(),
    )?;
    info!(
        "successfully cloned {} into {}",
        record.name,
        record.path.display()
    );

    Ok(())
}

fn run_clone_app_and_symlink(opts: CloneAppAndSymlinkOptions) -> Result<()> {
    let config_file = expand(&opts.config_file).map_err(workflow::Error::from)?;
    let repos_dir = absolute(&opts.repos_dir).map_err(workflow::Error::from)?;
    let mut installation = open_installation(&opts.exb_path)?;
    Workflow::new().clone_and_link(&opts.app_name, config_file, &mut installation, repos_dir)?;

    Ok(())
}

fn run_link_app(opts: LinkOptions) -> Result<()> {
    let repos_dir = absolute(&opts.repos_dir).map_err(workflow::Error::from)?;
    let mut installation = open_installation(&opts.exb_path)?;
    Workflow::new().link_existing(&opts.app_name, &mut installation, repos_dir)?;
    info!("successfully linked {}", opts.app_name);

    Ok(())
}

fn run_link_app_config(opts: LinkAppConfigOptions) -> Result<()> {
    let repos_dir = absolute(&opts.link.repos_dir).map_err(workflow::Error::from)?;
    let installation = open_installation(&opts.link.exb_path)?;
    let replace = if opts.force {
        Replace::Force
    } else {
        Replace::LinksOnly
    };
    Workflow::new().link_config_folder(&opts.link.app_name, &installation, repos_dir, replace)?;
    info!("successfully linked config of {}", opts.link.app_name);

    Ok(())
}

fn run_unlink_app(opts: LinkOptions) -> Result<()> {
    let repos_dir = absolute(&opts.repos_dir).map_err(workflow::Error::from)?;
    let mut installation = open_installation(&opts.exb_path)?;
    installation
        .discover_apps(&repos_dir)
        .map_err(workflow::Error::from)?;
    Workflow::new().unlink(&opts.app_name, &mut installation, repos_dir)?;
    info!("successfully unlinked {}", opts.app_name);

    Ok(())
}

fn open_installation(exb_path: &Path) -> Result<Installation> {
    let root = absolute(exb_path).map_err(workflow::Error::from)?;
    Ok(Installation::open(root, None).map_err(workflow::Error::from)?)
}
