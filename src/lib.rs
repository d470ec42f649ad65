// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Experience Builder development environment helper.
//!
//! Install Experience Builder Developer Edition, clone the app and widget
//! repositories listed in an applications config, and wire those clones into
//! the installation through symbolic links.
//!
//! # Data Flow
//!
//! An app name is resolved to a repository URL through the applications
//! config. The repository is cloned into a local directory. Finally, the
//! clone's `Widgets` and `AppConfig` folders are bound into the installation
//! at the fixed offsets the platform expects.
//!
//! Nothing runs concurrently. Each step blocks until it is done, and the
//! first failure aborts the workflow.

pub mod config;
pub mod download;
pub mod installation;
pub mod path;
pub mod repository;
pub mod symlink;
pub mod workflow;

pub use config::{ApplicationsConfig, RepoKind, RepoSource, VersionCatalog};
pub use installation::Installation;
pub use repository::RepositoryRecord;
pub use symlink::{Replace, SymlinkManager};
pub use workflow::{Error, ErrorKind, Workflow};
