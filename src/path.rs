// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Expand user supplied paths, and compose the fixed offsets of an
//! Experience Builder installation. The offsets mirror the platform's own
//! directory layout, so they are not configurable.

use std::path::{Path, PathBuf};

/// Client area of an installation, relative to its root.
pub const CLIENT_DIR: &str = "client";

/// Server area that hosts deployed apps, relative to an installation root.
pub const SERVER_APPS_DIR: &str = "server/public/apps";

/// Fixed app config slot, relative to an installation root.
pub const APP_CONFIG_SLOT: &str = "server/public/0";

/// Folder inside an app repository that holds its widgets.
pub const REPO_WIDGETS_DIR: &str = "Widgets";

/// Folder inside an app repository that holds its app config.
pub const REPO_APP_CONFIG_DIR: &str = "AppConfig";

/// Folder inside an app repository that holds its per-app config.
pub const REPO_CONFIG_DIR: &str = "config";

/// Default clone directory name of the shared widgets repository.
pub const CORE_WIDGETS_CLONE_DIR: &str = "core_widgets";

/// Perform shell expansion on user supplied path.
///
/// Expands `~` and environment variables. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::ShellExpansion`] if a variable cannot be looked up.
pub fn expand(path: impl AsRef<Path>) -> Result<PathBuf> {
    let raw = path.as_ref().to_string_lossy();
    let expanded = shellexpand::full(raw.as_ref())?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Expand user supplied path, and make it absolute against the current
/// directory.
///
/// Link targets must be absolute, because a relative target is resolved
/// against the directory of the link, not the caller's.
///
/// # Errors
///
/// - Return [`PathError::ShellExpansion`] if a variable cannot be looked up.
/// - Return [`PathError::Absolute`] if the current directory is unavailable.
pub fn absolute(path: impl AsRef<Path>) -> Result<PathBuf> {
    let expanded = expand(path)?;
    std::path::absolute(&expanded).map_err(|source| PathError::Absolute {
        source,
        path: expanded,
    })
}

/// Link path of an app's widgets inside the client area.
pub fn widgets_link(root: impl AsRef<Path>, app_name: impl AsRef<str>) -> PathBuf {
    root.as_ref()
        .join(CLIENT_DIR)
        .join(format!("{}_widgets", app_name.as_ref()))
}

/// Link path of the fixed app config slot.
pub fn app_config_link(root: impl AsRef<Path>) -> PathBuf {
    root.as_ref().join(APP_CONFIG_SLOT)
}

/// Link path of an app's own config folder.
pub fn app_config_folder_link(root: impl AsRef<Path>, app_name: impl AsRef<str>) -> PathBuf {
    root.as_ref().join(app_name.as_ref()).join(REPO_CONFIG_DIR)
}

/// Path resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// Failed to perform shell expansion on path.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to make path absolute.
    #[error("failed to make {:?} absolute", path.display())]
    Absolute {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
