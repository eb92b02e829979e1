// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine default locations for the files gitplane reads on behalf of
//! the user: its own configuration file, and the record store that holds
//! repository credentials, profiles, bundles, and cluster specifications.

use std::path::PathBuf;

/// Determine default absolute path to gitplane's configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/gitplane/config.toml`.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if the configuration directory cannot be
///   determined.
pub fn default_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("gitplane").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to the record store directory.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/gitplane-store` as the
/// default absolute path for a record store. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_store_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("gitplane-store"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
