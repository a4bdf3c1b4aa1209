//! Command-line interface definitions for the `fleeting-scaleway` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `fleeting-scaleway` binary.
///
/// Group settings come from `FLEET_*` environment variables and the
/// `fleeting-scaleway.toml` configuration file.
#[derive(Debug, Parser)]
#[command(
    name = "fleeting-scaleway",
    about = "Manage a group of autoscaled Scaleway instances",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create instances and add them to the group.
    #[command(name = "increase", about = "Create instances and add them to the group")]
    Increase(IncreaseCommand),
    /// Delete instances from the group.
    #[command(name = "decrease", about = "Delete instances from the group")]
    Decrease(DecreaseCommand),
    /// List the instances of the group.
    #[command(name = "list", about = "List the instances of the group")]
    List,
    /// Check the group for dangling resources and deprecations.
    #[command(
        name = "sanity",
        about = "Check the group for dangling resources and deprecations"
    )]
    Sanity,
}

/// Arguments for the `fleeting-scaleway increase` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct IncreaseCommand {
    /// Number of instances to create.
    #[arg(value_name = "COUNT")]
    pub(crate) count: usize,
}

/// Arguments for the `fleeting-scaleway decrease` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DecreaseCommand {
    /// Instance identifiers (`name:server-id`) to delete.
    #[arg(required = true, value_name = "IID")]
    pub(crate) instances: Vec<String>,
}
