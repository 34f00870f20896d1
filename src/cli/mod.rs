//! CLI command implementations

pub mod error;
pub mod export;
pub mod metadata;

pub use error::CliError;
pub use export::{Cli, Commands, ExportArgs, OutputFormat, SchemaArg};
pub use metadata::{DatasetsCommand, OrganizationsCommand};
