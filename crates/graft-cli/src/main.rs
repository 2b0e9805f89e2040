//! # graft CLI
//!
//! Command-line interface for the graft graph-data loader.
//!
//! This binary is a thin wrapper over `graft-core`: it reads graph data from a
//! file, plans or validates it, and loads it into a graph.
//! Run `graft --help` for usage information.

mod cli;
pub mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
