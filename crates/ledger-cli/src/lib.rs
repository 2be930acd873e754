//! Library surface of the `ledger` command-line tool.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod settings;
pub mod summary;
