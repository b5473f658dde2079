//! External tool invocation
//!
//! Every OMR engine and the command translator shell out through
//! [`process::run_tool`], which owns timeout and stderr handling.

pub mod process;

pub use process::{query_tool, run_tool, ToolError, ToolOutput};
