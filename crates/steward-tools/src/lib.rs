//! Shell tool for Steward: bounded command execution and the tool schema
//! declared to the model.

pub mod executor;
pub mod registry;
pub mod shell;

pub use executor::ExecutionResult;
pub use registry::{CommandParams, RUN_TERMINAL_COMMAND, ToolDef, terminal_command_tool};
pub use shell::ShellExecutor;
