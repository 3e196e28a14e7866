pub mod command;
pub mod report;

pub use command::{execute, run_command_loop, Command};
pub use report::print_access_records;
