pub mod command_timeout;
pub mod system;
pub mod units;

pub use command_timeout::{run_command_with_timeout, CommandOutput};
pub use system::*;
pub use units::{bytes_to_gib, format_bytes};
