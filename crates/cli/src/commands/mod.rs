pub mod call;
pub mod config;
pub mod health;
pub mod utils;

pub use call::{handle_call_command, CallArgs};
pub use config::{handle_config_command, ConfigCommands};
pub use health::handle_health_command;
