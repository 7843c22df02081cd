pub mod config;
pub mod rpc;
pub mod utils;

pub use config::{handle_config_command, ConfigCommands};
pub use rpc::Session;
