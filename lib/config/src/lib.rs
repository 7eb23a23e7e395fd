mod cli;
mod env;
mod loader;
mod sanitize;
mod secret;
mod types;

pub use cli::CliArgs;
pub use env::Env;
pub use loader::load_all;
pub use sanitize::sanitize;
pub use secret::{resolve_path_secret, resolve_secret};
pub use types::*;
