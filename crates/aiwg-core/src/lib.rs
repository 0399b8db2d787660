pub mod config;
pub mod error;
pub mod installer;
pub mod io;
pub mod isolation;
pub mod lock;
pub mod manifest;
pub mod migration;
pub mod paths;
pub mod registry;
pub mod status;
mod txn;
pub mod types;
pub mod uninstaller;
pub mod validator;

pub use error::{AiwgError, Result};
