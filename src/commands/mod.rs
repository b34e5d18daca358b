//! Command implementations behind the `catres` binary.

pub mod config;
mod list;
mod raw;
mod resolve;

pub use config::{Config, Options, parse_catalogs};
pub use list::list;
pub use raw::raw;
pub use resolve::resolve;
