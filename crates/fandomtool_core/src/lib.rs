pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod harvest;
pub mod icons;
pub mod model;
pub mod runtime;
pub mod search;
pub mod session;
pub mod suggest;

#[cfg(test)]
mod testing;

pub use error::{FandomError, FandomResult};
