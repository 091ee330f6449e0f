//! The panel's entity lists, each an instantiation of the generic fetch contract.

mod hosts;
mod services;
mod users;

pub use hosts::*;
pub use services::*;
pub use users::*;
