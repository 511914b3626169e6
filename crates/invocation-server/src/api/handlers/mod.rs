//! API request handlers

pub mod invoke;
pub mod shutdown;

pub use invoke::invoke;
pub use shutdown::shutdown;
