//! HTTP Request Handlers

pub mod catalog;
pub mod health;
pub mod invoke;
pub(crate) mod stream;
