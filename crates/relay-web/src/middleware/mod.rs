//! Request middleware

pub mod deadline;
pub mod security;
