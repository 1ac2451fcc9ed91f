//! HTTP handlers per resource, on top of the generic entity handlers.

pub mod comments;
pub mod data;
pub mod entity;
pub mod users;
pub mod votes;
