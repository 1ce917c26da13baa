// Library exports for mycms
// This allows integration tests and the binary to share the same modules

pub mod auth;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod extractors;
pub mod identity;
pub mod mail;
pub mod pagination;
pub mod reactions;
pub mod routes;
pub mod slug;
pub mod state;
pub mod uploads;
