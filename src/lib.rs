pub mod acl;
pub mod auth;
pub mod bot;
pub mod config;
pub mod docker;
pub mod engine;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod shared;
pub mod telegram;
