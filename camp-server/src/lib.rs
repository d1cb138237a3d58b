pub mod actions;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod models;
pub mod response;
pub mod store;
pub mod util;
pub mod webhooks;
