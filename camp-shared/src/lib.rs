pub mod org;
pub mod roles;
pub mod users;
pub mod webhook;
