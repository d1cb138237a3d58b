//! Operations behind the dashboard's server actions. Each takes the
//! resolved session context and returns a [`crate::response::ServerResult`];
//! the HTTP layer decides how failures are surfaced.

pub mod members;
pub mod organization;
pub mod users;
