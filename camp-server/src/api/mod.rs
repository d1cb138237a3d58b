pub mod extract;
pub mod members;
pub mod middleware;
pub mod org;
pub mod serve;
pub mod users;
pub mod webhooks;
