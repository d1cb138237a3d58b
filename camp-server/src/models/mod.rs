pub mod invitation;
pub mod member;
pub mod organization;
pub mod session;
pub mod subscription;
pub mod user;

use mongodb::bson::DateTime;

pub(crate) fn rfc3339(dt: &DateTime) -> String {
    dt.try_to_rfc3339_string().unwrap_or_default()
}
