pub mod app_state;
pub mod color;
pub mod ids;
pub mod logging;
pub mod slug;
#[cfg(test)]
pub mod test_support;
