use rand::{Rng, distributions::Alphanumeric};

const ID_LEN: usize = 32;

/// Random alphanumeric id in the same shape the auth provider uses.
pub fn new_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

/// Ids arrive from clients in paths and bodies; only accept the id alphabet.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
