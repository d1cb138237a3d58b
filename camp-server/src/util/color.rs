const PALETTE: [&str; 15] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FECA57", "#FF9FF3", "#54A0FF", "#5F27CD",
    "#00D2D3", "#FF9F43", "#10AC84", "#EE5A24", "#0984E3", "#6C5CE7", "#A29BFE",
];

/// Stable avatar color for a user id.
///
/// Walks the UTF-16 code units with `hash = c + (hash << 5) - hash`. Only the
/// shift runs in 32 bits; the sum is carried at full width, so ids map to the
/// same palette entry the web dashboard shows.
pub fn user_color(user_id: &str) -> &'static str {
    let mut hash: i64 = 0;
    for unit in user_id.encode_utf16() {
        let shifted = i64::from((hash as i32).wrapping_shl(5));
        hash = i64::from(unit).wrapping_add(shifted.wrapping_sub(hash));
    }
    let index = hash.unsigned_abs() % PALETTE.len() as u64;
    PALETTE[index as usize]
}
