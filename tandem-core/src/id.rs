//! Random object identifiers.

use rand::RngCore;

/// Length in hex characters of identifiers produced by [`new_id`].
pub const DEFAULT_ID_LEN: usize = 40;

/// 40 hex characters backed by 20 bytes from the thread-local CSPRNG.
pub fn new_id() -> String {
    new_id_with_len(DEFAULT_ID_LEN)
}

/// Hex identifier of `len` characters (`len / 2` random bytes). Uniqueness
/// is probabilistic; nothing is registered.
pub fn new_id_with_len(len: usize) -> String {
    let mut bytes = vec![0u8; len / 2];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
