//! Generation of secrets shared with the control plane.

use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;

pub const KEY_LENGTH: usize = 32;

/// Random alphanumeric key drawn from the operating system's secure source.
pub fn generate_random_key() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(KEY_LENGTH)
        .map(char::from)
        .collect()
}
