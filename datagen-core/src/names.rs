//! Random directory and file names.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Shortest generated name.
pub const MIN_NAME_LENGTH: usize = 15;

/// Longest generated name.
pub const MAX_NAME_LENGTH: usize = 25;

/// Generate a random `[A-Za-z0-9]` name of 15 to 25 characters.
///
/// Names are not checked for uniqueness; with 62 symbols and at least 15
/// characters a collision inside one run is not a practical concern.
pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let length = rng.gen_range(MIN_NAME_LENGTH..=MAX_NAME_LENGTH);
    (0..length)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}
