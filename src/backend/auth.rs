//! chap-sha1 authentication
//!
//! ```text
//! step1    = sha1(password)
//! step2    = sha1(step1)
//! step3    = sha1(salt[..20] ++ step2)
//! scramble = step1 XOR step3
//! ```

use sha1::{Digest, Sha1};

use super::errors::{BackendError, BackendResult};
use super::iproto::{TUPLE, USER_NAME};
use super::value::WireValue;

pub const AUTH_MECHANISM: &str = "chap-sha1";

/// Bytes of the greeting salt that enter the scramble
pub const SCRAMBLE_SALT_SIZE: usize = 20;

pub const SCRAMBLE_SIZE: usize = 20;

/// Compute the chap-sha1 scramble for `password`
pub fn scramble(salt: &[u8], password: &str) -> BackendResult<[u8; SCRAMBLE_SIZE]> {
    if salt.len() < SCRAMBLE_SALT_SIZE {
        return Err(BackendError::Greeting(format!(
            "salt is {} bytes, need at least {}",
            salt.len(),
            SCRAMBLE_SALT_SIZE
        )));
    }

    let step1 = Sha1::digest(password.as_bytes());
    let step2 = Sha1::digest(step1);

    let mut hasher = Sha1::new();
    hasher.update(&salt[..SCRAMBLE_SALT_SIZE]);
    hasher.update(step2);
    let step3 = hasher.finalize();

    let mut out = [0u8; SCRAMBLE_SIZE];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = step1[i] ^ step3[i];
    }
    Ok(out)
}

/// Body of an AUTH request
pub fn auth_body(user: &str, salt: &[u8], password: &str) -> BackendResult<Vec<(u64, WireValue)>> {
    let scramble = scramble(salt, password)?;
    Ok(vec![
        (USER_NAME, WireValue::str(user)),
        (
            TUPLE,
            WireValue::Array(vec![
                WireValue::str(AUTH_MECHANISM),
                WireValue::Bin(scramble.to_vec()),
            ]),
        ),
    ])
}

/// Server-side check of a scramble, as the engine performs it.
///
/// `scramble XOR sha1(salt ++ sha1(sha1(password)))` must give back
/// `sha1(password)`, whose own digest is the stored hash.
pub fn verify_scramble(salt: &[u8], password: &str, candidate: &[u8]) -> bool {
    if candidate.len() != SCRAMBLE_SIZE || salt.len() < SCRAMBLE_SALT_SIZE {
        return false;
    }

    let stored = Sha1::digest(Sha1::digest(password.as_bytes()));

    let mut hasher = Sha1::new();
    hasher.update(&salt[..SCRAMBLE_SALT_SIZE]);
    hasher.update(stored);
    let mask = hasher.finalize();

    let mut step1 = [0u8; SCRAMBLE_SIZE];
    for (i, byte) in step1.iter_mut().enumerate() {
        *byte = candidate[i] ^ mask[i];
    }
    Sha1::digest(step1)[..] == stored[..]
}
