//! Deterministic Bucketer
//!
//! A user's alternative is a pure function of `(salt, experiment, identity)`:
//! the three strings are concatenated, hashed with MD5, the digest is read as
//! a big-endian 128-bit integer and reduced modulo the number of choices.
//! MD5 is used for its uniform output, not for collision resistance.
//!
//! Nothing is stored about the assignment, so it can be recomputed at
//! conversion time and stays stable across processes. Changing the salt
//! reshuffles every assignment at once.

use md5::{Digest, Md5};
use serde_json::Value;

use crate::identity::Context;
use crate::{Error, Result};

/// Index into a list of `choices_count` alternatives for this user.
///
/// Compatible with `hexdigest(salt + experiment + identity).to_i(16) % n`.
///
/// # Errors
///
/// Returns `Error::NoAlternatives` if `choices_count` is zero.
pub fn modulo_choice(
    salt: &str,
    experiment: &str,
    identity: &str,
    choices_count: usize,
) -> Result<usize> {
    if choices_count == 0 {
        return Err(Error::NoAlternatives(experiment.to_string()));
    }
    let mut hasher = Md5::new();
    hasher.update(salt.as_bytes());
    hasher.update(experiment.as_bytes());
    hasher.update(identity.as_bytes());
    let mut digest = [0_u8; 16];
    digest.copy_from_slice(&hasher.finalize());
    let bucket = u128::from_be_bytes(digest) % choices_count as u128;
    // bucket < choices_count, which came from a usize
    #[allow(clippy::cast_possible_truncation)]
    Ok(bucket as usize)
}

/// Pick this context's alternative from a flattened alternative list.
///
/// # Errors
///
/// Returns `Error::NoAlternatives` if `alternatives` is empty.
pub fn choose<'a>(ctx: &Context, experiment: &str, alternatives: &'a [Value]) -> Result<&'a Value> {
    let index = modulo_choice(
        ctx.salt(),
        experiment,
        ctx.identity().as_str(),
        alternatives.len(),
    )?;
    Ok(&alternatives[index])
}

/// Stable key identifying an alternative row from its experiment and content.
///
/// Both parts are JSON encoded before hashing so `("ab", "c")` and
/// `("a", "bc")` never collide.
#[must_use]
pub fn lookup_key(experiment: &str, content: &Value) -> String {
    let encoded = Value::Array(vec![Value::String(experiment.to_string()), content.clone()]);
    format!("{:x}", Md5::digest(encoded.to_string().as_bytes()))
}
