//! Authentication methods.
//!
//! `searchd` accepts any credentials, but it still walks through the handshake and advertises
//! `mysql_native_password`, so that is the only method implemented.
use sha1::{Digest, Sha1};

use crate::common::unit_error;

/// Name of the `mysql_native_password` plugin.
pub const NATIVE_PASSWORD: &[u8] = b"mysql_native_password";

/// Length of the scramble `mysql_native_password` uses.
const SCRAMBLE_LEN: usize = 20;

/// Compute the authentication response for `plugin`.
///
/// A server that does not name a plugin gets `mysql_native_password`.
pub fn respond(
    plugin: Option<&[u8]>,
    password: &[u8],
    scramble: &[u8],
) -> Result<Vec<u8>, UnsupportedAuth> {
    if plugin.unwrap_or(NATIVE_PASSWORD) != NATIVE_PASSWORD {
        return Err(UnsupportedAuth);
    }
    Ok(native_password(password, scramble))
}

/// `SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))`
///
/// An empty password is sent as an empty response.
pub fn native_password(password: &[u8], scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha1::digest(password);
    let stage2 = Sha1::digest(stage1);

    let mut hasher = Sha1::new();
    hasher.update(&scramble[..scramble.len().min(SCRAMBLE_LEN)]);
    hasher.update(stage2);
    let mut token = hasher.finalize();

    for (t, s) in token.iter_mut().zip(stage1.iter()) {
        *t ^= s;
    }

    token.to_vec()
}

unit_error! {
    /// Server requested an authentication method that is not supported.
    pub struct UnsupportedAuth("unsupported authentication method");
}
