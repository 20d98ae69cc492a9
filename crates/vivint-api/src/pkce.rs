// PKCE (S256) helpers for the password login flow.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

const VERIFIER_LEN: usize = 43;
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a fresh code verifier and its S256 challenge.
///
/// The verifier is plain alphanumeric so it survives every transport it
/// passes through; the challenge is unpadded URL-safe base64.
pub fn generate_code_challenge() -> (String, String) {
    let mut rng = rand::thread_rng();
    let verifier: String = (0..VERIFIER_LEN)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    let challenge = challenge_from_verifier(&verifier);
    (verifier, challenge)
}

/// Re-derive the challenge for a previously issued verifier (used when an
/// MFA round trip resumes a login in a fresh process).
pub fn challenge_from_verifier(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Random `state` parameter for the authorization request.
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    (0..22)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
