use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

// Dev helper: mint a bearer token and print the hash to store in session_token.
fn main() {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let token = URL_SAFE_NO_PAD.encode(bytes);

    let hash = hex::encode(Sha256::digest(token.as_bytes()));

    println!("token:              {token}");
    println!("session_token_hash: {hash}");
}
