//! API token generation

use rand::Rng;

/// Generate a random 32-byte API token as hex
pub fn generate_api_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(&bytes)
}

// Hex encoding helper since we don't want to add another dependency
mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(bytes: &[u8]) -> String {
        let mut result = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            result.push(HEX_CHARS[(byte >> 4) as usize] as char);
            result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
        }
        result
    }
}
