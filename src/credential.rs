use sha2::{Digest, Sha256};
use uuid::Uuid;

// sha256$<iterations>$<salt>$<digest>
const SCHEME: &str = "sha256";

pub fn hash(plain: &str, iterations: u32) -> String {
    let salt = Uuid::new_v4();
    let iterations = iterations.max(1);
    let digest = derive(plain, salt.as_bytes(), iterations);
    format!("{SCHEME}${iterations}${}${digest}", salt.simple())
}

pub fn verify(plain: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != SCHEME {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let Ok(salt) = Uuid::try_parse(salt) else {
        return false;
    };
    let actual = derive(plain, salt.as_bytes(), iterations.max(1));
    // Compare every byte regardless of where the first mismatch is.
    actual.len() == expected.len()
        && actual
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn derive(plain: &str, salt: &[u8], iterations: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(plain.as_bytes());
    let mut digest = hasher.finalize();
    for _ in 1..iterations {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(digest);
        digest = hasher.finalize();
    }
    format!("{:x}", digest)
}
