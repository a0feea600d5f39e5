use sha2::{Digest, Sha256};

/// SHA-256 of a unit's serialized bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let a = Fingerprint::of(b"{}");
        assert_eq!(a, Fingerprint::of(b"{}"));
        assert_ne!(a, Fingerprint::of(b"{ }"));
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.to_string().len(), 12);
    }
}
