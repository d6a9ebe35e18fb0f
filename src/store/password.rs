use sha2::{Digest, Sha256};

/// One-way digest of a password. The username salts it so equal passwords don't share a digest.
pub fn hash_password(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_salted_and_stable() {
        let a = hash_password("alice", "hunter2");
        assert_eq!(a, hash_password("alice", "hunter2"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_password("bob", "hunter2"));
        assert_ne!(a, hash_password("alice", "hunter3"));
        assert!(!a.contains("hunter2"));
    }
}
