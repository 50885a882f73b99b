//! Plain-text credential verification
//!
//! Password hashing belongs to the authentication service; this verifier
//! compares the stored credential as-is, in constant time with respect to
//! the position of the first mismatch.

use super::traits::CredentialVerifier;
use crate::types::Account;

#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCredentialVerifier;

impl CredentialVerifier for PlainCredentialVerifier {
    fn verify(&self, account: &Account, presented: &str) -> bool {
        constant_time_eq(account.password().as_bytes(), presented.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
