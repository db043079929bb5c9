//! Invitation seed handling.

use sigil_core::hash::domain;
use sigil_core::{hash, random_bytes, stretch, Result, SigningKeypair};

/// Alphabet for generated seeds. Lowercase and digits, with the easily
/// confused characters (l, o, 0, 1) left out.
const SEED_ALPHABET: &[u8] = b"abcdefghijkmnpqrstuvwxyz23456789";

/// Normalize a user-entered seed: lowercase, alphanumeric only.
///
/// `"ABCD-efgh 1234"` and `"abcdefgh1234"` stretch to the same key.
pub fn normalize_seed(seed: &str) -> String {
    seed.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Generate a random seed in `xxxx-xxxx-xxxx-xxxx` form.
pub fn random_seed() -> String {
    let bytes = random_bytes(16);
    bytes
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .map(|b| SEED_ALPHABET[*b as usize % SEED_ALPHABET.len()] as char)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Derive the invitation's single-use signing keypair from a seed.
///
/// Deliberately slow (the seed is stretched); both the inviter and the
/// invitee run this over the same normalized secret.
pub fn derive_signing_keypair(seed: &str) -> Result<SigningKeypair> {
    let material = stretch(normalize_seed(seed).as_bytes())?;
    let signature_seed = hash(domain::SIGNATURE, material.as_bytes());
    Ok(SigningKeypair::from_seed(signature_seed.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_folds_case_and_separators() {
        assert_eq!(normalize_seed("ABCD-efgh-IJKL"), "abcdefghijkl");
        assert_eq!(normalize_seed("a b c d"), "abcd");
    }

    #[test]
    fn derivation_ignores_formatting() {
        let a = derive_signing_keypair("abcd-efgh").unwrap();
        let b = derive_signing_keypair("AB cd EF gh").unwrap();
        assert_eq!(a.public, b.public);
    }

    #[test]
    fn generated_seeds_have_expected_shape() {
        let seed = random_seed();
        let groups: Vec<&str> = seed.split('-').collect();
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.len() == 4));
        assert_eq!(normalize_seed(&seed).len(), 16);
    }
}
