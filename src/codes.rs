use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const RANDOM_LENGTH: usize = 6;
const SUFFIX_LENGTH: usize = 2;

/// Mint a shareable referral code for `user_id`.
///
/// Six characters drawn uniformly from `[A-Z0-9]`, followed by the first two characters of the
/// user id, upper-cased. Uniqueness is best effort only.
pub fn generate_referral_code(user_id: &str) -> String {
    let mut rng = rand::thread_rng();

    let mut code: String = (0..RANDOM_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();

    let suffix: String = user_id.chars().take(SUFFIX_LENGTH).collect();
    code.push_str(&suffix.to_uppercase());

    code
}
