//! Random short codes: room codes, passcodes, team codes and Baron codes.

use rand::Rng;

/// Characters every generated code is drawn from.
pub const CODE_CHARACTER_POOL: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// Draw `length` characters uniformly from `pool`.
pub fn generate_random_string(rng: &mut impl Rng, length: usize, pool: &str) -> String {
    let characters: Vec<char> = pool.chars().collect();
    if characters.is_empty() {
        return String::new();
    }
    (0..length)
        .map(|_| characters[rng.random_range(0..characters.len())])
        .collect()
}

/// Code of `length` characters from [`CODE_CHARACTER_POOL`].
pub fn generate_code(rng: &mut impl Rng, length: usize) -> String {
    generate_random_string(rng, length, CODE_CHARACTER_POOL)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn codes_have_requested_length_and_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = generate_code(&mut rng, 6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| CODE_CHARACTER_POOL.contains(c)));
    }

    #[test]
    fn empty_pool_yields_empty_code() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(generate_random_string(&mut rng, 4, ""), "");
    }
}
