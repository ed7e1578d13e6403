use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

/// Length of passwords issued by an admin reset.
pub const GENERATED_PASSWORD_LENGTH: usize = 8;

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(password_hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    let argon2 = Argon2::default();

    match argon2.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Passwords must be 8-128 characters with at least one uppercase letter,
/// one lowercase letter and one digit.
pub fn validate_password_policy(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }
    if password.len() > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_numeric()) {
        return Err("Password must contain a digit".to_string());
    }
    Ok(())
}

/// Builds a random password with at least one character from each
/// category, so the result always satisfies the password policy.
pub fn generate_password(length: usize) -> String {
    use rand::Rng;

    let lowercase = "abcdefghijklmnopqrstuvwxyz";
    let uppercase = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let digits = "0123456789";
    let symbols = "!@#$%&*";

    let all_chars = format!("{}{}{}{}", lowercase, uppercase, digits, symbols);
    let mut rng = rand::thread_rng();

    let mut password = String::new();
    password.push(lowercase.chars().nth(rng.gen_range(0..lowercase.len())).unwrap());
    password.push(uppercase.chars().nth(rng.gen_range(0..uppercase.len())).unwrap());
    password.push(digits.chars().nth(rng.gen_range(0..digits.len())).unwrap());
    password.push(symbols.chars().nth(rng.gen_range(0..symbols.len())).unwrap());

    for _ in 4..length {
        let idx = rng.gen_range(0..all_chars.len());
        password.push(all_chars.chars().nth(idx).unwrap());
    }

    let mut chars: Vec<char> = password.chars().collect();
    for i in (1..chars.len()).rev() {
        let j = rng.gen_range(0..=i);
        chars.swap(i, j);
    }

    chars.into_iter().collect()
}
