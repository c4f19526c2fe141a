//! Login-credential derivation for students and teachers.
//!
//! A username is the first four letters of the person's name (lower-cased,
//! right-padded with 'x') followed by the first four digits of their phone
//! number. Collisions against existing credentials are the caller's problem,
//! resolved by an explicit [`CollisionPolicy`].

/// Every derived credential starts with this password. Documented legacy
/// behavior; issuance of real credentials is out of scope.
pub const DEFAULT_PASSWORD: &str = "1111";

/// What to do when a derived username already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Abandon the row entirely.
    Skip,
    /// Append the entity's numeric id to force uniqueness.
    Disambiguate,
}

impl CollisionPolicy {
    pub fn parse(raw: Option<&str>) -> Result<Self, String> {
        match raw.map(|s| s.to_ascii_lowercase()).as_deref() {
            None | Some("skip") => Ok(CollisionPolicy::Skip),
            Some("disambiguate") => Ok(CollisionPolicy::Disambiguate),
            Some(other) => Err(format!(
                "onCollision must be one of: skip, disambiguate (got {})",
                other
            )),
        }
    }
}

/// Derive a username from a full name and a phone-number string.
///
/// Total and deterministic: any inputs, including empty strings, produce an
/// eight-character-or-shorter username with no error path.
pub fn derive_username(full_name: &str, phone_digits: &str) -> String {
    let mut name_part: String = full_name.chars().take(4).collect::<String>().to_lowercase();
    while name_part.chars().count() < 4 {
        name_part.push('x');
    }

    let digit_part: String = if phone_digits.chars().count() >= 4 {
        phone_digits.chars().take(4).collect()
    } else if !phone_digits.is_empty() {
        phone_digits.to_string()
    } else {
        "0000".to_string()
    };

    name_part + &digit_part
}
