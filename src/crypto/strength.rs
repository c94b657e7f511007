//! Rough password strength scoring for user feedback.
//!
//! This is a hint shown by the CLI, not a security gate; the only hard
//! rule is `keys::MIN_PASSWORD_LEN`.

use std::fmt;

/// Coarse strength bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StrengthLabel {
    VeryWeak,
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

impl fmt::Display for StrengthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::VeryWeak => "Very Weak",
            Self::Weak => "Weak",
            Self::Medium => "Medium",
            Self::Strong => "Strong",
            Self::VeryStrong => "Very Strong",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strength {
    /// 0..=5
    pub score: u8,
    pub label: StrengthLabel,
}

/// Score a password: one point each for length > 6, length > 10, an
/// uppercase letter, a digit and a symbol.
pub fn estimate(password: &str) -> Strength {
    let len = password.chars().count();
    let checks = [
        len > 6,
        len > 10,
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| !c.is_ascii_alphanumeric()),
    ];
    let score = checks.iter().filter(|ok| **ok).count() as u8;

    let label = match score {
        0 | 1 => StrengthLabel::VeryWeak,
        2 => StrengthLabel::Weak,
        3 => StrengthLabel::Medium,
        4 => StrengthLabel::Strong,
        _ => StrengthLabel::VeryStrong,
    };

    Strength { score, label }
}
