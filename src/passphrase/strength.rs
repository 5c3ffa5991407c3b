use std::collections::HashMap;

use serde::Serialize;

/// Shortest passphrase the vault will accept.
pub const MIN_ACCEPTABLE_LENGTH: usize = 12;

/// Estimated Shannon entropy floor, in bits, for acceptance.
pub const MIN_ACCEPTABLE_ENTROPY_BITS: f64 = 30.0;

/// Passphrases rejected outright regardless of any other property.
/// Matched case-insensitively.
const COMMON_PASSPHRASES: &[&str] = &[
    "password",
    "password1",
    "password123",
    "passphrase",
    "123456",
    "12345678",
    "123456789",
    "1234567890",
    "qwerty",
    "qwertyuiop",
    "letmein",
    "welcome",
    "admin",
    "iloveyou",
    "monkey",
    "dragon",
    "sunshine",
    "trustno1",
    "correcthorsebatterystaple",
];

/// Coarse verdict derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Weak,
    Fair,
    Good,
    Strong,
}

/// Full scoring breakdown for one passphrase.
#[derive(Debug, Clone, Serialize)]
pub struct PassphraseScore {
    /// 0 to 100.
    pub score: u32,
    pub strength: Strength,
    pub entropy_bits: f64,
    pub length: usize,
    pub is_common: bool,
    /// Human-readable reasons the score was reduced.
    pub warnings: Vec<String>,
}

/// Scores a candidate passphrase.
///
/// The score combines length (up to 40 points), estimated entropy (up
/// to 30), character diversity (up to 20) and a clean-pattern bonus
/// (10), minus penalties for repeated runs, sequential runs and known
/// common passphrases. The result is clamped to 0..=100.
pub fn evaluate(passphrase: &str) -> PassphraseScore {
    let chars: Vec<char> = passphrase.chars().collect();
    let length = chars.len();
    let entropy_bits = shannon_entropy_bits(&chars);
    let is_common = is_common(passphrase);
    let mut warnings = Vec::new();

    // Length: 2 points per character up to 40.
    let length_points = (length as u32 * 2).min(40);
    if length < MIN_ACCEPTABLE_LENGTH {
        warnings.push(format!(
            "shorter than {} characters",
            MIN_ACCEPTABLE_LENGTH
        ));
    }

    // Entropy: one point per two bits up to 30.
    let entropy_points = ((entropy_bits / 2.0) as u32).min(30);
    if entropy_bits < MIN_ACCEPTABLE_ENTROPY_BITS {
        warnings.push("low estimated entropy".to_string());
    }

    // Diversity: 5 points per character class present.
    let diversity_points = character_classes(&chars) * 5;

    let mut score = (length_points + entropy_points + diversity_points) as i64;

    let mut clean = true;
    if has_repeated_run(&chars) {
        score -= 10;
        clean = false;
        warnings.push("contains repeated character runs".to_string());
    }
    if has_sequential_run(&chars) {
        score -= 10;
        clean = false;
        warnings.push("contains sequential character runs".to_string());
    }
    if clean {
        score += 10;
    }
    if is_common {
        score -= 30;
        warnings.push("matches a well-known passphrase".to_string());
    }

    let score = score.clamp(0, 100) as u32;
    let strength = match score {
        0..=39 => Strength::Weak,
        40..=59 => Strength::Fair,
        60..=79 => Strength::Good,
        _ => Strength::Strong,
    };
    PassphraseScore {
        score,
        strength,
        entropy_bits,
        length,
        is_common,
        warnings,
    }
}

/// Whether the passphrase clears the acceptance floor: at least
/// [`MIN_ACCEPTABLE_LENGTH`] characters, not a known common passphrase,
/// and at least [`MIN_ACCEPTABLE_ENTROPY_BITS`] bits of estimated
/// entropy.
pub fn is_acceptable(passphrase: &str) -> bool {
    let score = evaluate(passphrase);
    score.length >= MIN_ACCEPTABLE_LENGTH
        && !score.is_common
        && score.entropy_bits >= MIN_ACCEPTABLE_ENTROPY_BITS
}

/// Total Shannon entropy estimate: per-character entropy of the observed
/// distribution times the length. An estimate, not a guarantee; it
/// overvalues short random strings and undervalues diceware phrases
/// with repeated words.
fn shannon_entropy_bits(chars: &[char]) -> f64 {
    if chars.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in chars {
        *counts.entry(*c).or_insert(0) += 1;
    }
    let len = chars.len() as f64;
    let per_char: f64 = counts
        .values()
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum();
    per_char * len
}

fn character_classes(chars: &[char]) -> u32 {
    let mut lower = false;
    let mut upper = false;
    let mut digit = false;
    let mut other = false;
    for c in chars {
        if c.is_lowercase() {
            lower = true;
        } else if c.is_uppercase() {
            upper = true;
        } else if c.is_ascii_digit() {
            digit = true;
        } else {
            other = true;
        }
    }
    [lower, upper, digit, other].iter().filter(|b| **b).count() as u32
}

/// Three or more of the same character in a row.
fn has_repeated_run(chars: &[char]) -> bool {
    chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}

/// Three or more consecutively ascending or descending characters, like
/// "abc" or "321".
fn has_sequential_run(chars: &[char]) -> bool {
    chars.windows(3).any(|w| {
        let (a, b, c) = (w[0] as i64, w[1] as i64, w[2] as i64);
        (b == a + 1 && c == b + 1) || (b == a - 1 && c == b - 1)
    })
}

fn is_common(passphrase: &str) -> bool {
    let lowered = passphrase.to_lowercase();
    COMMON_PASSPHRASES.iter().any(|p| *p == lowered)
}
