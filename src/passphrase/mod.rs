/*!
 * Passphrase Strength
 *
 * Heuristic scoring used to warn before a weak passphrase protects
 * anything. Scores are advisory except for the acceptance floor, which
 * vault creation and rotation enforce.
 */

mod strength;

#[cfg(test)]
mod tests;

pub use strength::evaluate;
pub use strength::is_acceptable;
pub use strength::PassphraseScore;
pub use strength::Strength;
pub use strength::MIN_ACCEPTABLE_ENTROPY_BITS;
pub use strength::MIN_ACCEPTABLE_LENGTH;
