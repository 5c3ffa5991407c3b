use super::*;

#[test]
fn test_empty_passphrase_is_weak() {
    let score = evaluate("");
    assert_eq!(score.score, 0 + 10); // clean-pattern bonus only
    assert_eq!(score.strength, Strength::Weak);
    assert!(!is_acceptable(""));
}

#[test]
fn test_common_passphrase_rejected() {
    for candidate in ["password", "Password", "correcthorsebatterystaple"] {
        let score = evaluate(candidate);
        assert!(score.is_common, "{} should be flagged common", candidate);
        assert!(!is_acceptable(candidate));
    }
}

#[test]
fn test_short_passphrase_rejected() {
    assert!(!is_acceptable("Zx9!q"));
}

#[test]
fn test_low_entropy_rejected() {
    // Long enough but dominated by one character.
    assert!(!is_acceptable("aaaaaaaaaaaaaaaa"));
}

#[test]
fn test_strong_passphrase_accepted() {
    let candidate = "thrum-ovation-KILN-debris-42";
    assert!(is_acceptable(candidate));
    let score = evaluate(candidate);
    assert!(score.strength >= Strength::Good);
    assert!(score.entropy_bits > MIN_ACCEPTABLE_ENTROPY_BITS);
}

#[test]
fn test_diceware_style_accepted() {
    assert!(is_acceptable("orbit lantern velvet quarry"));
}

#[test]
fn test_repeated_run_penalized() {
    let clean = evaluate("Xk2!mRp9&wQz");
    let runny = evaluate("Xk2!mRp9&wzzz");
    assert!(clean.warnings.is_empty());
    assert!(runny
        .warnings
        .iter()
        .any(|w| w.contains("repeated")));
}

#[test]
fn test_sequential_run_detected() {
    assert!(evaluate("abcdefXX!9qrs")
        .warnings
        .iter()
        .any(|w| w.contains("sequential")));
    assert!(evaluate("zyx987!Kmpqt")
        .warnings
        .iter()
        .any(|w| w.contains("sequential")));
}

#[test]
fn test_score_bounds() {
    for candidate in ["", "a", "password", "8&fjKL#0qPz!vRw2@Nc5", "aaa111"] {
        let score = evaluate(candidate);
        assert!(score.score <= 100);
    }
}

#[test]
fn test_longer_unique_passphrase_scores_higher() {
    let short = evaluate("Kq7!b");
    let long = evaluate("Kq7!bXw3@pZm9$tRv5&n");
    assert!(long.score > short.score);
}
