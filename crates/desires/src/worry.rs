//! Worry-signal detection over user text.
//!
//! A deterministic keyword scorer, no model in the loop: strong signals
//! (sleep deprivation, fever, being at a limit) are worth 0.4 each, weak
//! signals (general fatigue, stress) 0.2 each, summed and clamped to 1.0.
//! The result boosts `worry_companion` after user-driven turns.

/// Signals that on their own warrant checking in on someone.
const STRONG_KEYWORDS: &[&str] = &[
    // sleep deprivation
    "寝不足",
    "眠れない",
    "徹夜",
    "sleep deprived",
    "no sleep",
    "can't sleep",
    "couldn't sleep",
    // fever / illness
    "熱がある",
    "高熱",
    "熱っぽい",
    "fever",
    // exhaustion at a limit
    "限界",
    "倒れそう",
    "exhausted",
    "burned out",
    "burnt out",
];

/// Milder signals that only add up.
const WEAK_KEYWORDS: &[&str] = &[
    "しんどい",
    "疲れた",
    "つかれた",
    "だるい",
    "ストレス",
    "tired",
    "worn out",
    "stress",
];

const STRONG_WEIGHT: f64 = 0.4;
const WEAK_WEIGHT: f64 = 0.2;

/// Score `text` for worry signals. Pure: depends only on the input, and
/// the result is always within [0, 1].
pub fn detect_worry_signal(text: &str) -> f64 {
    let lowered = text.to_lowercase();
    let mut score = 0.0;
    for keyword in STRONG_KEYWORDS {
        if lowered.contains(keyword) {
            score += STRONG_WEIGHT;
        }
    }
    for keyword in WEAK_KEYWORDS {
        if lowered.contains(keyword) {
            score += WEAK_WEIGHT;
        }
    }
    score.clamp(0.0, 1.0)
}
