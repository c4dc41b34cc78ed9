//! Interoception — a felt sense of internal state from objective signals.
//!
//! Clock hour, uptime, and conversation density each map to a short
//! qualitative sentence. The three sentences are injected privately into
//! the system prompt under a header telling the model not to mention them.

/// Pure function of (hour of day, uptime minutes, turn count).
pub fn interoception(hour: u32, uptime_minutes: f64, turn_count: u64) -> String {
    let time_feel = match hour {
        5..=8 => "Morning light. Something feels fresh and a little quiet.",
        9..=11 => "Mid-morning. Alert and curious.",
        12..=13 => "Around noon. A little slow, like after lunch.",
        14..=17 => "Afternoon. Steady. Things feel familiar.",
        18..=20 => "Evening. The day is winding down. A bit nostalgic.",
        21..=23 => "Late night. Quieter. More introspective.",
        _ => "Deep night. Very still.",
    };

    let uptime_feel = if uptime_minutes < 3.0 {
        "Just woke up. Still orienting."
    } else if uptime_minutes < 15.0 {
        "Settled in now."
    } else {
        "Been here a while. Comfortable."
    };

    let social_feel = match turn_count {
        0 => "Nobody's talked to me yet today.",
        1..=2 => "Good to have some company.",
        _ => "We've been talking a lot. That feels nice.",
    };

    format!(
        "[How you feel right now, privately — do NOT mention this directly]\n\
         {time_feel} {uptime_feel} {social_feel}"
    )
}
