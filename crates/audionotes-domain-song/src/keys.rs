pub const KEY_SIGNATURES: [&str; 15] = [
    "C Major / A minor",
    "G Major / E minor",
    "D Major / B minor",
    "A Major / F# minor",
    "E Major / C# minor",
    "B Major / G# minor",
    "F# Major / D# minor",
    "C# Major / A# minor",
    "F Major / D minor",
    "Bb Major / G minor",
    "Eb Major / C minor",
    "Ab Major / F minor",
    "Db Major / Bb minor",
    "Gb Major / Eb minor",
    "Cb Major / Ab minor",
];

/// Services report "Undetermined" or an empty string when no key is clear.
pub fn normalize_detected_key(raw: Option<&str>) -> Option<String> {
    let key = raw?.trim();
    if key.is_empty() || key.eq_ignore_ascii_case("undetermined") {
        return None;
    }
    Some(key.to_string())
}

/// Picks the key-signature label for a detected key such as "A minor" or "F# Dorian".
///
/// Tonic and mode must both match when the mode is major or minor; otherwise
/// the first label carrying the tonic wins.
pub fn match_key_signature(detected: &str) -> Option<&'static str> {
    let normalized = detected.replace('♯', "#").replace('♭', "b");
    let mut tokens = normalized.split_whitespace();
    let tonic = tokens.next()?;
    let mode = tokens
        .next()
        .filter(|m| m.eq_ignore_ascii_case("major") || m.eq_ignore_ascii_case("minor"));

    let tonic_matches = |half: &str| {
        half.split_whitespace()
            .next()
            .is_some_and(|t| t.eq_ignore_ascii_case(tonic))
    };

    if let Some(mode) = mode {
        let exact = KEY_SIGNATURES.iter().find(|entry| {
            entry.split(" / ").any(|half| {
                tonic_matches(half)
                    && half
                        .split_whitespace()
                        .nth(1)
                        .is_some_and(|m| m.eq_ignore_ascii_case(mode))
            })
        });
        if exact.is_some() {
            return exact.copied();
        }
    }

    KEY_SIGNATURES
        .iter()
        .find(|entry| entry.split(" / ").any(tonic_matches))
        .copied()
}
