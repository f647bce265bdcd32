/// Which hand plays a key. Assigned statically per key, not derived from pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hand {
    Left,
    Right,
}

/// Static description of one mapped key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeySpec {
    /// Normalized (lowercase) key identifier.
    pub key: &'static str,
    /// Pitch name, e.g. `"C#4"`.
    pub note: &'static str,
    pub frequency: f32,
    pub octave: u8,
    pub is_black: bool,
    pub label: &'static str,
    pub hand: Hand,
    pub solfege: &'static str,
}

#[allow(clippy::too_many_arguments)]
const fn spec(
    key: &'static str,
    note: &'static str,
    frequency: f32,
    octave: u8,
    is_black: bool,
    label: &'static str,
    hand: Hand,
    solfege: &'static str,
) -> KeySpec {
    KeySpec {
        key,
        note,
        frequency,
        octave,
        is_black,
        label,
        hand,
        solfege,
    }
}

/// One octave: white keys on the home row (A–K), black keys above (Q–T).
/// Listed in chromatic order, which is also the display order.
pub static KEYS: [KeySpec; 13] = [
    spec("a", "C4", 261.63, 4, false, "A", Hand::Left, "Do"),
    spec("q", "C#4", 277.18, 4, true, "Q", Hand::Left, "Do#"),
    spec("s", "D4", 293.66, 4, false, "S", Hand::Left, "Re"),
    spec("w", "D#4", 311.13, 4, true, "W", Hand::Left, "Re#"),
    spec("d", "E4", 329.63, 4, false, "D", Hand::Left, "Mi"),
    spec("f", "F4", 349.23, 4, false, "F", Hand::Left, "Fa"),
    spec("e", "F#4", 369.99, 4, true, "E", Hand::Left, "Fa#"),
    spec("g", "G4", 392.0, 4, false, "G", Hand::Right, "Sol"),
    spec("r", "G#4", 415.3, 4, true, "R", Hand::Right, "Sol#"),
    spec("h", "A4", 440.0, 4, false, "H", Hand::Right, "La"),
    spec("t", "A#4", 466.16, 4, true, "T", Hand::Right, "La#"),
    spec("j", "B4", 493.88, 4, false, "J", Hand::Right, "Si"),
    spec("k", "C5", 523.25, 5, false, "K", Hand::Right, "Do"),
];

/// White keys C..B in diatonic order, used to build major triads.
const DIATONIC: [&str; 7] = ["a", "s", "d", "f", "g", "h", "j"];

/// Chord roots, natural notes only.
pub const ROOTS: [char; 7] = ['C', 'D', 'E', 'F', 'G', 'A', 'B'];

/// Minor triads need a lowered third, so they are listed rather than derived.
const MINOR_CHORDS: [(char, [&str; 3]); 7] = [
    ('C', ["a", "w", "g"]),
    ('D', ["s", "f", "h"]),
    ('E', ["d", "g", "j"]),
    ('F', ["f", "r", "a"]),
    ('G', ["g", "t", "s"]),
    ('A', ["h", "a", "d"]),
    ('B', ["j", "s", "e"]),
];

/// Case-fold a raw key identifier.
pub fn normalize(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Look up the key spec for a raw identifier (case-insensitive).
pub fn note_for(key: &str) -> Option<&'static KeySpec> {
    let key = normalize(key);
    KEYS.iter().find(|k| k.key == key)
}

pub fn is_piano_key(key: &str) -> bool {
    note_for(key).is_some()
}

/// Hand assignment for a key. Keys outside the table fall on the right,
/// matching how the piano is split for display.
pub fn hand_for(key: &str) -> Hand {
    note_for(key).map_or(Hand::Right, |k| k.hand)
}

fn root_letter(root: &str) -> Option<char> {
    let mut chars = root.trim().chars();
    let letter = chars.next()?.to_ascii_uppercase();
    match chars.next() {
        None => Some(letter),
        Some(_) => None,
    }
}

/// Root-position triad built from the diatonic white keys: positions
/// `i`, `i+2`, `i+4` (mod 7) starting at the root.
pub fn major_chord(root: &str) -> Option<[&'static str; 3]> {
    let letter = root_letter(root)?;
    let i = ROOTS.iter().position(|&r| r == letter)?;
    Some([DIATONIC[i], DIATONIC[(i + 2) % 7], DIATONIC[(i + 4) % 7]])
}

/// Root-position minor triad from the literal table, `None` for an unknown root.
pub fn minor_chord(root: &str) -> Option<[&'static str; 3]> {
    let letter = root_letter(root)?;
    MINOR_CHORDS
        .iter()
        .find(|(r, _)| *r == letter)
        .map(|(_, keys)| *keys)
}
