use crate::keymap;

/// Separator between the keys of a chord token, e.g. `"a,d,g"`.
pub const CHORD_SEPARATOR: char = ',';

/// A decoded exercise step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// One key pressed on its own. May be empty or unmapped, in which case
    /// it never matches.
    Single(String),
    /// Keys held down together. Never matches when empty.
    Chord(Vec<String>),
}

pub fn is_chord(token: &str) -> bool {
    token.contains(CHORD_SEPARATOR)
}

/// Split a token into normalized key ids. No deduplication, no validation.
pub fn decode(token: &str) -> Vec<String> {
    token
        .split(CHORD_SEPARATOR)
        .map(keymap::normalize)
        .filter(|k| !k.is_empty())
        .collect()
}

/// Join key ids into a token. Single keys produce no separator.
pub fn encode<S: AsRef<str>>(keys: &[S]) -> String {
    keys.iter()
        .map(|k| k.as_ref())
        .collect::<Vec<_>>()
        .join(",")
}

impl Step {
    pub fn parse(token: &str) -> Self {
        let keys = decode(token);
        if is_chord(token) {
            Step::Chord(keys)
        } else {
            Step::Single(keys.into_iter().next().unwrap_or_default())
        }
    }

    pub fn keys(&self) -> &[String] {
        match self {
            Step::Single(key) => std::slice::from_ref(key),
            Step::Chord(keys) => keys,
        }
    }

    pub fn is_chord(&self) -> bool {
        matches!(self, Step::Chord(_))
    }

    /// Keys in this step that the mapping table doesn't know.
    pub fn unknown_keys(&self) -> impl Iterator<Item = &str> {
        self.keys()
            .iter()
            .map(String::as_str)
            .filter(|k| !keymap::is_piano_key(k))
    }

    /// Human label: keys upper-cased with their pitch names, e.g. `A+D+G (C4 E4 G4)`.
    pub fn label(&self) -> String {
        let keys = self.keys();
        let caps = keys
            .iter()
            .map(|k| k.to_uppercase())
            .collect::<Vec<_>>()
            .join("+");
        let notes = keys
            .iter()
            .map(|k| keymap::note_for(k).map_or(k.as_str(), |s| s.note))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{caps} ({notes})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chord_detection() {
        assert!(is_chord("a,d,g"));
        assert!(is_chord("a,"));
        assert!(!is_chord("a"));
        assert!(!is_chord(""));
    }

    #[test]
    fn decode_normalizes() {
        assert_eq!(decode(" A , d,G "), vec!["a", "d", "g"]);
        assert_eq!(decode("s"), vec!["s"]);
        assert_eq!(decode("a,,d,"), vec!["a", "d"]);
        assert!(decode(",").is_empty());
    }

    #[test]
    fn decode_keeps_duplicates_and_unknown_keys() {
        assert_eq!(decode("a,a,z"), vec!["a", "a", "z"]);
    }

    #[test]
    fn encode_then_decode() {
        let keys = ["a", "d", "g"];
        let token = encode(&keys);
        assert!(is_chord(&token));
        assert_eq!(decode(&token), keys);
        assert!(!is_chord(&encode(&["s"])));
    }

    #[test]
    fn parse_steps() {
        assert_eq!(Step::parse("S"), Step::Single("s".into()));
        assert_eq!(
            Step::parse("a,d,g"),
            Step::Chord(vec!["a".into(), "d".into(), "g".into()])
        );
        assert_eq!(Step::parse("a,"), Step::Chord(vec!["a".into()]));
        assert_eq!(Step::parse("  "), Step::Single(String::new()));
    }

    #[test]
    fn unknown_keys_listed() {
        let step = Step::parse("a,z,x");
        assert_eq!(step.unknown_keys().collect::<Vec<_>>(), vec!["z", "x"]);
        assert_eq!(Step::parse("k").unknown_keys().count(), 0);
    }

    #[test]
    fn labels() {
        assert_eq!(Step::parse("a,d,g").label(), "A+D+G (C4 E4 G4)");
        assert_eq!(Step::parse("z").label(), "Z (z)");
    }
}
