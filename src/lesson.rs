use crate::capture::{ActiveKeys, CaptureEvent};
use crate::catalog::Exercise;
use crate::keymap;
use crate::step::Step;

/// Result of the most recent attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Correctness {
    #[default]
    Unknown,
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    NoExercise,
    AwaitingStep(usize),
    Complete,
}

/// Matches live key input against the selected exercise.
///
/// Single-key steps advance on a matching key-down. Chord steps advance when
/// a held-keys snapshot contains every key of the chord. `chord_latched`
/// only blocks a re-advance while the index is unchanged; every advance
/// moves the index and clears it, so each new step starts armed. Two equal
/// chord steps in a row are therefore both matched by consecutive snapshots
/// that keep holding the chord.
#[derive(Debug, Default)]
pub struct Lesson {
    exercise: Option<Exercise>,
    steps: Vec<Step>,
    index: usize,
    last: Correctness,
    chord_latched: bool,
}

impl Lesson {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, exercise: Exercise) {
        for problem in exercise.unknown_keys() {
            log::warn!("{problem}; that step can never be matched");
        }
        self.steps = exercise.steps();
        self.exercise = Some(exercise);
        self.transition(0, Correctness::Unknown, false);
        log::info!(
            "Lesson: selected {:?} ({} steps)",
            self.exercise.as_ref().map_or("", |e| e.id.as_str()),
            self.steps.len()
        );
    }

    /// Start the current exercise over.
    pub fn reset(&mut self) {
        self.transition(0, Correctness::Unknown, false);
    }

    pub fn exercise(&self) -> Option<&Exercise> {
        self.exercise.as_ref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn last(&self) -> Correctness {
        self.last
    }

    #[cfg(test)]
    pub fn chord_latched(&self) -> bool {
        self.chord_latched
    }

    pub fn progress(&self) -> Progress {
        match self.exercise {
            None => Progress::NoExercise,
            Some(_) if self.index >= self.steps.len() => Progress::Complete,
            Some(_) => Progress::AwaitingStep(self.index),
        }
    }

    pub fn current_step(&self) -> Option<&Step> {
        match self.progress() {
            Progress::AwaitingStep(i) => self.steps.get(i),
            _ => None,
        }
    }

    /// Feed one event from key capture.
    pub fn handle(&mut self, event: &CaptureEvent) {
        match event {
            CaptureEvent::Pressed { key, .. } => self.key_down(key),
            CaptureEvent::Released { .. } => {}
            CaptureEvent::Snapshot(keys) => self.keys_changed(keys),
        }
    }

    /// A discrete key-down. Only single-key steps react.
    pub fn key_down(&mut self, key: &str) {
        let Some(Step::Single(expected)) = self.current_step() else {
            return;
        };
        if keymap::normalize(key) == *expected {
            self.transition(self.index + 1, Correctness::Correct, false);
        } else {
            self.transition(self.index, Correctness::Incorrect, self.chord_latched);
        }
    }

    /// A new held-keys snapshot. Only chord steps react.
    pub fn keys_changed(&mut self, held: &ActiveKeys) {
        let Some(Step::Chord(keys)) = self.current_step() else {
            return;
        };
        if keys.is_empty() || !held.contains_all(keys) || self.chord_latched {
            return;
        }
        self.transition(self.index + 1, Correctness::Correct, true);
    }

    /// The only place the index, result and latch change. The latch is kept
    /// only when `index` equals the current one; moving always clears it.
    fn transition(&mut self, index: usize, last: Correctness, chord_latched: bool) {
        let moved = index != self.index;
        self.index = index;
        self.last = last;
        self.chord_latched = chord_latched && !moved;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::catalog::Difficulty;

    fn exercise(sequence: &[&str]) -> Exercise {
        Exercise {
            id: "test".into(),
            title: "Test".into(),
            description: None,
            sequence: sequence.iter().map(|s| s.to_string()).collect(),
            difficulty: Difficulty::Basico,
            sort_order: None,
            created_at: Utc::now(),
        }
    }

    fn lesson(sequence: &[&str]) -> Lesson {
        let mut lesson = Lesson::new();
        lesson.select(exercise(sequence));
        lesson
    }

    #[test]
    fn starts_without_exercise() {
        let mut lesson = Lesson::new();
        assert_eq!(lesson.progress(), Progress::NoExercise);
        lesson.key_down("a");
        lesson.reset();
        assert_eq!(lesson.progress(), Progress::NoExercise);
        assert_eq!(lesson.last(), Correctness::Unknown);
    }

    #[test]
    fn empty_exercise_is_complete() {
        let lesson = lesson(&[]);
        assert_eq!(lesson.progress(), Progress::Complete);
    }

    #[test]
    fn wrong_key_marks_incorrect() {
        let mut lesson = lesson(&["a", "s"]);
        lesson.key_down("s");
        assert_eq!(lesson.index(), 0);
        assert_eq!(lesson.last(), Correctness::Incorrect);
    }

    #[test]
    fn sequence_in_order_completes() {
        let mut lesson = lesson(&["a", "s"]);
        lesson.key_down("a");
        assert_eq!(lesson.progress(), Progress::AwaitingStep(1));
        lesson.key_down("S");
        assert_eq!(lesson.progress(), Progress::Complete);
        assert_eq!(lesson.last(), Correctness::Correct);

        // Complete exercises ignore further input.
        lesson.key_down("q");
        assert_eq!(lesson.last(), Correctness::Correct);
    }

    #[test]
    fn single_steps_ignore_snapshots_and_releases() {
        let mut lesson = lesson(&["a"]);
        lesson.keys_changed(&ActiveKeys::from(["a"]));
        lesson.handle(&CaptureEvent::Released { key: "a", note: "C4" });
        assert_eq!(lesson.index(), 0);
        assert_eq!(lesson.last(), Correctness::Unknown);
    }

    #[test]
    fn mixed_case_step_tokens_match() {
        let mut lesson = lesson(&["A"]);
        lesson.key_down("a");
        assert_eq!(lesson.progress(), Progress::Complete);
    }

    #[test]
    fn partial_chord_does_not_advance() {
        let mut lesson = lesson(&["a,d,g"]);
        lesson.keys_changed(&ActiveKeys::from(["a", "d"]));
        assert_eq!(lesson.index(), 0);
        assert_eq!(lesson.last(), Correctness::Unknown);
    }

    #[test]
    fn chord_ignores_key_down() {
        let mut lesson = lesson(&["a,d,g"]);
        lesson.key_down("s");
        lesson.key_down("a");
        assert_eq!(lesson.index(), 0);
        assert_eq!(lesson.last(), Correctness::Unknown);
    }

    #[test]
    fn held_chord_advances_once() {
        let mut lesson = lesson(&["a,d,g", "f,h,a"]);
        let chord = ActiveKeys::from(["a", "d", "g"]);
        lesson.keys_changed(&chord);
        assert_eq!(lesson.progress(), Progress::AwaitingStep(1));
        assert_eq!(lesson.last(), Correctness::Correct);
        // Advancing re-armed the latch for the new step.
        assert!(!lesson.chord_latched());

        lesson.keys_changed(&chord);
        lesson.keys_changed(&ActiveKeys::from(["a", "d", "g", "s"]));
        assert_eq!(lesson.index(), 1);

        lesson.keys_changed(&ActiveKeys::from(["f", "h", "a"]));
        assert_eq!(lesson.progress(), Progress::Complete);
    }

    #[test]
    fn repressing_final_chord_does_not_readvance() {
        let mut lesson = lesson(&["a,d,g"]);
        let chord = ActiveKeys::from(["a", "d", "g"]);
        lesson.keys_changed(&chord);
        lesson.keys_changed(&ActiveKeys::from(["a", "d"]));
        lesson.keys_changed(&chord);
        assert_eq!(lesson.index(), 1);
        assert_eq!(lesson.progress(), Progress::Complete);
    }

    #[test]
    fn repeated_chord_steps_need_one_snapshot_each() {
        let mut lesson = lesson(&["a,d,g", "a,d,g"]);
        let chord = ActiveKeys::from(["a", "d", "g"]);
        lesson.keys_changed(&chord);
        assert_eq!(lesson.progress(), Progress::AwaitingStep(1));
        assert!(!lesson.chord_latched());

        // A wrong key-down on a chord step leaves index and latch alone.
        lesson.key_down("s");
        assert_eq!(lesson.index(), 1);

        // The next snapshot still holding the chord matches the second step.
        lesson.keys_changed(&ActiveKeys::from(["a", "d", "g", "s"]));
        assert_eq!(lesson.progress(), Progress::Complete);
        assert_eq!(lesson.last(), Correctness::Correct);
    }

    #[test]
    fn extra_held_keys_still_match_chord() {
        let mut lesson = lesson(&["a,w,g"]);
        lesson.keys_changed(&ActiveKeys::from(["a", "w", "g", "k"]));
        assert_eq!(lesson.progress(), Progress::Complete);
    }

    #[test]
    fn chord_then_single_key() {
        let mut lesson = lesson(&["a,d,g", "k"]);
        lesson.handle(&CaptureEvent::Snapshot(ActiveKeys::from(["a", "d", "g"])));
        lesson.handle(&CaptureEvent::Pressed { key: "k", note: "C5" });
        assert_eq!(lesson.progress(), Progress::Complete);
    }

    #[test]
    fn unknown_keys_never_match() {
        let mut lesson = lesson(&["z", "a,z"]);
        lesson.key_down("z");
        assert_eq!(lesson.index(), 0);
        assert_eq!(lesson.last(), Correctness::Incorrect);
    }

    #[test]
    fn empty_chord_never_matches() {
        let mut lesson = lesson(&[","]);
        lesson.keys_changed(&ActiveKeys::from(["a"]));
        lesson.keys_changed(&ActiveKeys::default());
        assert_eq!(lesson.index(), 0);
    }

    #[test]
    fn reset_and_reselect_clear_state() {
        let mut lesson = lesson(&["a", "s"]);
        lesson.key_down("a");
        lesson.key_down("d");
        lesson.reset();
        assert_eq!(lesson.progress(), Progress::AwaitingStep(0));
        assert_eq!(lesson.last(), Correctness::Unknown);
        assert!(!lesson.chord_latched());

        lesson.key_down("a");
        lesson.select(exercise(&["a,d,g"]));
        assert_eq!(lesson.index(), 0);
        assert_eq!(lesson.last(), Correctness::Unknown);
        assert!(lesson.current_step().unwrap().is_chord());
    }
}
