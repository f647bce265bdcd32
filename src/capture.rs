use std::collections::BTreeSet;

use crossbeam_channel::{Receiver, Sender};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};

use crate::audio::NoteSink;
use crate::keymap::{self, KeySpec};

/// Point-in-time copy of the keys being held.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveKeys(BTreeSet<&'static str>);

impl ActiveKeys {
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    /// True when every key in `keys` is held.
    pub fn contains_all<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        keys.iter().all(|k| self.contains(k.as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().copied()
    }
}

impl<const N: usize> From<[&'static str; N]> for ActiveKeys {
    fn from(keys: [&'static str; N]) -> Self {
        ActiveKeys(keys.into_iter().collect())
    }
}

/// Published on every accepted press or release.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Pressed { key: &'static str, note: &'static str },
    Released { key: &'static str, note: &'static str },
    /// The held set after the change.
    Snapshot(ActiveKeys),
}

/// The host input that delivers press/release signals.
pub trait InputSource {
    fn name(&self) -> &str;
    fn attach(&mut self) -> anyhow::Result<()>;
    fn detach(&mut self);
}

/// Turns raw press/release signals into a de-duplicated set of held keys,
/// sounding each key once per physical press.
pub struct KeyCapture<S: NoteSink> {
    sink: S,
    held: BTreeSet<&'static str>,
    subscribers: Vec<Sender<CaptureEvent>>,
    source: Option<Box<dyn InputSource>>,
}

impl<S: NoteSink> KeyCapture<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            held: BTreeSet::new(),
            subscribers: Vec::new(),
            source: None,
        }
    }

    pub fn subscribe(&mut self) -> Receiver<CaptureEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Attach to `source`, replacing (and detaching) any previous one.
    pub fn attach(&mut self, mut source: Box<dyn InputSource>) -> anyhow::Result<()> {
        self.teardown();
        source.attach()?;
        log::info!("Key capture attached to {}", source.name());
        self.source = Some(source);
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.source.is_some()
    }

    /// Release everything held and detach from the input source.
    pub fn teardown(&mut self) {
        for key in std::mem::take(&mut self.held) {
            if let Some(spec) = keymap::note_for(key) {
                self.sound_off(spec);
            }
        }
        if let Some(mut source) = self.source.take() {
            source.detach();
            log::info!("Key capture detached from {}", source.name());
        }
    }

    pub fn active_keys(&self) -> ActiveKeys {
        ActiveKeys(self.held.clone())
    }

    /// Handle a press signal. Returns true when it changed the held set.
    pub fn press(&mut self, raw: &str, repeat: bool) -> bool {
        if repeat || !self.is_attached() {
            return false;
        }
        let Some(spec) = keymap::note_for(raw) else {
            return false;
        };
        if !self.held.insert(spec.key) {
            return false;
        }
        if let Err(e) = self.sink.note_on(spec) {
            log::warn!("note on {} dropped: {e}", spec.note);
        }
        log::debug!("Piano: NoteOn {} ({})", spec.note, spec.key);
        self.publish(CaptureEvent::Pressed {
            key: spec.key,
            note: spec.note,
        });
        self.publish(CaptureEvent::Snapshot(self.active_keys()));
        true
    }

    /// Handle a release signal. Returns true when it changed the held set.
    pub fn release(&mut self, raw: &str) -> bool {
        let Some(spec) = keymap::note_for(raw) else {
            return false;
        };
        if !self.held.remove(spec.key) {
            return false;
        }
        self.sound_off(spec);
        self.publish(CaptureEvent::Released {
            key: spec.key,
            note: spec.note,
        });
        self.publish(CaptureEvent::Snapshot(self.active_keys()));
        true
    }

    /// Route a terminal key event. Returns true when it changed the held set.
    pub fn handle_key_event(&mut self, event: KeyEvent) -> bool {
        let KeyCode::Char(c) = event.code else {
            return false;
        };
        let mut buf = [0u8; 4];
        let raw = c.encode_utf8(&mut buf);
        match event.kind {
            KeyEventKind::Press => self.press(raw, false),
            KeyEventKind::Repeat => self.press(raw, true),
            KeyEventKind::Release => self.release(raw),
        }
    }

    fn sound_off(&mut self, spec: &KeySpec) {
        if let Err(e) = self.sink.note_off(spec) {
            log::warn!("note off {} dropped: {e}", spec.note);
        }
        log::debug!("Piano: NoteOff {} ({})", spec.note, spec.key);
    }

    fn publish(&mut self, event: CaptureEvent) {
        // Drop subscribers whose receiver has gone away.
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

impl<S: NoteSink> Drop for KeyCapture<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
