use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::SynthesisError;
use crate::preferences::PreferenceStore;

/// One discrete narration request.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    /// Monotonic issue counter; any later utterance supersedes this one.
    pub issued_at: u64,
}

/// A synthesis voice as reported by the backend.
#[derive(Debug, Clone)]
pub struct Voice {
    pub name: String,
    /// Language tag, e.g. "en" or "en-US".
    pub language: String,
}

/// Completion events reported by the synthesis backend, tagged with the
/// utterance's `issued_at` id.
#[derive(Debug, Clone)]
pub enum SpeechEvent {
    Started(u64),
    Finished(u64),
    Failed(u64, String),
}

/// Cancellation handle for an in-flight utterance.
pub trait UtteranceHandle {
    fn cancel(&self);
}

/// External speech-synthesis capability.
pub trait SpeechSynthesizer {
    fn voices(&self) -> Vec<Voice>;
    fn speak(&self, utterance: &Utterance, voice: Option<&Voice>) -> Box<dyn UtteranceHandle>;
}

struct ActiveUtterance {
    id: u64,
    handle: Box<dyn UtteranceHandle>,
}

/// Serializes all speech output into at most one active utterance.
/// Cancel-then-speak: a new request always silences the current one first,
/// so the most recently requested message wins.
pub struct Narrator {
    prefs: Rc<PreferenceStore>,
    backend: Box<dyn SpeechSynthesizer>,
    voice: Option<Voice>,
    next_id: Cell<u64>,
    active: RefCell<Option<ActiveUtterance>>,
}

impl Narrator {
    pub fn new(prefs: Rc<PreferenceStore>, backend: Box<dyn SpeechSynthesizer>) -> Self {
        let voice = pick_voice(&backend.voices());
        match voice {
            Some(ref v) => log::info!("Narration voice: {} ({})", v.name, v.language),
            None => log::info!("No English synthesis voice, using platform default"),
        }
        Self {
            prefs,
            backend,
            voice,
            next_id: Cell::new(0),
            active: RefCell::new(None),
        }
    }

    /// Speak `text`, silencing any active utterance first. A complete no-op
    /// while the screen-reader preference is off; the gate applies to new
    /// requests only, so an utterance already running is left to finish.
    pub fn speak(&self, text: &str) {
        if !self.prefs.get().screen_reader_enabled {
            return;
        }
        if let Some(prev) = self.active.borrow_mut().take() {
            prev.handle.cancel();
        }
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let utterance = Utterance {
            text: text.to_string(),
            issued_at: id,
        };
        log::debug!("Narrating #{id}: {text}");
        let handle = self.backend.speak(&utterance, self.voice.as_ref());
        *self.active.borrow_mut() = Some(ActiveUtterance { id, handle });
    }

    pub fn is_speaking(&self) -> bool {
        self.active.borrow().is_some()
    }

    /// Route a backend completion event. Events for superseded utterances
    /// are ignored; failures are absorbed since narration is best-effort.
    pub fn handle_event(&self, event: SpeechEvent) {
        match event {
            SpeechEvent::Started(_) => {}
            SpeechEvent::Finished(id) => self.clear_if_active(id),
            SpeechEvent::Failed(id, message) => {
                log::warn!("Narration failed: {message}");
                self.clear_if_active(id);
            }
        }
    }

    fn clear_if_active(&self, id: u64) {
        let mut active = self.active.borrow_mut();
        if active.as_ref().is_some_and(|a| a.id == id) {
            *active = None;
        }
    }
}

/// Deterministically prefer an English voice; fall back to the platform
/// default when none is available.
fn pick_voice(voices: &[Voice]) -> Option<Voice> {
    let mut candidates: Vec<&Voice> = voices
        .iter()
        .filter(|v| v.language == "en" || v.language.starts_with("en-"))
        .collect();
    candidates.sort_by(|a, b| (&a.language, &a.name).cmp(&(&b.language, &b.name)));
    candidates.first().map(|v| (*v).clone())
}

/// Speech-dispatcher backend: voices via `spd-say -L`, synthesis via
/// `spd-say --wait`, cancellation by killing the child process.
pub struct SpdSynthesizer {
    rt: tokio::runtime::Handle,
    events: async_channel::Sender<SpeechEvent>,
}

impl SpdSynthesizer {
    pub fn new(rt: tokio::runtime::Handle, events: async_channel::Sender<SpeechEvent>) -> Self {
        Self { rt, events }
    }
}

struct SpdHandle {
    cancel: async_channel::Sender<()>,
}

impl UtteranceHandle for SpdHandle {
    fn cancel(&self) {
        // Closing the channel wakes the speak task's cancel arm.
        self.cancel.close();
    }
}

impl SpeechSynthesizer for SpdSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        list_spd_voices().unwrap_or_else(|e| {
            log::warn!("Could not list synthesis voices: {e}");
            Vec::new()
        })
    }

    fn speak(&self, utterance: &Utterance, voice: Option<&Voice>) -> Box<dyn UtteranceHandle> {
        let (cancel_tx, cancel_rx) = async_channel::bounded::<()>(1);
        let events = self.events.clone();
        let id = utterance.issued_at;
        let text = utterance.text.clone();
        let language = voice.map(|v| v.language.clone());

        self.rt.spawn(async move {
            let mut cmd = tokio::process::Command::new("spd-say");
            cmd.arg("--wait");
            if let Some(ref lang) = language {
                cmd.arg("-l").arg(lang);
            }
            cmd.arg("--").arg(&text);
            cmd.stdout(std::process::Stdio::null());
            cmd.stderr(std::process::Stdio::null());
            cmd.kill_on_drop(true);

            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => {
                    let _ = events
                        .send(SpeechEvent::Failed(id, format!("failed to spawn spd-say: {e}")))
                        .await;
                    return;
                }
            };
            let _ = events.send(SpeechEvent::Started(id)).await;

            tokio::select! {
                status = child.wait() => {
                    let event = match status {
                        Ok(s) if s.success() => SpeechEvent::Finished(id),
                        Ok(s) => SpeechEvent::Failed(id, format!("spd-say exited with {s}")),
                        Err(e) => SpeechEvent::Failed(id, e.to_string()),
                    };
                    let _ = events.send(event).await;
                }
                _ = cancel_rx.recv() => {
                    // Superseded; the narrator has already moved on.
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        });

        Box::new(SpdHandle { cancel: cancel_tx })
    }
}

/// `spd-say -L` prints a header line, then one voice per line:
/// name, language, variant.
fn list_spd_voices() -> Result<Vec<Voice>, SynthesisError> {
    let output = std::process::Command::new("spd-say")
        .arg("-L")
        .output()
        .map_err(|e| SynthesisError::Spawn(e.to_string()))?;
    if !output.status.success() {
        return Err(SynthesisError::Backend(format!(
            "spd-say -L exited with {}",
            output.status
        )));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let name = cols.next()?;
            let language = cols.next()?;
            Some(Voice {
                name: name.to_string(),
                language: language.to_string(),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct BackendLog {
        spoken: Vec<(u64, String)>,
        cancelled: Vec<u64>,
    }

    struct MockSynthesizer {
        log: Rc<RefCell<BackendLog>>,
        voices: Vec<Voice>,
    }

    struct MockHandle {
        id: u64,
        log: Rc<RefCell<BackendLog>>,
    }

    impl UtteranceHandle for MockHandle {
        fn cancel(&self) {
            self.log.borrow_mut().cancelled.push(self.id);
        }
    }

    impl SpeechSynthesizer for MockSynthesizer {
        fn voices(&self) -> Vec<Voice> {
            self.voices.clone()
        }

        fn speak(&self, u: &Utterance, _voice: Option<&Voice>) -> Box<dyn UtteranceHandle> {
            self.log.borrow_mut().spoken.push((u.issued_at, u.text.clone()));
            Box::new(MockHandle {
                id: u.issued_at,
                log: self.log.clone(),
            })
        }
    }

    fn narrator_with_screen_reader(enabled: bool) -> (Narrator, Rc<RefCell<BackendLog>>) {
        let prefs = Rc::new(PreferenceStore::in_memory());
        prefs.update(|p| p.screen_reader_enabled = enabled);
        let log = Rc::new(RefCell::new(BackendLog::default()));
        let backend = MockSynthesizer {
            log: log.clone(),
            voices: Vec::new(),
        };
        (Narrator::new(prefs, Box::new(backend)), log)
    }

    #[test]
    fn later_utterance_cancels_the_active_one() {
        let (narrator, log) = narrator_with_screen_reader(true);
        narrator.speak("first");
        narrator.speak("second");

        let log = log.borrow();
        assert_eq!(log.spoken.len(), 2);
        // Only the first utterance was cancelled; the second is active.
        assert_eq!(log.cancelled, vec![log.spoken[0].0]);
        drop(log);
        assert!(narrator.is_speaking());
    }

    #[test]
    fn completion_of_a_superseded_utterance_is_ignored() {
        let (narrator, log) = narrator_with_screen_reader(true);
        narrator.speak("first");
        let first_id = log.borrow().spoken[0].0;
        narrator.speak("second");

        // The cancelled utterance's terminal event arrives late.
        narrator.handle_event(SpeechEvent::Finished(first_id));
        assert!(narrator.is_speaking());

        let second_id = log.borrow().spoken[1].0;
        narrator.handle_event(SpeechEvent::Finished(second_id));
        assert!(!narrator.is_speaking());
    }

    #[test]
    fn disabled_screen_reader_never_reaches_the_backend() {
        let (narrator, log) = narrator_with_screen_reader(false);
        narrator.speak("nobody hears this");
        assert!(log.borrow().spoken.is_empty());
        assert!(!narrator.is_speaking());
    }

    #[test]
    fn synthesis_failure_clears_the_speaking_flag() {
        let (narrator, log) = narrator_with_screen_reader(true);
        narrator.speak("doomed");
        let id = log.borrow().spoken[0].0;
        narrator.handle_event(SpeechEvent::Failed(id, "backend gone".to_string()));
        assert!(!narrator.is_speaking());
    }

    #[test]
    fn utterance_ids_are_strictly_increasing() {
        let (narrator, log) = narrator_with_screen_reader(true);
        narrator.speak("a");
        narrator.speak("b");
        narrator.speak("c");
        let ids: Vec<u64> = log.borrow().spoken.iter().map(|(id, _)| *id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn prefers_english_voice_deterministically() {
        let voices = vec![
            Voice { name: "zofia".into(), language: "pl".into() },
            Voice { name: "samantha".into(), language: "en-US".into() },
            Voice { name: "daniel".into(), language: "en-GB".into() },
        ];
        let picked = pick_voice(&voices).unwrap();
        assert_eq!(picked.name, "daniel");

        let none = pick_voice(&[Voice { name: "zofia".into(), language: "pl".into() }]);
        assert!(none.is_none());
    }
}
