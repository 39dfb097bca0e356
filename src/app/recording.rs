use std::cell::RefCell;
use std::rc::Rc;

use gtk4::prelude::*;

use super::state::{set_status, AppState, BackendEvent};
use crate::error::CaptureError;
use crate::recorder::MicCapability;

/// Microphone session. At most one session holds the device at any time,
/// and every exit path releases the handle exactly once.
pub enum RecordingSession<H> {
    Idle,
    Recording { handle: H },
    Processing,
}

impl<H> RecordingSession<H> {
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Enter `Recording`. Refused unless idle: `start` while recording or
    /// processing must be a no-op.
    pub fn begin(&mut self, handle: H) -> bool {
        if !self.is_idle() {
            return false;
        }
        *self = Self::Recording { handle };
        true
    }

    /// Leave `Recording` for `Processing`, yielding the device handle to the
    /// caller exactly once. Idempotent: returns None when no session holds
    /// the device, leaving the state untouched.
    pub fn finish(&mut self) -> Option<H> {
        match std::mem::replace(self, Self::Processing) {
            Self::Recording { handle } => Some(handle),
            previous => {
                *self = previous;
                None
            }
        }
    }

    /// Return to `Idle` once the transcript (or its failure) has landed.
    pub fn reset(&mut self) {
        *self = Self::Idle;
    }
}

/// Start or stop recording from the mic button.
pub fn toggle_recording(state: &Rc<RefCell<AppState>>) {
    if state.borrow().recording.is_recording() {
        stop_recording(state);
    } else {
        start_recording(state);
    }
}

/// Start capturing from the microphone. Idempotent while a session is
/// already recording or processing.
pub fn start_recording(state: &Rc<RefCell<AppState>>) {
    {
        let s = state.borrow();
        if !s.recording.is_idle() {
            log::info!("Ignoring start while a recording session is active");
            return;
        }
        if let MicCapability::Unsupported(ref reason) = s.mic {
            log::warn!("Speech capture unavailable: {reason}");
            let narrator = s.narrator.clone();
            drop(s);
            narrator.speak("Speech capture is not supported on this system");
            return;
        }
        if s.whisper.is_none() {
            let narrator = s.narrator.clone();
            drop(s);
            narrator.speak("Speech recognition is still loading, please try again shortly");
            return;
        }
        s.audio_buffer.lock().unwrap().clear();
    }

    log::info!("Starting recording");
    let buffer = state.borrow().audio_buffer.clone();
    match crate::recorder::start_capture(buffer) {
        Ok((stream, sample_rate)) => {
            let mut s = state.borrow_mut();
            s.sample_rate = sample_rate;
            if !s.recording.begin(stream) {
                return;
            }
            drop(s);
            set_status(state, "Listening\u{2026}");
            sync_mic_button(state);
        }
        Err(CaptureError::PermissionDenied) => {
            log::error!("Microphone access denied");
            let narrator = state.borrow().narrator.clone();
            narrator.speak(
                "Microphone access was denied. Please allow microphone access and try again.",
            );
            set_status(state, "Microphone access denied");
        }
        Err(e) => {
            log::error!("Failed to start recording: {e}");
            let narrator = state.borrow().narrator.clone();
            narrator.speak("No microphone is available");
            set_status(state, &format!("Mic error: {e}"));
        }
    }
}

/// Stop recording and hand the captured audio to the recognizer.
/// Idempotent: a second stop finds no handle and does nothing.
pub fn stop_recording(state: &Rc<RefCell<AppState>>) {
    let Some(stream) = state.borrow_mut().recording.finish() else {
        return;
    };
    // Dropping the stream releases the microphone.
    drop(stream);
    log::info!("Stopped recording");
    sync_mic_button(state);

    let narrator = state.borrow().narrator.clone();
    narrator.speak("Recording stopped");

    let samples: Vec<f32> = state.borrow().audio_buffer.lock().unwrap().clone();
    if samples.is_empty() {
        state.borrow_mut().recording.reset();
        set_status(state, "No audio captured");
        return;
    }

    let sample_rate = state.borrow().sample_rate;
    log::info!(
        "Captured {} samples ({:.1}s at {}Hz)",
        samples.len(),
        samples.len() as f32 / sample_rate as f32,
        sample_rate
    );
    set_status(state, "Transcribing\u{2026}");
    dispatch_transcription(state, samples);
}

/// Run the recognizer on the tokio runtime; the transcript comes back as a
/// backend event.
fn dispatch_transcription(state: &Rc<RefCell<AppState>>, samples: Vec<f32>) {
    let s = state.borrow();
    let Some(engine) = s.whisper.clone() else {
        drop(s);
        state.borrow_mut().recording.reset();
        set_status(state, "Speech recognition not ready");
        return;
    };
    let sender = s.backend_sender.clone();

    s.tokio_rt.spawn(async move {
        let result =
            tokio::task::spawn_blocking(move || engine.transcribe(&samples)).await;

        let event = match result {
            Ok(Ok(text)) => BackendEvent::TranscriptReady(text),
            Ok(Err(e)) => BackendEvent::TranscriptFailed(e.to_string()),
            Err(e) => BackendEvent::TranscriptFailed(format!("transcription task panicked: {e}")),
        };
        let _ = sender.send(event).await;
    });
}

/// Reflect the session state on the mic button.
pub fn sync_mic_button(state: &Rc<RefCell<AppState>>) {
    let s = state.borrow();
    if let Some(ref w) = s.widgets {
        if s.recording.is_recording() {
            w.mic_button.add_css_class("destructive-action");
            w.mic_button.set_tooltip_text(Some("Stop recording"));
        } else {
            w.mic_button.remove_css_class("destructive-action");
            w.mic_button.set_tooltip_text(Some("Search by voice"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RecordingSession;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Stand-in device handle that counts its releases.
    struct FakeHandle {
        released: Rc<Cell<u32>>,
    }

    impl Drop for FakeHandle {
        fn drop(&mut self) {
            self.released.set(self.released.get() + 1);
        }
    }

    #[test]
    fn double_stop_releases_the_handle_exactly_once() {
        let released = Rc::new(Cell::new(0));
        let mut session = RecordingSession::Idle;
        assert!(session.begin(FakeHandle {
            released: released.clone(),
        }));

        drop(session.finish());
        assert_eq!(released.get(), 1);

        // Second stop in immediate succession: no handle, no error.
        assert!(session.finish().is_none());
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn start_while_recording_is_a_no_op() {
        let released = Rc::new(Cell::new(0));
        let mut session = RecordingSession::Idle;
        assert!(session.begin(FakeHandle {
            released: released.clone(),
        }));
        // The second handle is refused and dropped by the caller; the first
        // stays in place.
        assert!(!session.begin(FakeHandle {
            released: released.clone(),
        }));
        assert!(session.is_recording());
    }

    #[test]
    fn start_while_processing_is_refused() {
        let released = Rc::new(Cell::new(0));
        let mut session = RecordingSession::Idle;
        session.begin(FakeHandle {
            released: released.clone(),
        });
        drop(session.finish());

        assert!(!session.begin(FakeHandle {
            released: released.clone(),
        }));
        session.reset();
        assert!(session.is_idle());
    }

    #[test]
    fn stop_while_idle_is_a_no_op() {
        let mut session: RecordingSession<FakeHandle> = RecordingSession::Idle;
        assert!(session.finish().is_none());
        assert!(session.is_idle());
    }
}
