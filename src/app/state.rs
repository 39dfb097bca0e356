use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use gtk4::prelude::*;

use crate::api::{ApiClient, DatasetStatus, SearchHit};
use crate::app::dataset::{DatasetController, DownloadOutcome};
use crate::app::recording::RecordingSession;
use crate::app::search::SearchSession;
use crate::history::SearchHistory;
use crate::narrator::{Narrator, SpdSynthesizer, SpeechEvent};
use crate::preferences::PreferenceStore;
use crate::recorder::MicCapability;
use crate::transcriber::WhisperEngine;
use crate::ui::window::WindowWidgets;

/// Events sent from background tasks to the GTK main thread.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    TranscriptReady(String),
    TranscriptFailed(String),
    SearchFinished {
        id: u64,
        query: String,
        outcome: Result<Vec<SearchHit>, String>,
    },
    DatasetChecked(Result<DatasetStatus, String>),
    DownloadFinished(DownloadOutcome),
    ModelDownloadProgress(u64, u64),
    ModelDownloadComplete,
    ModelFailed(String),
    Speech(SpeechEvent),
}

/// Central application state. Lives on the GTK main thread inside
/// Rc<RefCell<>>; background tasks talk back through `backend_sender`.
pub struct AppState {
    pub prefs: Rc<PreferenceStore>,
    pub narrator: Rc<Narrator>,
    pub api: ApiClient,
    pub history: SearchHistory,

    // Session state machines
    pub search: SearchSession,
    pub dataset: DatasetController,
    pub recording: RecordingSession<cpal::Stream>,

    // Speech input
    pub mic: MicCapability,
    pub whisper: Option<Arc<WhisperEngine>>,
    pub audio_buffer: Arc<Mutex<Vec<f32>>>,
    pub sample_rate: u32,

    pub tokio_rt: tokio::runtime::Runtime,
    pub backend_sender: async_channel::Sender<BackendEvent>,

    // UI handles
    pub widgets: Option<WindowWidgets>,
}

impl AppState {
    pub fn new(
        backend_sender: async_channel::Sender<BackendEvent>,
        speech_events: async_channel::Sender<SpeechEvent>,
    ) -> Self {
        let prefs = Rc::new(PreferenceStore::load());
        let history = SearchHistory::load();
        let tokio_rt = tokio::runtime::Runtime::new()
            .expect("Failed to create tokio runtime");
        let synthesizer = SpdSynthesizer::new(tokio_rt.handle().clone(), speech_events);
        let narrator = Rc::new(Narrator::new(prefs.clone(), Box::new(synthesizer)));

        Self {
            prefs,
            narrator,
            api: ApiClient::new(),
            history,
            search: SearchSession::new(),
            dataset: DatasetController::new(),
            recording: RecordingSession::Idle,
            mic: crate::recorder::detect_capability(),
            whisper: None,
            audio_buffer: Arc::new(Mutex::new(Vec::new())),
            sample_rate: 16000,
            tokio_rt,
            backend_sender,
            widgets: None,
        }
    }
}

/// Helper to update the search page status line.
pub fn set_status(state: &Rc<RefCell<AppState>>, text: &str) {
    let s = state.borrow();
    if let Some(ref w) = s.widgets {
        w.search_status.set_text(text);
    }
}
