use std::cell::RefCell;
use std::rc::Rc;

use gtk4::prelude::*;

use super::dataset;
use super::recording;
use super::search;
use super::speech_model;
use super::state::{set_status, AppState, BackendEvent};

/// Handle a backend event. This is the single resumption point for every
/// asynchronous operation in the app.
pub fn handle_backend_event(state: &Rc<RefCell<AppState>>, event: BackendEvent) {
    match event {
        BackendEvent::TranscriptReady(transcript) => {
            log::info!("Transcript: {transcript}");
            state.borrow_mut().recording.reset();
            recording::sync_mic_button(state);

            if transcript.trim().is_empty() {
                set_status(state, "No speech detected");
                return;
            }
            if let Some(ref w) = state.borrow().widgets {
                w.search_entry.set_text(&transcript);
            }
            // The transcript itself is never narrated; the search session
            // announces what it does with it.
            search::submit_search(state, &transcript);
        }
        BackendEvent::TranscriptFailed(err) => {
            log::error!("Transcription failed: {err}");
            state.borrow_mut().recording.reset();
            recording::sync_mic_button(state);
            set_status(state, &format!("Transcription failed: {err}"));
        }
        BackendEvent::SearchFinished { id, query, outcome } => {
            search::apply_search_result(state, id, query, outcome);
        }
        BackendEvent::DatasetChecked(outcome) => {
            dataset::apply_check_result(state, outcome);
        }
        BackendEvent::DownloadFinished(outcome) => {
            dataset::apply_download_result(state, outcome);
        }
        BackendEvent::ModelDownloadProgress(downloaded, total) => {
            if let Some(ref w) = state.borrow().widgets {
                w.model_progress.set_visible(true);
                if total > 0 {
                    w.model_progress.set_fraction(downloaded as f64 / total as f64);
                    let mb_done = downloaded as f64 / 1_048_576.0;
                    let mb_total = total as f64 / 1_048_576.0;
                    w.model_progress.set_text(Some(&format!(
                        "Downloading speech model: {mb_done:.1} / {mb_total:.1} MB"
                    )));
                } else {
                    w.model_progress.pulse();
                }
            }
        }
        BackendEvent::ModelDownloadComplete => {
            if let Some(ref w) = state.borrow().widgets {
                w.model_progress.set_visible(false);
            }
            speech_model::load_speech_engine(state);
        }
        BackendEvent::ModelFailed(err) => {
            log::error!("Speech model unavailable: {err}");
            if let Some(ref w) = state.borrow().widgets {
                w.model_progress.set_visible(false);
            }
            set_status(state, "Voice search unavailable (speech model failed)");
        }
        BackendEvent::Speech(speech_event) => {
            let narrator = state.borrow().narrator.clone();
            narrator.handle_event(speech_event);
        }
    }
}
