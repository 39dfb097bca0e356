use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use gtk4::glib;
use gtk4::prelude::*;

use super::state::{set_status, AppState, BackendEvent};
use crate::transcriber::WhisperEngine;

/// Download and/or load the speech model so voice search becomes available.
pub fn ensure_speech_model(state: &Rc<RefCell<AppState>>) {
    if crate::transcriber::model_exists() {
        load_speech_engine(state);
    } else {
        log::info!("Speech model not found, starting download");
        set_status(state, "Downloading speech model\u{2026}");
        let sender = state.borrow().backend_sender.clone();
        let progress_sender = sender.clone();

        state.borrow().tokio_rt.spawn(async move {
            let result = crate::transcriber::download_model(move |downloaded, total| {
                let _ = progress_sender
                    .try_send(BackendEvent::ModelDownloadProgress(downloaded, total));
            })
            .await;

            let event = match result {
                Ok(()) => BackendEvent::ModelDownloadComplete,
                Err(e) => BackendEvent::ModelFailed(e.to_string()),
            };
            let _ = sender.send(event).await;
        });
    }
}

/// Load the speech model in a blocking task, then deliver it to the main
/// thread.
pub fn load_speech_engine(state: &Rc<RefCell<AppState>>) {
    log::info!("Loading speech model...");
    set_status(state, "Loading speech model\u{2026}");

    let sender = state.borrow().backend_sender.clone();

    // We can't send Rc<RefCell> into tokio, so use a separate channel
    // to pass the loaded engine back to the main thread.
    let (engine_tx, engine_rx) = async_channel::bounded::<WhisperEngine>(1);

    state.borrow().tokio_rt.spawn(async move {
        let result = tokio::task::spawn_blocking(WhisperEngine::load).await;

        match result {
            Ok(Ok(engine)) => {
                let _ = engine_tx.send(engine).await;
            }
            Ok(Err(e)) => {
                let _ = sender.send(BackendEvent::ModelFailed(e.to_string())).await;
            }
            Err(e) => {
                let _ = sender
                    .send(BackendEvent::ModelFailed(format!("model load panicked: {e}")))
                    .await;
            }
        }
    });

    // Receive the loaded engine on the GTK main thread
    let state_clone = state.clone();
    glib::spawn_future_local(async move {
        if let Ok(engine) = engine_rx.recv().await {
            state_clone.borrow_mut().whisper = Some(Arc::new(engine));
            set_status(&state_clone, "Ready");
            if let Some(ref w) = state_clone.borrow().widgets {
                w.mic_button.set_sensitive(true);
            }
            log::info!("Speech engine ready");
        }
    });
}
