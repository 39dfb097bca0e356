mod api;
mod app;
mod error;
mod history;
mod narrator;
mod preferences;
mod recorder;
mod transcriber;
mod ui;

use std::cell::RefCell;
use std::rc::Rc;

use gtk4::prelude::*;
use libadwaita::prelude::*;

use app::{AppState, BackendEvent};
use narrator::SpeechEvent;

fn main() {
    env_logger::init();
    log::info!("Image Seek starting");

    let application = libadwaita::Application::builder()
        .application_id("com.github.image-seek")
        .build();

    application.connect_activate(on_activate);
    application.run();
}

fn on_activate(app: &libadwaita::Application) {
    // Async channels for background → UI communication
    let (backend_tx, backend_rx) = async_channel::unbounded::<BackendEvent>();
    let (speech_tx, speech_rx) = async_channel::unbounded::<SpeechEvent>();

    // Build app state
    let state = Rc::new(RefCell::new(AppState::new(backend_tx.clone(), speech_tx)));

    // Build UI
    let widgets = ui::window::build_window(app, &state);

    // Store UI handles in state and show the window
    {
        let mut s = state.borrow_mut();
        s.widgets = Some(widgets);
    }
    state.borrow().widgets.as_ref().unwrap().window.present();

    // Forward synthesis events into the backend event channel
    {
        let sender = backend_tx.clone();
        gtk4::glib::spawn_future_local(async move {
            while let Ok(event) = speech_rx.recv().await {
                let _ = sender.send(BackendEvent::Speech(event)).await;
            }
        });
    }

    // Attach backend event handler
    {
        let state_clone = state.clone();
        gtk4::glib::spawn_future_local(async move {
            while let Ok(event) = backend_rx.recv().await {
                app::handle_backend_event(&state_clone, event);
            }
        });
    }

    // Startup work: dataset presence check and speech model provisioning
    app::dataset::begin_status_check(&state);
    app::speech_model::ensure_speech_model(&state);
}
