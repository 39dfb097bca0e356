use std::cell::RefCell;
use std::rc::Rc;

use gtk4::prelude::*;
use libadwaita::prelude::*;

use crate::app::dataset::{self, DatasetPhase};
use crate::app::AppState;

/// Handles for the dataset management page.
pub struct DataPageWidgets {
    pub path_label: gtk4::Label,
    pub status_label: gtk4::Label,
    pub count_label: gtk4::Label,
    pub error_revealer: gtk4::Revealer,
    pub error_label: gtk4::Label,
    pub refresh_button: gtk4::Button,
    pub download_button: gtk4::Button,
    pub cancel_button: gtk4::Button,
    pub spinner: gtk4::Spinner,
}

/// Build the dataset page and wire its buttons.
pub fn build(state: &Rc<RefCell<AppState>>) -> (gtk4::Box, DataPageWidgets) {
    let content = gtk4::Box::new(gtk4::Orientation::Vertical, 0);
    content.set_margin_start(16);
    content.set_margin_end(16);
    content.set_margin_top(12);
    content.set_margin_bottom(12);

    // Error banner, hidden until a check or download fails.
    let error_label = gtk4::Label::new(None);
    error_label.add_css_class("error");
    error_label.set_wrap(true);
    error_label.set_xalign(0.0);
    let error_revealer = gtk4::Revealer::new();
    error_revealer.set_child(Some(&error_label));
    error_revealer.set_reveal_child(false);
    error_revealer.set_margin_bottom(8);
    content.append(&error_revealer);

    // --- Status group ---
    let status_group = libadwaita::PreferencesGroup::new();
    status_group.set_title("Dataset");

    let location_row = libadwaita::ActionRow::builder().title("Location").build();
    let path_label = gtk4::Label::new(Some("No dataset location"));
    path_label.add_css_class("dim-label");
    path_label.set_ellipsize(gtk4::pango::EllipsizeMode::Middle);
    location_row.add_suffix(&path_label);
    status_group.add(&location_row);

    let status_row = libadwaita::ActionRow::builder().title("Status").build();
    let status_label = gtk4::Label::new(Some("Unknown"));
    status_label.add_css_class("dim-label");
    status_row.add_suffix(&status_label);
    status_group.add(&status_row);

    let count_row = libadwaita::ActionRow::builder().title("Images").build();
    let count_label = gtk4::Label::new(Some("0"));
    count_label.add_css_class("dim-label");
    count_row.add_suffix(&count_label);
    status_group.add(&count_row);

    content.append(&status_group);

    // --- Actions ---
    let button_box = gtk4::Box::new(gtk4::Orientation::Horizontal, 8);
    button_box.set_margin_top(16);

    let refresh_button = gtk4::Button::from_icon_name("view-refresh-symbolic");
    refresh_button.set_tooltip_text(Some("Refresh status"));

    let download_button = gtk4::Button::with_label("Download Dataset");
    download_button.add_css_class("suggested-action");

    let cancel_button = gtk4::Button::with_label("Cancel");
    cancel_button.add_css_class("destructive-action");
    cancel_button.set_visible(false);

    let spinner = gtk4::Spinner::new();
    spinner.set_visible(false);

    button_box.append(&refresh_button);
    button_box.append(&download_button);
    button_box.append(&cancel_button);
    button_box.append(&spinner);
    content.append(&button_box);

    // Wiring
    {
        let state_clone = state.clone();
        refresh_button.connect_clicked(move |_| {
            dataset::begin_status_check(&state_clone);
        });
    }
    {
        let state_clone = state.clone();
        download_button.connect_clicked(move |_| {
            dataset::begin_download(&state_clone);
        });
    }
    {
        let state_clone = state.clone();
        cancel_button.connect_clicked(move |_| {
            dataset::cancel_download(&state_clone);
        });
    }

    (
        content,
        DataPageWidgets {
            path_label,
            status_label,
            count_label,
            error_revealer,
            error_label,
            refresh_button,
            download_button,
            cancel_button,
            spinner,
        },
    )
}

/// Sync the page widgets with the ingestion controller.
pub fn refresh(state: &Rc<RefCell<AppState>>) {
    let s = state.borrow();
    let Some(ref w) = s.widgets else { return };
    let d = &w.data;
    let controller = &s.dataset;

    match controller.status() {
        Some(status) => {
            d.path_label.set_text(&status.data_path);
            d.status_label
                .set_text(if status.exists { "Downloaded" } else { "Not Downloaded" });
            d.count_label.set_text(&status.image_count.to_string());
            d.download_button.set_label(if status.exists {
                "Refresh Dataset"
            } else {
                "Download Dataset"
            });
        }
        None => {
            d.path_label.set_text("No dataset location");
            d.status_label.set_text("Unknown");
            d.count_label.set_text("0");
        }
    }

    if let DatasetPhase::Failed(message) = controller.phase() {
        d.error_label.set_text(message);
        d.error_revealer.set_reveal_child(true);
    } else {
        d.error_revealer.set_reveal_child(false);
    }

    let busy = controller.is_downloading()
        || matches!(controller.phase(), DatasetPhase::Checking);
    d.spinner.set_visible(busy);
    if busy {
        d.spinner.start();
    } else {
        d.spinner.stop();
    }
    d.refresh_button.set_sensitive(!busy);
    d.download_button.set_sensitive(!busy);
    d.cancel_button.set_visible(controller.is_downloading());
}
