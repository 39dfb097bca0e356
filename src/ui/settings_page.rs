use std::cell::RefCell;
use std::rc::Rc;

use gtk4::prelude::*;
use libadwaita::prelude::*;

use crate::app::AppState;

/// Build the settings page: accessibility toggles and the model temperature.
pub fn build(
    state: &Rc<RefCell<AppState>>,
    split_view: &libadwaita::OverlaySplitView,
    toast_overlay: &libadwaita::ToastOverlay,
) -> gtk4::Box {
    let prefs = state.borrow().prefs.get();

    let content = gtk4::Box::new(gtk4::Orientation::Vertical, 0);
    content.set_margin_start(16);
    content.set_margin_end(16);
    content.set_margin_top(12);
    content.set_margin_bottom(12);

    // --- App settings ---
    let app_group = libadwaita::PreferencesGroup::new();
    app_group.set_title("App Settings");

    let screen_reader_row = libadwaita::SwitchRow::builder()
        .title("Screen Reader")
        .subtitle("Enable voice feedback for search results")
        .active(prefs.screen_reader_enabled)
        .build();
    {
        let state_clone = state.clone();
        screen_reader_row.connect_active_notify(move |row| {
            let enabled = row.is_active();
            state_clone
                .borrow()
                .prefs
                .update(|p| p.screen_reader_enabled = enabled);
        });
    }
    app_group.add(&screen_reader_row);

    let sidebar_row = libadwaita::SwitchRow::builder()
        .title("Sidebar Default")
        .subtitle("Keep sidebar open by default")
        .active(prefs.sidebar_open_default)
        .build();
    {
        let state_clone = state.clone();
        let split = split_view.clone();
        sidebar_row.connect_active_notify(move |row| {
            let open = row.is_active();
            state_clone
                .borrow()
                .prefs
                .update(|p| p.sidebar_open_default = open);
            split.set_show_sidebar(open);
        });
    }
    app_group.add(&sidebar_row);

    content.append(&app_group);

    // --- Model settings ---
    let model_group = libadwaita::PreferencesGroup::new();
    model_group.set_title("Model Settings");
    model_group.set_margin_top(12);

    let temp_box = gtk4::Box::new(gtk4::Orientation::Vertical, 4);
    temp_box.set_margin_top(8);

    let temp_label = gtk4::Label::new(Some("Model Temperature"));
    temp_label.set_xalign(0.0);
    temp_box.append(&temp_label);

    let temperature_scale =
        gtk4::Scale::with_range(gtk4::Orientation::Horizontal, 0.0, 1.0, 0.1);
    temperature_scale.set_value(prefs.model_temperature);
    temperature_scale.set_draw_value(true);
    temperature_scale.set_digits(1);
    temperature_scale.set_hexpand(true);
    temp_box.append(&temperature_scale);

    let temp_hint = gtk4::Label::new(Some(
        "Adjust the creativity level of the model. Higher values make the \
         output more diverse but potentially less focused.",
    ));
    temp_hint.add_css_class("dim-label");
    temp_hint.set_wrap(true);
    temp_hint.set_xalign(0.0);
    temp_box.append(&temp_hint);

    let save_button = gtk4::Button::with_label("Save");
    save_button.add_css_class("suggested-action");
    save_button.set_halign(gtk4::Align::Start);
    save_button.set_margin_top(8);
    {
        let state_clone = state.clone();
        let scale = temperature_scale.clone();
        let overlay = toast_overlay.clone();
        save_button.connect_clicked(move |_| {
            let value = scale.value();
            let current = state_clone.borrow().prefs.get().model_temperature;
            // Only persist when the value actually changed.
            if (value - current).abs() > f64::EPSILON {
                state_clone
                    .borrow()
                    .prefs
                    .update(|p| p.model_temperature = value);
                let toast = libadwaita::Toast::new("Temperature settings saved");
                toast.set_timeout(2);
                overlay.add_toast(toast);
            }
        });
    }
    temp_box.append(&save_button);

    model_group.add(&temp_box);
    content.append(&model_group);

    content
}
