use std::cell::RefCell;
use std::rc::Rc;

use gtk4::prelude::*;
use libadwaita::prelude::*;

use crate::app::{self, AppState};
use crate::ui::data_page::{self, DataPageWidgets};
use crate::ui::settings_page;

/// Handles returned from building the main window.
pub struct WindowWidgets {
    pub window: libadwaita::ApplicationWindow,
    pub split_view: libadwaita::OverlaySplitView,
    pub toast_overlay: libadwaita::ToastOverlay,
    pub search_entry: gtk4::Entry,
    pub mic_button: gtk4::Button,
    pub search_button: gtk4::Button,
    pub search_spinner: gtk4::Spinner,
    pub search_status: gtk4::Label,
    pub results_list: gtk4::ListBox,
    pub results_placeholder: gtk4::Label,
    pub model_progress: gtk4::ProgressBar,
    pub data: DataPageWidgets,
}

/// Build the main window: sidebar navigation plus the search, dataset and
/// settings pages.
pub fn build_window(
    app: &libadwaita::Application,
    state: &Rc<RefCell<AppState>>,
) -> WindowWidgets {
    let prefs = state.borrow().prefs.get();

    let window = libadwaita::ApplicationWindow::builder()
        .application(app)
        .title("Image Seek")
        .default_width(900)
        .default_height(640)
        .build();

    let toast_overlay = libadwaita::ToastOverlay::new();
    let split_view = libadwaita::OverlaySplitView::new();
    split_view.set_show_sidebar(prefs.sidebar_open_default);

    // --- Sidebar navigation ---
    let sidebar_list = gtk4::ListBox::new();
    sidebar_list.add_css_class("navigation-sidebar");
    for title in ["Search", "Dataset", "Settings"] {
        let label = gtk4::Label::new(Some(title));
        label.set_xalign(0.0);
        label.set_margin_top(8);
        label.set_margin_bottom(8);
        label.set_margin_start(8);
        let row = gtk4::ListBoxRow::new();
        row.set_child(Some(&label));
        sidebar_list.append(&row);
    }

    let sidebar_view = libadwaita::ToolbarView::new();
    let sidebar_header = libadwaita::HeaderBar::new();
    sidebar_view.add_top_bar(&sidebar_header);
    sidebar_view.set_content(Some(&sidebar_list));
    split_view.set_sidebar(Some(&sidebar_view));

    // --- Pages ---
    let stack = gtk4::Stack::new();

    let (search_page, search_widgets) = build_search_page(state);
    stack.add_named(&search_page, Some("search"));

    let (data_container, data) = data_page::build(state);
    stack.add_named(&data_container, Some("dataset"));

    let settings = settings_page::build(state, &split_view, &toast_overlay);
    stack.add_named(&settings, Some("settings"));

    {
        let stack_clone = stack.clone();
        sidebar_list.connect_row_selected(move |_, row| {
            if let Some(row) = row {
                let name = match row.index() {
                    0 => "search",
                    1 => "dataset",
                    _ => "settings",
                };
                stack_clone.set_visible_child_name(name);
            }
        });
    }
    sidebar_list.select_row(sidebar_list.row_at_index(0).as_ref());

    // --- Content column ---
    let content_view = libadwaita::ToolbarView::new();
    let header = libadwaita::HeaderBar::new();

    let sidebar_toggle = gtk4::ToggleButton::new();
    sidebar_toggle.set_icon_name("sidebar-show-symbolic");
    sidebar_toggle.set_active(prefs.sidebar_open_default);
    {
        let split = split_view.clone();
        sidebar_toggle.connect_toggled(move |button| {
            split.set_show_sidebar(button.is_active());
        });
    }
    header.pack_start(&sidebar_toggle);
    content_view.add_top_bar(&header);
    content_view.set_content(Some(&stack));

    split_view.set_content(Some(&content_view));
    toast_overlay.set_child(Some(&split_view));
    window.set_content(Some(&toast_overlay));

    WindowWidgets {
        window,
        split_view,
        toast_overlay,
        search_entry: search_widgets.entry,
        mic_button: search_widgets.mic_button,
        search_button: search_widgets.search_button,
        search_spinner: search_widgets.spinner,
        search_status: search_widgets.status,
        results_list: search_widgets.results_list,
        results_placeholder: search_widgets.placeholder,
        model_progress: search_widgets.model_progress,
        data,
    }
}

struct SearchPageWidgets {
    entry: gtk4::Entry,
    mic_button: gtk4::Button,
    search_button: gtk4::Button,
    spinner: gtk4::Spinner,
    status: gtk4::Label,
    results_list: gtk4::ListBox,
    placeholder: gtk4::Label,
    model_progress: gtk4::ProgressBar,
}

fn build_search_page(state: &Rc<RefCell<AppState>>) -> (gtk4::Box, SearchPageWidgets) {
    let content = gtk4::Box::new(gtk4::Orientation::Vertical, 0);
    content.set_margin_start(16);
    content.set_margin_end(16);
    content.set_margin_top(12);
    content.set_margin_bottom(12);

    // Entry row: query, mic toggle, submit
    let entry_box = gtk4::Box::new(gtk4::Orientation::Horizontal, 8);

    let entry = gtk4::Entry::builder()
        .placeholder_text("Describe the image you're looking for...")
        .hexpand(true)
        .build();

    let mic_button = gtk4::Button::from_icon_name("audio-input-microphone-symbolic");
    mic_button.set_tooltip_text(Some("Search by voice"));
    // Enabled once the speech engine is ready.
    mic_button.set_sensitive(false);

    let search_button = gtk4::Button::with_label("Search");
    search_button.add_css_class("suggested-action");

    let spinner = gtk4::Spinner::new();
    spinner.set_visible(false);

    entry_box.append(&entry);
    entry_box.append(&mic_button);
    entry_box.append(&search_button);
    entry_box.append(&spinner);
    content.append(&entry_box);

    let status = gtk4::Label::new(Some("Starting..."));
    status.add_css_class("dim-label");
    status.set_xalign(0.0);
    status.set_margin_top(8);
    content.append(&status);

    // Results
    let results_list = gtk4::ListBox::new();
    results_list.set_selection_mode(gtk4::SelectionMode::None);
    results_list.add_css_class("boxed-list");
    results_list.set_visible(false);
    results_list.set_margin_top(12);

    let placeholder = gtk4::Label::new(Some(
        "No images available. Start by searching for something above.",
    ));
    placeholder.add_css_class("dim-label");
    placeholder.set_wrap(true);
    placeholder.set_vexpand(true);
    placeholder.set_valign(gtk4::Align::Center);

    let results_area = gtk4::Box::new(gtk4::Orientation::Vertical, 0);
    results_area.append(&results_list);
    results_area.append(&placeholder);

    let scrolled = gtk4::ScrolledWindow::builder()
        .hscrollbar_policy(gtk4::PolicyType::Never)
        .vexpand(true)
        .child(&results_area)
        .build();
    content.append(&scrolled);

    let model_progress = gtk4::ProgressBar::new();
    model_progress.set_margin_top(16);
    model_progress.set_visible(false);
    model_progress.set_show_text(true);
    model_progress.set_text(Some("Downloading speech model..."));
    content.append(&model_progress);

    // Wiring
    {
        let state_clone = state.clone();
        let entry_clone = entry.clone();
        search_button.connect_clicked(move |_| {
            app::search::submit_search(&state_clone, entry_clone.text().as_str());
        });
    }
    {
        let state_clone = state.clone();
        entry.connect_activate(move |entry| {
            app::search::submit_search(&state_clone, entry.text().as_str());
        });
    }
    {
        let state_clone = state.clone();
        mic_button.connect_clicked(move |_| {
            app::recording::toggle_recording(&state_clone);
        });
    }

    (
        content,
        SearchPageWidgets {
            entry,
            mic_button,
            search_button,
            spinner,
            status,
            results_list,
            placeholder,
            model_progress,
        },
    )
}

/// Rebuild the result rows from the search session's visible results.
pub fn render_results(state: &Rc<RefCell<AppState>>) {
    let s = state.borrow();
    let Some(ref w) = s.widgets else { return };

    while let Some(row) = w.results_list.row_at_index(0) {
        w.results_list.remove(&row);
    }

    let results = s.search.results();
    w.results_placeholder.set_visible(results.is_empty());
    w.results_list.set_visible(!results.is_empty());

    for hit in results {
        let row = libadwaita::ActionRow::builder()
            .title(file_name(&hit.path))
            .subtitle(&format!("Similarity: {:.1}%", hit.similarity * 100.0))
            .build();
        w.results_list.append(&row);
    }
}

/// The backend reports dataset-relative paths with either separator.
fn file_name(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::file_name;

    #[test]
    fn file_name_handles_both_separators() {
        assert_eq!(file_name("data\\images\\cat.jpg"), "cat.jpg");
        assert_eq!(file_name("data/images/dog.jpg"), "dog.jpg");
        assert_eq!(file_name("plain.jpg"), "plain.jpg");
    }
}
