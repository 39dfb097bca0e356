use std::cell::RefCell;
use std::rc::Rc;

use gtk4::prelude::*;

use super::state::{set_status, AppState, BackendEvent};
use crate::api::SearchHit;

/// Client-side search state: one logical search at a time, with stale
/// responses discarded by request id.
pub struct SearchSession {
    next_id: u64,
    latest_id: u64,
    results: Vec<SearchHit>,
}

/// What a finished request did to the visible state.
#[derive(Debug, PartialEq)]
pub enum SearchOutcome {
    /// Response for a superseded request; nothing changed.
    Stale,
    /// Results replaced; count of hits now visible.
    Updated(usize),
    /// Request failed; prior results left untouched.
    Failed(String),
}

impl SearchSession {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            latest_id: 0,
            results: Vec::new(),
        }
    }

    /// Allocate the id for a new request; it supersedes all earlier ones.
    pub fn begin(&mut self) -> u64 {
        self.next_id += 1;
        self.latest_id = self.next_id;
        self.latest_id
    }

    /// Fold a finished request into the session. Only the most recently
    /// issued request may update visible results; an older response
    /// arriving late must not overwrite a newer one.
    pub fn finish(&mut self, id: u64, outcome: Result<Vec<SearchHit>, String>) -> SearchOutcome {
        if id != self.latest_id {
            log::debug!(
                "Discarding stale search response #{id} (latest is #{})",
                self.latest_id
            );
            return SearchOutcome::Stale;
        }
        match outcome {
            Ok(hits) => {
                let count = hits.len();
                self.results = hits;
                SearchOutcome::Updated(count)
            }
            Err(message) => SearchOutcome::Failed(message),
        }
    }

    pub fn results(&self) -> &[SearchHit] {
        &self.results
    }
}

/// Submit a search. Fire-and-forget: the response comes back through the
/// backend channel tagged with the request id.
pub fn submit_search(state: &Rc<RefCell<AppState>>, query: &str) {
    let query = query.trim().to_string();
    if query.is_empty() {
        return;
    }

    let (id, api, sender, narrator) = {
        let mut s = state.borrow_mut();
        let id = s.search.begin();
        (id, s.api.clone(), s.backend_sender.clone(), s.narrator.clone())
    };
    narrator.speak(&format!("Searching for images matching {query}"));
    set_search_busy(state, true);
    set_status(state, "Searching\u{2026}");

    let task_query = query.clone();
    state.borrow().tokio_rt.spawn(async move {
        let outcome = api.search(&task_query).await.map_err(|e| e.to_string());
        let _ = sender
            .send(BackendEvent::SearchFinished {
                id,
                query: task_query,
                outcome,
            })
            .await;
    });
}

/// Fold a finished request into the UI: stale responses disappear without a
/// trace, failures keep the previous results on screen.
pub fn apply_search_result(
    state: &Rc<RefCell<AppState>>,
    id: u64,
    query: String,
    outcome: Result<Vec<SearchHit>, String>,
) {
    let result = state.borrow_mut().search.finish(id, outcome);
    match result {
        SearchOutcome::Stale => {}
        SearchOutcome::Updated(count) => {
            {
                let mut s = state.borrow_mut();
                let s = &mut *s;
                s.history.record_search(&query, s.search.results());
                if let Err(e) = s.history.save() {
                    log::warn!("Failed to save search history: {e}");
                }
            }
            let narrator = state.borrow().narrator.clone();
            narrator.speak(&format!("Found {count} images matching your search"));
            set_search_busy(state, false);
            set_status(state, &format!("{count} results"));
            crate::ui::window::render_results(state);
        }
        SearchOutcome::Failed(message) => {
            log::error!("Search failed: {message}");
            let narrator = state.borrow().narrator.clone();
            narrator.speak("An error occurred while searching for images");
            set_search_busy(state, false);
            set_status(state, &format!("Search failed: {message}"));
        }
    }
}

/// Toggle the search controls while a request is in flight.
pub fn set_search_busy(state: &Rc<RefCell<AppState>>, busy: bool) {
    let s = state.borrow();
    if let Some(ref w) = s.widgets {
        w.search_button.set_sensitive(!busy);
        w.search_spinner.set_visible(busy);
        if busy {
            w.search_spinner.start();
        } else {
            w.search_spinner.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(paths: &[&str]) -> Vec<SearchHit> {
        paths
            .iter()
            .map(|p| SearchHit {
                path: p.to_string(),
                similarity: 0.5,
            })
            .collect()
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let mut session = SearchSession::new();
        let a = session.begin();
        let b = session.begin();
        let c = session.begin();
        assert!(a < b && b < c);
    }

    #[test]
    fn slow_older_response_cannot_overwrite_newer_results() {
        let mut session = SearchSession::new();
        let first = session.begin();
        let second = session.begin();

        // The newer request answers first.
        let outcome = session.finish(second, Ok(hits(&["new.jpg"])));
        assert_eq!(outcome, SearchOutcome::Updated(1));

        // The older response straggles in afterwards and is discarded.
        let outcome = session.finish(first, Ok(hits(&["old-a.jpg", "old-b.jpg"])));
        assert_eq!(outcome, SearchOutcome::Stale);
        assert_eq!(session.results().len(), 1);
        assert_eq!(session.results()[0].path, "new.jpg");
    }

    #[test]
    fn stale_errors_are_discarded_too() {
        let mut session = SearchSession::new();
        let first = session.begin();
        let second = session.begin();
        session.finish(second, Ok(hits(&["kept.jpg"])));

        let outcome = session.finish(first, Err("timeout".to_string()));
        assert_eq!(outcome, SearchOutcome::Stale);
        assert_eq!(session.results().len(), 1);
    }

    #[test]
    fn failure_of_the_latest_request_keeps_prior_results() {
        let mut session = SearchSession::new();
        let first = session.begin();
        session.finish(first, Ok(hits(&["a.jpg"])));

        let second = session.begin();
        let outcome = session.finish(second, Err("boom".to_string()));
        assert_eq!(outcome, SearchOutcome::Failed("boom".to_string()));
        assert_eq!(session.results().len(), 1);
    }
}
