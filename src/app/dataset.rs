use std::cell::RefCell;
use std::rc::Rc;

use super::state::{AppState, BackendEvent};
use crate::api::{
    parse_stream_message, ApiClient, DatasetStatus, SseLineBuffer, StreamMessage,
    STREAM_IDLE_TIMEOUT,
};
use crate::error::StreamError;

/// Dataset ingestion phases.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetPhase {
    Unknown,
    Checking,
    Idle,
    Downloading,
    Failed(String),
}

/// Terminal outcome of a download session.
#[derive(Debug, Clone)]
pub enum DownloadOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Returned when the download slot is already claimed.
#[derive(Debug)]
pub struct DownloadBusy;

/// What a finished status check calls for.
#[derive(Debug, PartialEq)]
pub enum CheckOutcome {
    Present(u64),
    /// The dataset is missing; exactly one download is triggered per check.
    Absent,
    Failed(String),
}

/// Drives dataset presence checks and the streamed download. The download
/// channel is an exclusive resource: at most one session may hold it, and a
/// new session cannot start until the previous one reached a terminal state.
pub struct DatasetController {
    phase: DatasetPhase,
    /// Last successful status. Preserved across failures so the page keeps
    /// showing known counts next to the error banner.
    status: Option<DatasetStatus>,
    cancel: Option<async_channel::Sender<()>>,
}

impl DatasetController {
    pub fn new() -> Self {
        Self {
            phase: DatasetPhase::Unknown,
            status: None,
            cancel: None,
        }
    }

    pub fn phase(&self) -> &DatasetPhase {
        &self.phase
    }

    pub fn status(&self) -> Option<&DatasetStatus> {
        self.status.as_ref()
    }

    pub fn is_downloading(&self) -> bool {
        matches!(self.phase, DatasetPhase::Downloading)
    }

    /// Enter `Checking`. Refused mid-download; the running session owns the
    /// page until it terminates.
    pub fn begin_check(&mut self) -> bool {
        if self.is_downloading() {
            return false;
        }
        self.phase = DatasetPhase::Checking;
        true
    }

    pub fn finish_check(&mut self, outcome: Result<DatasetStatus, String>) -> CheckOutcome {
        match outcome {
            Ok(status) => {
                let result = if status.exists {
                    CheckOutcome::Present(status.image_count)
                } else {
                    CheckOutcome::Absent
                };
                self.status = Some(status);
                self.phase = DatasetPhase::Idle;
                result
            }
            Err(message) => {
                self.phase = DatasetPhase::Failed(message.clone());
                CheckOutcome::Failed(message)
            }
        }
    }

    /// Claim the download slot. Err while another session is downloading;
    /// the caller must not open a channel in that case.
    pub fn begin_download(
        &mut self,
        cancel: async_channel::Sender<()>,
    ) -> Result<(), DownloadBusy> {
        if self.is_downloading() {
            return Err(DownloadBusy);
        }
        self.cancel = Some(cancel);
        self.phase = DatasetPhase::Downloading;
        Ok(())
    }

    /// Release the slot with the session's terminal outcome. The channel is
    /// already closed by the time this runs; the driving task drops the
    /// response on every exit path.
    pub fn finish_download(&mut self, outcome: &DownloadOutcome) {
        self.cancel = None;
        self.phase = match outcome {
            DownloadOutcome::Completed | DownloadOutcome::Cancelled => DatasetPhase::Idle,
            DownloadOutcome::Failed(message) => DatasetPhase::Failed(message.clone()),
        };
    }

    /// Ask the active session to close its channel. No-op when idle.
    pub fn request_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.close();
        }
    }
}

/// Kick off a status check; the result arrives as a backend event.
pub fn begin_status_check(state: &Rc<RefCell<AppState>>) {
    let (api, sender) = {
        let mut s = state.borrow_mut();
        if !s.dataset.begin_check() {
            return;
        }
        (s.api.clone(), s.backend_sender.clone())
    };
    crate::ui::data_page::refresh(state);

    state.borrow().tokio_rt.spawn(async move {
        let outcome = api.dataset_status().await.map_err(|e| e.to_string());
        let _ = sender.send(BackendEvent::DatasetChecked(outcome)).await;
    });
}

/// Open the download stream, guarded so a second invocation while one is
/// active is rejected without opening a duplicate channel.
pub fn begin_download(state: &Rc<RefCell<AppState>>) {
    let (cancel_tx, cancel_rx) = async_channel::bounded::<()>(1);
    let (api, sender) = {
        let mut s = state.borrow_mut();
        if s.dataset.begin_download(cancel_tx).is_err() {
            log::info!("Download already in progress, ignoring");
            return;
        }
        (s.api.clone(), s.backend_sender.clone())
    };
    let narrator = state.borrow().narrator.clone();
    narrator.speak("Starting dataset download");
    crate::ui::data_page::refresh(state);

    state.borrow().tokio_rt.spawn(async move {
        let outcome = run_download(api, cancel_rx).await;
        let _ = sender.send(BackendEvent::DownloadFinished(outcome)).await;
    });
}

/// Cancel the active download, if any.
pub fn cancel_download(state: &Rc<RefCell<AppState>>) {
    state.borrow_mut().dataset.request_cancel();
}

/// Drive the stream to a terminal message. The response (and with it the
/// server channel) lives inside this scope and is dropped on every exit
/// path: terminal message, transport error, idle timeout, or cancellation.
async fn run_download(api: ApiClient, cancel: async_channel::Receiver<()>) -> DownloadOutcome {
    use futures_util::StreamExt;

    let resp = match api.open_dataset_stream().await {
        Ok(resp) => resp,
        Err(e) => return DownloadOutcome::Failed(format!("Failed to start download: {e}")),
    };
    let mut stream = resp.bytes_stream();
    let mut lines = SseLineBuffer::new();

    loop {
        let next = tokio::select! {
            chunk = tokio::time::timeout(STREAM_IDLE_TIMEOUT, stream.next()) => match chunk {
                Ok(item) => item,
                Err(_) => {
                    return DownloadOutcome::Failed(
                        StreamError::Transport("no progress from server".into()).to_string(),
                    )
                }
            },
            _ = cancel.recv() => return DownloadOutcome::Cancelled,
        };

        let chunk = match next {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                return DownloadOutcome::Failed(StreamError::Transport(e.to_string()).to_string())
            }
            // Server closed the channel without a terminal message.
            None => {
                return DownloadOutcome::Failed(
                    StreamError::Transport("stream ended unexpectedly".into()).to_string(),
                )
            }
        };

        for payload in lines.feed(&chunk) {
            match parse_stream_message(&payload) {
                Ok(StreamMessage::Completed) => return DownloadOutcome::Completed,
                Ok(StreamMessage::Failed(message)) => return DownloadOutcome::Failed(message),
                Ok(StreamMessage::Progress) => {}
                // Malformed input is terminal: never leave a session open on
                // a channel we no longer understand.
                Err(e) => return DownloadOutcome::Failed(e.to_string()),
            }
        }
    }
}

/// Fold a finished status check into the controller and narrate it.
/// An absent dataset auto-triggers the download.
pub fn apply_check_result(state: &Rc<RefCell<AppState>>, outcome: Result<DatasetStatus, String>) {
    let check = state.borrow_mut().dataset.finish_check(outcome);
    let narrator = state.borrow().narrator.clone();
    crate::ui::data_page::refresh(state);

    match check {
        CheckOutcome::Present(count) => {
            narrator.speak(&format!("Dataset status: downloaded with {count} images"));
        }
        CheckOutcome::Absent => {
            narrator.speak("Dataset status: not downloaded");
            begin_download(state);
        }
        CheckOutcome::Failed(message) => {
            log::error!("Dataset status check failed: {message}");
            narrator.speak("Failed to check dataset status");
        }
    }
}

/// Fold a terminated download session into the controller and narrate it.
/// Completion refreshes the counts with a fresh status check.
pub fn apply_download_result(state: &Rc<RefCell<AppState>>, outcome: DownloadOutcome) {
    state.borrow_mut().dataset.finish_download(&outcome);
    let narrator = state.borrow().narrator.clone();
    crate::ui::data_page::refresh(state);

    match outcome {
        DownloadOutcome::Completed => {
            log::info!("Dataset download completed");
            narrator.speak("Dataset download completed successfully");
            begin_status_check(state);
        }
        DownloadOutcome::Failed(message) => {
            log::error!("Dataset download failed: {message}");
            narrator.speak(&format!("Download failed: {message}"));
        }
        DownloadOutcome::Cancelled => {
            log::info!("Dataset download cancelled");
            narrator.speak("Dataset download cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(exists: bool, image_count: u64) -> DatasetStatus {
        DatasetStatus {
            exists,
            image_count,
            data_path: "/data/images".to_string(),
        }
    }

    fn cancel_pair() -> (async_channel::Sender<()>, async_channel::Receiver<()>) {
        async_channel::bounded(1)
    }

    #[test]
    fn absent_status_requests_a_download() {
        let mut controller = DatasetController::new();
        assert!(controller.begin_check());
        let outcome = controller.finish_check(Ok(status(false, 0)));
        assert_eq!(outcome, CheckOutcome::Absent);
        assert_eq!(*controller.phase(), DatasetPhase::Idle);
    }

    #[test]
    fn second_download_is_rejected_while_one_is_active() {
        let mut controller = DatasetController::new();
        let (tx_a, _rx_a) = cancel_pair();
        let (tx_b, _rx_b) = cancel_pair();

        assert!(controller.begin_download(tx_a).is_ok());
        assert!(controller.is_downloading());
        // The guard refuses the second channel outright.
        assert!(controller.begin_download(tx_b).is_err());
    }

    #[test]
    fn terminal_outcomes_leave_the_downloading_state_for_good() {
        for outcome in [
            DownloadOutcome::Completed,
            DownloadOutcome::Failed("x".to_string()),
            DownloadOutcome::Cancelled,
        ] {
            let mut controller = DatasetController::new();
            let (tx, _rx) = cancel_pair();
            controller.begin_download(tx).unwrap();
            controller.finish_download(&outcome);
            assert!(!controller.is_downloading());
            // A fresh session may claim the slot again.
            let (tx2, _rx2) = cancel_pair();
            assert!(controller.begin_download(tx2).is_ok());
        }
    }

    #[test]
    fn check_is_refused_during_a_download() {
        let mut controller = DatasetController::new();
        let (tx, _rx) = cancel_pair();
        controller.begin_download(tx).unwrap();
        assert!(!controller.begin_check());
        assert!(controller.is_downloading());
    }

    #[test]
    fn failed_check_preserves_the_last_known_status() {
        let mut controller = DatasetController::new();
        controller.begin_check();
        controller.finish_check(Ok(status(true, 42)));

        controller.begin_check();
        let outcome = controller.finish_check(Err("connection refused".to_string()));
        assert_eq!(outcome, CheckOutcome::Failed("connection refused".to_string()));
        assert_eq!(controller.status().unwrap().image_count, 42);
        assert!(matches!(controller.phase(), DatasetPhase::Failed(_)));
    }

    #[test]
    fn cancel_request_closes_the_channel() {
        let mut controller = DatasetController::new();
        let (tx, rx) = cancel_pair();
        controller.begin_download(tx).unwrap();
        controller.request_cancel();
        // The receiving side observes the closed channel and exits.
        assert!(rx.is_closed());
        // The phase stays Downloading until the task reports back.
        assert!(controller.is_downloading());
    }
}
