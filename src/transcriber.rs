use std::path::PathBuf;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::TranscribeError;

const MODEL_URL: &str =
    "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.en.bin";
const MODEL_FILENAME: &str = "ggml-base.en.bin";

/// Directory for model storage: ~/.local/share/image-seek/models/
fn models_dir() -> PathBuf {
    let mut p = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    p.push("image-seek");
    p.push("models");
    p
}

fn model_path() -> PathBuf {
    models_dir().join(MODEL_FILENAME)
}

/// Check whether the speech model file exists.
pub fn model_exists() -> bool {
    model_path().exists()
}

/// Download the speech model, reporting progress via the provided callback.
/// `on_progress(bytes_downloaded, total_bytes)` — total may be 0 if unknown.
pub async fn download_model<F>(on_progress: F) -> Result<(), TranscribeError>
where
    F: Fn(u64, u64) + Send + 'static,
{
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let dl = |e: &dyn std::fmt::Display| TranscribeError::Download(e.to_string());

    let dir = models_dir();
    tokio::fs::create_dir_all(&dir).await.map_err(|e| dl(&e))?;

    let response = reqwest::get(MODEL_URL).await.map_err(|e| dl(&e))?;
    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let path = model_path();
    let mut file = tokio::fs::File::create(&path).await.map_err(|e| dl(&e))?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| dl(&e))?;
        file.write_all(&chunk).await.map_err(|e| dl(&e))?;
        downloaded += chunk.len() as u64;
        on_progress(downloaded, total);
    }

    file.flush().await.map_err(|e| dl(&e))?;
    log::info!("Speech model downloaded to {}", path.display());
    Ok(())
}

/// Local speech-to-text engine. Loading and transcription are CPU-heavy;
/// call both from a blocking context.
pub struct WhisperEngine {
    ctx: WhisperContext,
}

impl WhisperEngine {
    pub fn load() -> Result<Self, TranscribeError> {
        let path = model_path();
        let ctx = WhisperContext::new_with_params(
            path.to_str()
                .ok_or_else(|| TranscribeError::ModelLoad("invalid model path".into()))?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| TranscribeError::ModelLoad(e.to_string()))?;
        log::info!("Speech model loaded");
        Ok(Self { ctx })
    }

    /// Transcribe audio samples (16kHz mono f32).
    pub fn transcribe(&self, samples: &[f32]) -> Result<String, TranscribeError> {
        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| TranscribeError::Recognition(e.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some("en"));
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let cpus = std::thread::available_parallelism()
            .map(|n| n.get() as i32)
            .unwrap_or(4);
        params.set_n_threads(cpus);

        state
            .full(params, samples)
            .map_err(|e| TranscribeError::Recognition(e.to_string()))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            // WhisperSegment implements Display
            let seg_text = format!("{segment}");
            text.push_str(&seg_text);
            text.push(' ');
        }

        Ok(text.trim().to_string())
    }
}
