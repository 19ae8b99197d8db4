//! Text-to-vector side of semantic search.
//!
//! [`Embedder`] is what the search engine depends on. [`EmbeddingModel`]
//! implements it on top of fastembed, with model files cached under
//! `<base>/models`. Every vector leaving this module is unit length, so it
//! lives in the same space as the precomputed review and concept vectors.

use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::{mpsc, Mutex};
use std::time::{Duration, Instant};

use super::arithmetic::normalize;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Anything that turns a string into a fixed-length vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
    fn dimensions(&self) -> usize;
    fn name(&self) -> &str;
}

/// Models the precomputed vectors can come from. All are 384-dimensional.
const KNOWN_MODELS: &[(&str, fastembed::EmbeddingModel)] = &[
    ("all-minilm-l6-v2", fastembed::EmbeddingModel::AllMiniLML6V2),
    ("all-minilm-l6-v2-q", fastembed::EmbeddingModel::AllMiniLML6V2Q),
    ("bge-small-en-v1.5", fastembed::EmbeddingModel::BGESmallENV15),
    ("bge-small-en-v1.5-q", fastembed::EmbeddingModel::BGESmallENV15Q),
];

fn lookup_model(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    let wanted = name.trim().to_lowercase();
    KNOWN_MODELS
        .iter()
        .find(|(known, _)| *known == wanted)
        .map(|(_, model)| model.clone())
        .ok_or_else(|| {
            let names: Vec<&str> = KNOWN_MODELS.iter().map(|(known, _)| *known).collect();
            EmbeddingError::InvalidModel(format!("{name} (supported: {})", names.join(", ")))
        })
}

/// fastembed model behind a mutex; its `embed` takes `&mut self`.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    fn with_sample_embedding(
        name: &str,
        mut text_embedding: TextEmbedding,
    ) -> Result<Self, EmbeddingError> {
        let sample = text_embedding
            .embed(vec!["coffee"], None)
            .map_err(|err| EmbeddingError::InitFailed(format!("sample embedding failed: {err}")))?;
        let dimensions = sample
            .first()
            .map(Vec::len)
            .ok_or_else(|| {
                EmbeddingError::InitFailed("sample embedding returned nothing".to_string())
            })?;

        Ok(Self {
            model: Mutex::new(text_embedding),
            name: name.to_string(),
            dimensions,
        })
    }
}

/// Builds [`EmbeddingModel`]s, downloading into `cache_dir/models` when the
/// files are not cached yet.
///
/// A load that outlives `download_timeout` fails the call but keeps running
/// on its worker thread. The next `load` waits on that same download rather
/// than starting another one into the same cache.
pub struct ModelLoader {
    name: String,
    cache_dir: PathBuf,
    download_timeout: Option<Duration>,
    pending: InFlight<TextEmbedding>,
}

impl ModelLoader {
    pub fn new(name: &str, cache_dir: PathBuf, download_timeout: Option<Duration>) -> Self {
        Self {
            name: name.to_string(),
            cache_dir,
            download_timeout,
            pending: InFlight::default(),
        }
    }

    pub fn load(&self) -> Result<EmbeddingModel, EmbeddingError> {
        let model = lookup_model(&self.name)?;

        let models_dir = self.cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|err| {
            EmbeddingError::InitFailed(format!("{}: {err}", models_dir.display()))
        })?;

        let now = Instant::now();
        let text_embedding = match self.download_timeout {
            None => try_load(model, models_dir)?,
            Some(timeout) => self
                .pending
                .wait_or_start(move || try_load(model, models_dir), timeout)?,
        };
        log::info!("loaded embedding model {} in {:?}", self.name, now.elapsed());

        EmbeddingModel::with_sample_embedding(&self.name, text_embedding)
    }
}

fn try_load(
    model: fastembed::EmbeddingModel,
    models_dir: PathBuf,
) -> Result<TextEmbedding, EmbeddingError> {
    let options = InitOptions::new(model)
        .with_cache_dir(models_dir)
        .with_show_download_progress(false);
    TextEmbedding::try_new(options).map_err(|err| EmbeddingError::InitFailed(err.to_string()))
}

type LoadResult<T> = Result<T, EmbeddingError>;

/// At most one background load; survives a caller giving up on it.
struct InFlight<T> {
    receiver: Mutex<Option<mpsc::Receiver<LoadResult<T>>>>,
}

impl<T> Default for InFlight<T> {
    fn default() -> Self {
        Self {
            receiver: Mutex::new(None),
        }
    }
}

impl<T: Send + 'static> InFlight<T> {
    /// Wait up to `timeout` for the running load, spawning `start` on a
    /// worker thread only when nothing is running.
    fn wait_or_start<F>(&self, start: F, timeout: Duration) -> LoadResult<T>
    where
        F: FnOnce() -> LoadResult<T> + Send + 'static,
    {
        let mut slot = self
            .receiver
            .lock()
            .map_err(|err| EmbeddingError::InitFailed(format!("loader lock poisoned: {err}")))?;

        let receiver = match slot.take() {
            Some(receiver) => {
                log::info!("waiting on model download already in progress");
                receiver
            }
            None => {
                let (tx, rx) = mpsc::channel();
                std::thread::spawn(move || {
                    // receiver may be gone after a timeout
                    let _ = tx.send(start());
                });
                rx
            }
        };

        match receiver.recv_timeout(timeout) {
            Ok(loaded) => loaded,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                *slot = Some(receiver);
                Err(EmbeddingError::InitFailed(format!(
                    "model download timed out after {}s",
                    timeout.as_secs()
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EmbeddingError::InitFailed(
                "model loader thread panicked".to_string(),
            )),
        }
    }
}

impl Embedder for EmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self
            .model
            .lock()
            .map_err(|err| EmbeddingError::EmbeddingFailed(format!("model lock poisoned: {err}")))?;

        let vector = model
            .embed(vec![text], None)
            .map_err(|err| EmbeddingError::EmbeddingFailed(err.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("no embedding returned".to_string()))?;

        Ok(normalize(vector))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.name
    }
}
