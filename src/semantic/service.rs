//! Shared embedding service.
//!
//! Owns the embedding model for the lifetime of the process:
//! - Loads it lazily on first use (uninitialized -> loading -> ready)
//! - Concurrent first callers block on the same load; only one runs
//! - A failed load leaves the service uninitialized so a later call retries

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::config::SemanticSearchConfig;
use crate::semantic::embeddings::{Embedder, EmbeddingError, ModelLoader};

type Loader = Box<dyn Fn() -> Result<Box<dyn Embedder>, EmbeddingError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingState {
    Uninitialized,
    Loading,
    Ready,
}

impl EmbeddingState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EmbeddingState::Loading,
            2 => EmbeddingState::Ready,
            _ => EmbeddingState::Uninitialized,
        }
    }
}

pub struct EmbeddingService {
    loader: Loader,
    model: OnceCell<Box<dyn Embedder>>,
    state: AtomicU8,
}

impl EmbeddingService {
    /// Service backed by the fastembed model named in `config`.
    ///
    /// # Arguments
    /// * `config` - Semantic search configuration
    /// * `base_path` - Base directory; models are cached under `models/`
    pub fn new(config: SemanticSearchConfig, base_path: PathBuf) -> Self {
        let loader = ModelLoader::new(
            &config.model,
            base_path,
            Some(Duration::from_secs(config.download_timeout_secs)),
        );
        Self::with_loader(move || Ok(Box::new(loader.load()?) as Box<dyn Embedder>))
    }

    /// Service with a custom model constructor.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Embedder>, EmbeddingError> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            model: OnceCell::new(),
            state: AtomicU8::new(EmbeddingState::Uninitialized as u8),
        }
    }

    pub fn state(&self) -> EmbeddingState {
        EmbeddingState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Embed `text`, loading the model first if needed.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.model()?.embed(text)
    }

    /// Eagerly load the model.
    pub fn initialize(&self) -> Result<(), EmbeddingError> {
        self.model().map(|_| ())
    }

    fn model(&self) -> Result<&dyn Embedder, EmbeddingError> {
        self.model
            .get_or_try_init(|| {
                self.state
                    .store(EmbeddingState::Loading as u8, Ordering::SeqCst);
                let now = Instant::now();

                match (self.loader)() {
                    Ok(model) => {
                        log::info!(
                            "embedding model '{}' ({} dimensions) ready in {:?}",
                            model.name(),
                            model.dimensions(),
                            now.elapsed()
                        );
                        self.state
                            .store(EmbeddingState::Ready as u8, Ordering::SeqCst);
                        Ok(model)
                    }
                    Err(err) => {
                        log::error!("failed to load embedding model: {err}");
                        self.state
                            .store(EmbeddingState::Uninitialized as u8, Ordering::SeqCst);
                        Err(err)
                    }
                }
            })
            .map(|model| &**model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};

    struct ConstantEmbedder;

    impl Embedder for ConstantEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.0, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    #[test]
    fn test_lazy_lifecycle() {
        let service = EmbeddingService::with_loader(|| Ok(Box::new(ConstantEmbedder) as Box<dyn Embedder>));
        assert_eq!(service.state(), EmbeddingState::Uninitialized);

        assert_eq!(service.embed("anything").unwrap(), vec![0.0, 1.0]);
        assert_eq!(service.state(), EmbeddingState::Ready);
    }

    #[test]
    fn test_concurrent_first_calls_load_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let service = Arc::new(EmbeddingService::with_loader(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(Box::new(ConstantEmbedder) as Box<dyn Embedder>)
        }));

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    service.embed("washed ethiopia").unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), vec![0.0, 1.0]);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(service.state(), EmbeddingState::Ready);
    }

    #[test]
    fn test_failed_load_propagates_and_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let service = EmbeddingService::with_loader(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(EmbeddingError::InitFailed("offline".to_string()))
            } else {
                Ok(Box::new(ConstantEmbedder) as Box<dyn Embedder>)
            }
        });

        assert!(matches!(
            service.embed("first"),
            Err(EmbeddingError::InitFailed(_))
        ));
        assert_eq!(service.state(), EmbeddingState::Uninitialized);

        assert!(service.initialize().is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(service.state(), EmbeddingState::Ready);
    }
}
