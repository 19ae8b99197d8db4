use crate::{
    app::engine::{EngineSettings, SearchEngine},
    config::{Config, Strategy},
    remote::RemoteStore,
    reviews::{BackendCsv, ReviewStore},
    semantic::{
        ConceptStore, EmbeddingService, EmbeddingTable, LocalRanker, Ranker, RemoteRanker,
    },
};
use anyhow::{bail, Context, Result};
use homedir::my_home;
use std::path::PathBuf;
use std::sync::Arc;

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Build the search engine described by `config`.
    ///
    /// The local strategy loads the review CSV and the embeddings file; the
    /// remote strategy talks to the configured store for both ranking and
    /// hydration. The embedding model itself is loaded lazily on first use.
    pub fn create_engine(config: &Config) -> Result<SearchEngine> {
        let concepts_path = config.resolve(&config.data.concepts);
        let concepts = Arc::new(
            ConceptStore::load(&concepts_path)
                .with_context(|| format!("couldnt load concepts from {}", concepts_path.display()))?,
        );

        let embeddings = Arc::new(EmbeddingService::new(
            config.semantic_search.clone(),
            config.base_path().to_path_buf(),
        ));

        let (store, ranker) = match config.strategy {
            Strategy::Local => Self::create_local(config, &concepts)?,
            Strategy::Remote => Self::create_remote(config)?,
        };
        log::info!("using {:?} ranking strategy", ranker.kind());

        let settings = EngineSettings {
            semantic: config.semantic_search.clone(),
            alchemist: config.alchemist.clone(),
            insights: config.data.insights.as_deref().map(|p| config.resolve(p)),
        };

        Ok(SearchEngine::new(store, ranker, embeddings, concepts, settings))
    }

    fn create_local(
        config: &Config,
        concepts: &ConceptStore,
    ) -> Result<(Arc<dyn ReviewStore>, Arc<dyn Ranker>)> {
        let store = BackendCsv::load(&config.resolve(&config.data.reviews))?;

        let embeddings_path = config.resolve(&config.data.embeddings);
        let table = EmbeddingTable::load(&embeddings_path).with_context(|| {
            format!("couldnt load embeddings from {}", embeddings_path.display())
        })?;

        if table.dimensions() != concepts.dimensions() {
            bail!(
                "embeddings have {} dimensions but concepts have {}",
                table.dimensions(),
                concepts.dimensions()
            );
        }

        Ok((
            Arc::new(store),
            Arc::new(LocalRanker::new(Arc::new(table))),
        ))
    }

    fn create_remote(config: &Config) -> Result<(Arc<dyn ReviewStore>, Arc<dyn Ranker>)> {
        let remote = Arc::new(RemoteStore::new(&config.remote)?);
        Ok((remote.clone(), Arc::new(RemoteRanker::new(remote))))
    }

    /// Base directory for config and data files.
    pub fn get_base_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("BREWINTEL_BASE_PATH") {
            return Ok(PathBuf::from(path));
        }

        let home = my_home()
            .context("couldnt find home dir")?
            .context("couldnt find home dir")?;

        Ok(home.join(".local/share/brewintel"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::engine::{SearchOutcome, TextQuery};
    use crate::semantic::RankerKind;

    fn write_fixtures(dir: &std::path::Path, embedding_dims: usize) {
        std::fs::write(
            dir.join("concepts.json"),
            r#"{"Fruit": [1.0, 0.0, 0.0], "Cocoa": [0.0, 1.0, 0.0]}"#,
        )
        .unwrap();
        let vector = vec!["0.5"; embedding_dims].join(",");
        std::fs::write(
            dir.join("embeddings.json"),
            format!(r#"[{{"id": 0, "name": "Kenya", "vector": [{vector}]}}]"#),
        )
        .unwrap();
        std::fs::write(
            dir.join("reviews.csv"),
            "name,roaster,rating,review\nKenya,Acme,94,Blackcurrant.\n",
        )
        .unwrap();
    }

    #[test]
    fn test_create_local_engine() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixtures(tmp.path(), 3);
        let config = Config::load_with(tmp.path()).unwrap();

        let engine = AppFactory::create_engine(&config).unwrap();

        let status = engine.status();
        assert_eq!(status.strategy, RankerKind::Local);
        assert_eq!(status.total_reviews, Some(1));
        assert_eq!(engine.concepts().concepts, vec!["Cocoa", "Fruit"]);

        match engine.search_text(&TextQuery::default()).unwrap() {
            SearchOutcome::Ready(ready) => assert_eq!(ready.total_beans, 1),
            other => panic!("expected ready payload, got {other:?}"),
        }
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixtures(tmp.path(), 4);
        let config = Config::load_with(tmp.path()).unwrap();

        assert!(AppFactory::create_engine(&config).is_err());
    }

    #[test]
    fn test_missing_concepts_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert!(AppFactory::create_engine(&config).is_err());
    }
}
