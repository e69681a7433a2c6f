//! The index facade: request-style operations over one persistent
//! collection.

use di_core::{Document, FilterExpr, IndexerConfig, IndexerError, Match, QueryPolicy, Result};
use di_store::{DocumentStore, LocalConnector, StoreConnector};
use serde_json::{Map, Value};

use crate::guard::StoreGuard;
use crate::report::UpdateReport;
use crate::request::{filter_param, ids_param, Operation, Request, Response};

/// Vector search and metadata filtering over one collection.
///
/// The facade holds no locks; share it behind an `Arc`. Several facades
/// built from the same hosts and `index_name` see the same documents.
pub struct IndexFacade {
    config: IndexerConfig,
    store: StoreGuard,
}

impl IndexFacade {
    /// Connect through the bundled local store.
    pub async fn open(config: IndexerConfig) -> Result<Self> {
        Self::connect_with(config, &LocalConnector::new()).await
    }

    /// Validate `config` and attach to its collection through `connector`,
    /// creating the collection on first use.
    pub async fn connect_with(config: IndexerConfig, connector: &dyn StoreConnector) -> Result<Self> {
        config.validate()?;
        let spec = config.collection_spec();
        let store = connector
            .connect(&config.hosts, &spec, &config.store_options)
            .await?;
        tracing::debug!(
            index_name = %config.index_name,
            n_dim = config.n_dim,
            distance = %config.distance,
            "index facade connected"
        );
        Ok(Self { config, store: StoreGuard::new(store) })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    fn store(&self) -> Result<&dyn DocumentStore> {
        self.store.get()
    }

    /// Every embedding present must have the configured length, and no
    /// embedding component or float tag may be NaN or infinite.
    fn check_documents(&self, docs: &[Document]) -> Result<()> {
        for doc in docs {
            if let Some(ref e) = doc.embedding {
                if e.len() != self.config.n_dim {
                    return Err(IndexerError::DimensionMismatch { expected: self.config.n_dim, got: e.len() });
                }
            }
            if let Some(field) = doc.non_finite_field() {
                return Err(IndexerError::invalid_request(format!(
                    "document '{}' has a non-finite {field}",
                    doc.id
                )));
            }
        }
        Ok(())
    }

    /// Create or overwrite documents by id, in chunks of `batch_size`.
    ///
    /// The whole batch is checked before the first chunk is written. Each
    /// chunk is one store call, so a concurrent reader may observe some
    /// chunks of a large batch before the rest.
    pub async fn index(&self, docs: &[Document]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        self.check_documents(docs)?;
        let store = self.store()?;
        for chunk in docs.chunks(self.config.batch_size) {
            store.upsert(chunk).await?;
        }
        tracing::debug!(index_name = %self.config.index_name, count = docs.len(), "indexed documents");
        Ok(())
    }

    /// The configured default policy overlaid with the call's parameters.
    fn resolve_policy(&self, parameters: &Map<String, Value>) -> Result<QueryPolicy> {
        let overrides = QueryPolicy::from_params(parameters)?;
        let policy = self.config.match_args.merged_with(&overrides);
        if let Some(ref filter) = policy.filter {
            self.config.validate_filter(filter)?;
        }
        Ok(policy)
    }

    /// Attach the nearest documents to every query as `matches`, most
    /// similar first. Previous matches are replaced.
    pub async fn search(&self, queries: &mut [Document], parameters: &Map<String, Value>) -> Result<()> {
        for query in queries.iter() {
            match query.embedding {
                None => {
                    return Err(IndexerError::invalid_request(format!(
                        "query document '{}' has no embedding",
                        query.id
                    )))
                }
                Some(ref e) if e.len() != self.config.n_dim => {
                    return Err(IndexerError::DimensionMismatch { expected: self.config.n_dim, got: e.len() })
                }
                Some(ref e) if e.iter().any(|v| !v.is_finite()) => {
                    return Err(IndexerError::invalid_request(format!(
                        "query document '{}' has a non-finite embedding component",
                        query.id
                    )))
                }
                Some(_) => {}
            }
        }
        let policy = self.resolve_policy(parameters)?;
        let store = self.store()?;
        let metric = self.config.distance;

        for query in queries.iter_mut() {
            let hits = match query.embedding.as_deref() {
                Some(embedding) => {
                    store
                        .vector_search(embedding, policy.limit, policy.filter.as_ref())
                        .await?
                }
                None => Vec::new(),
            };
            let mut matches: Vec<Match> = hits
                .into_iter()
                .map(|hit| Match { score: metric.similarity(hit.distance), document: hit.document })
                .filter(|m| policy.score_threshold.map_or(true, |t| m.score >= t))
                .collect();
            matches.sort_by(|a, b| b.score.total_cmp(&a.score));
            if let Some(limit) = policy.limit {
                matches.truncate(limit);
            }
            query.matches = matches;
        }
        tracing::debug!(
            index_name = %self.config.index_name,
            queries = queries.len(),
            limit = ?policy.limit,
            "search finished"
        );
        Ok(())
    }

    /// Remove the documents listed under `ids`. Unknown ids are ignored.
    pub async fn delete(&self, parameters: &Map<String, Value>) -> Result<()> {
        let ids = ids_param(parameters)?;
        if ids.is_empty() {
            return Ok(());
        }
        let removed = self.store()?.delete(&ids).await?;
        tracing::debug!(index_name = %self.config.index_name, requested = ids.len(), removed, "deleted documents");
        Ok(())
    }

    /// Overwrite documents that already exist. Ids not in the collection
    /// are skipped with a warning and listed in the report.
    pub async fn update(&self, docs: &[Document]) -> Result<UpdateReport> {
        let mut report = UpdateReport::default();
        if docs.is_empty() {
            return Ok(report);
        }
        self.check_documents(docs)?;
        let store = self.store()?;
        for chunk in docs.chunks(self.config.batch_size) {
            let replaced = store.replace_existing(chunk).await?;
            for (doc, replaced) in chunk.iter().zip(replaced) {
                if !replaced {
                    tracing::warn!(
                        index_name = %self.config.index_name,
                        id = %doc.id,
                        "update skipped: document is not in the index"
                    );
                }
                report.record(&doc.id, replaced);
            }
        }
        Ok(report)
    }

    /// Documents matching the `filter` parameter, in store order.
    pub async fn filter(&self, parameters: &Map<String, Value>) -> Result<Vec<Document>> {
        let expr = FilterExpr::from_json(filter_param(parameters)?)?;
        self.config.validate_filter(&expr)?;
        Ok(self.store()?.scan(Some(&expr)).await?)
    }

    /// Copy stored embeddings into `docs` by id.
    ///
    /// Stops at the first unknown id with `NotFound`; documents before it
    /// keep their filled embeddings.
    pub async fn fill_embedding(&self, docs: &mut [Document]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
        let stored = self.store()?.get(&ids).await?;
        for (doc, found) in docs.iter_mut().zip(stored) {
            match found {
                Some(found) => doc.embedding = found.embedding,
                None => return Err(IndexerError::not_found(doc.id.clone())),
            }
        }
        Ok(())
    }

    /// Remove every document. The collection and its schema stay.
    pub async fn clear(&self) -> Result<()> {
        self.store()?.clear().await?;
        tracing::debug!(index_name = %self.config.index_name, "cleared index");
        Ok(())
    }

    /// Number of documents in the collection.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.store()?.count().await?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        let found = self.store()?.get(&[id.to_string()]).await?;
        Ok(found.into_iter().next().flatten())
    }

    /// All documents, in store order.
    pub async fn documents(&self) -> Result<Vec<Document>> {
        Ok(self.store()?.scan(None).await?)
    }

    /// Route a request to the handler named by its endpoint.
    pub async fn dispatch(&self, request: Request) -> Result<Response> {
        let op: Operation = request.endpoint.parse()?;
        let Request { mut docs, parameters, .. } = request;
        tracing::debug!(endpoint = %op, docs = docs.len(), "dispatching request");
        match op {
            Operation::Index => {
                self.index(&docs).await?;
                Ok(Response::Empty)
            }
            Operation::Search => {
                self.search(&mut docs, &parameters).await?;
                Ok(Response::Documents(docs))
            }
            Operation::Update => Ok(Response::Updated(self.update(&docs).await?)),
            Operation::Delete => {
                self.delete(&parameters).await?;
                Ok(Response::Empty)
            }
            Operation::Filter => Ok(Response::Documents(self.filter(&parameters).await?)),
            Operation::FillEmbedding => {
                self.fill_embedding(&mut docs).await?;
                Ok(Response::Documents(docs))
            }
            Operation::Clear => {
                self.clear().await?;
                Ok(Response::Empty)
            }
        }
    }

    /// Flush and release the store connection.
    pub async fn close(self) -> Result<()> {
        self.store()?.flush().await?;
        tracing::debug!(index_name = %self.config.index_name, "closing index facade");
        self.store.release()
    }
}
