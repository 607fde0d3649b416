use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::dao::{
    batch::{Precondition, WriteBatch, apply_batch, check_preconditions, now_millis},
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchSessionDocument, session_doc_id},
};

/// Revision conflicts are retried this many times before giving up.
const MAX_CONFLICT_RETRIES: usize = 3;

/// Session store backed by one CouchDB database.
#[derive(Clone)]
pub struct CouchSessionStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchSessionStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    /// Create the session database unless it already exists.
    async fn ensure_database(&self) -> CouchResult<()> {
        let url = format!("{}/{}", self.base_url, self.database);
        let database_error = |action: &'static str| {
            let database = self.database.to_string();
            move |source: reqwest::Error| CouchDaoError::Database {
                database,
                action,
                source,
            }
        };

        let probe = self
            .authorize(self.client.head(&url))
            .send()
            .await
            .map_err(database_error("query"))?;
        match probe.status() {
            status if status.is_success() => return Ok(()),
            StatusCode::NOT_FOUND => {}
            status => {
                return Err(CouchDaoError::DatabaseStatus {
                    database: self.database.to_string(),
                    status,
                });
            }
        }

        let create = self
            .authorize(self.client.put(&url))
            .send()
            .await
            .map_err(database_error("create"))?;
        match create.status() {
            // 412: another instance created it first.
            status if status.is_success() || status == StatusCode::PRECONDITION_FAILED => Ok(()),
            status => Err(CouchDaoError::DatabaseStatus {
                database: self.database.to_string(),
                status,
            }),
        }
    }

    async fn get_document(&self, doc_id: &str) -> CouchResult<Option<CouchSessionDocument>> {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<CouchSessionDocument>()
                .await
                .map(Some)
                .map_err(|source| CouchDaoError::DecodeResponse {
                    path: doc_id.to_string(),
                    source,
                }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document(&self, document: &CouchSessionDocument) -> CouchResult<()> {
        let response = self
            .request(Method::PUT, &document.id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: document.id.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Err(CouchDaoError::Conflict {
                path: document.id.clone(),
            }),
            status if status.is_success() => Ok(()),
            other => Err(CouchDaoError::RequestStatus {
                path: document.id.clone(),
                status: other,
            }),
        }
    }

    /// Read, check, apply and write back under the document revision.
    async fn commit_once(
        &self,
        session_id: &str,
        preconditions: &[Precondition],
        batch: &WriteBatch,
    ) -> CouchResult<()> {
        let doc_id = session_doc_id(session_id);
        let Some(existing) = self.get_document(&doc_id).await? else {
            return Err(StorageError::PreconditionFailed {
                path: format!("{session_id} (missing session)"),
            }
            .into());
        };

        let rev = existing.rev.clone();
        let mut body = existing.into_body();
        check_preconditions(&body, preconditions)?;
        apply_batch(&mut body, batch, now_millis())?;

        self.put_document(&CouchSessionDocument::new(session_id, rev, body))
            .await
    }
}

impl SessionStore for CouchSessionStore {
    fn fetch(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        let doc_id = session_doc_id(id);
        Box::pin(async move {
            let maybe_doc = store.get_document(&doc_id).await?;
            Ok(maybe_doc.map(CouchSessionDocument::into_body))
        })
    }

    fn commit(
        &self,
        id: &str,
        preconditions: Vec<Precondition>,
        batch: WriteBatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let session_id = id.to_string();
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                match store.commit_once(&session_id, &preconditions, &batch).await {
                    Err(CouchDaoError::Conflict { path }) if attempt < MAX_CONFLICT_RETRIES => {
                        attempt += 1;
                        debug!(path, attempt, "CouchDB revision conflict, retrying commit");
                    }
                    other => return other.map_err(Into::into),
                }
            }
        })
    }

    fn insert(&self, id: &str, document: Value) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let session_id = id.to_string();
        Box::pin(async move {
            let doc_id = session_doc_id(&session_id);
            let rev = store.get_document(&doc_id).await?.and_then(|doc| doc.rev);
            store
                .put_document(&CouchSessionDocument::new(&session_id, rev, document))
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = format!("{}/{}", store.base_url, store.database);
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
