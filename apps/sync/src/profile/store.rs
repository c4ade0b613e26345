//! Remote Profile Store seam — the trait the engine reconciles against.
//!
//! `RestSectionStore` is the production backend; tests swap in the in-memory
//! mock without touching the engine or its callers.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::api::ApiClient;
use crate::errors::ApiError;
use crate::profile::models::{
    Certification, Education, Experience, ProfileCore, RemoteRecord, SectionContent,
};

/// Collection operations for one profile section, scoped to the
/// authenticated user.
#[async_trait]
pub trait SectionStore<C: SectionContent>: Send + Sync {
    async fn list(&self) -> Result<Vec<RemoteRecord<C>>, ApiError>;
    async fn create(&self, content: &C) -> Result<RemoteRecord<C>, ApiError>;
    async fn update(&self, id: &str, content: &C) -> Result<(), ApiError>;
    async fn delete(&self, id: &str) -> Result<(), ApiError>;
}

/// The single top-level profile-fields record.
#[async_trait]
pub trait CoreStore: Send + Sync {
    async fn update_core(&self, core: &ProfileCore) -> Result<(), ApiError>;
}

/// List responses arrive either as a bare array or wrapped in `items`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse<C> {
    Bare(Vec<RemoteRecord<C>>),
    Enveloped { items: Vec<RemoteRecord<C>> },
}

impl<C> ListResponse<C> {
    fn into_records(self) -> Vec<RemoteRecord<C>> {
        match self {
            ListResponse::Bare(records) => records,
            ListResponse::Enveloped { items } => items,
        }
    }
}

pub struct RestSectionStore<C> {
    api: ApiClient,
    _content: PhantomData<fn() -> C>,
}

impl<C: SectionContent> RestSectionStore<C> {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            _content: PhantomData,
        }
    }

    fn record_path(id: &str) -> String {
        format!("{}/{}", C::SECTION.collection_path(), id)
    }
}

#[async_trait]
impl<C: SectionContent> SectionStore<C> for RestSectionStore<C> {
    async fn list(&self) -> Result<Vec<RemoteRecord<C>>, ApiError> {
        let response: ListResponse<C> = self.api.get_json(C::SECTION.collection_path()).await?;
        Ok(response.into_records())
    }

    async fn create(&self, content: &C) -> Result<RemoteRecord<C>, ApiError> {
        self.api
            .post_json(C::SECTION.collection_path(), content)
            .await
    }

    async fn update(&self, id: &str, content: &C) -> Result<(), ApiError> {
        self.api.update_json(&Self::record_path(id), content).await
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete(&Self::record_path(id)).await
    }
}

struct RestCoreStore {
    api: ApiClient,
}

#[async_trait]
impl CoreStore for RestCoreStore {
    async fn update_core(&self, core: &ProfileCore) -> Result<(), ApiError> {
        self.api.update_json("profile", core).await
    }
}

/// Everything the save flow needs from the remote store, one seam per
/// section plus the core record.
pub struct ProfileStores {
    pub core: Arc<dyn CoreStore>,
    pub education: Arc<dyn SectionStore<Education>>,
    pub experience: Arc<dyn SectionStore<Experience>>,
    pub certifications: Arc<dyn SectionStore<Certification>>,
}

impl ProfileStores {
    pub fn rest(api: ApiClient) -> Self {
        Self {
            core: Arc::new(RestCoreStore { api: api.clone() }),
            education: Arc::new(RestSectionStore::new(api.clone())),
            experience: Arc::new(RestSectionStore::new(api.clone())),
            certifications: Arc::new(RestSectionStore::new(api)),
        }
    }
}
