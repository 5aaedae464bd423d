//! Promotion Catalog
//!
//! Lookup of promotions by UUID or redemption code. Codes are unique among
//! promotions that have not reached a terminal status.

use async_trait::async_trait;
use mockall::automock;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::promotions::{Promotion, PromotionCode, PromotionUuid, status::PromotionStatus};

/// Errors raised by a promotion catalog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// A promotion with this UUID is already stored.
    #[error("promotion {0} already exists")]
    AlreadyExists(PromotionUuid),

    /// Another live promotion uses this code.
    #[error("promotion code {0} is already in use")]
    DuplicateCode(PromotionCode),

    /// No promotion with this UUID.
    #[error("promotion {0} not found")]
    NotFound(PromotionUuid),
}

/// Promotion storage.
#[automock]
#[async_trait]
pub trait PromotionCatalog: Send + Sync {
    /// Promotion by UUID.
    async fn get(&self, uuid: PromotionUuid) -> Result<Option<Promotion>, CatalogError>;

    /// Promotion by redemption code, compared case-insensitively.
    async fn find_by_code(&self, code: PromotionCode) -> Result<Option<Promotion>, CatalogError>;

    /// Store a new promotion.
    async fn insert(&self, promotion: Promotion) -> Result<(), CatalogError>;

    /// Persist a new status, returning the updated promotion.
    async fn update_status(
        &self,
        uuid: PromotionUuid,
        status: PromotionStatus,
    ) -> Result<Promotion, CatalogError>;

    /// Every stored promotion.
    async fn list(&self) -> Result<Vec<Promotion>, CatalogError>;
}

#[derive(Debug, Default)]
struct CatalogState {
    promotions: FxHashMap<PromotionUuid, Promotion>,
    codes: FxHashMap<PromotionCode, PromotionUuid>,
}

impl CatalogState {
    fn insert(&mut self, promotion: Promotion) -> Result<(), CatalogError> {
        let uuid = promotion.uuid();

        if self.promotions.contains_key(&uuid) {
            return Err(CatalogError::AlreadyExists(uuid));
        }

        if let Some(code) = promotion.code() {
            let taken = self
                .codes
                .get(code)
                .and_then(|existing| self.promotions.get(existing))
                .is_some_and(|existing| !existing.status().is_terminal());

            if taken {
                return Err(CatalogError::DuplicateCode(code.clone()));
            }

            self.codes.insert(code.clone(), uuid);
        }

        self.promotions.insert(uuid, promotion);

        Ok(())
    }
}

/// Catalog held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryPromotionCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryPromotionCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog holding the given promotions.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] if two promotions share a UUID or a live code.
    pub fn with_promotions(
        promotions: impl IntoIterator<Item = Promotion>,
    ) -> Result<Self, CatalogError> {
        let mut state = CatalogState::default();

        for promotion in promotions {
            state.insert(promotion)?;
        }

        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

#[async_trait]
impl PromotionCatalog for InMemoryPromotionCatalog {
    async fn get(&self, uuid: PromotionUuid) -> Result<Option<Promotion>, CatalogError> {
        Ok(self.state.read().await.promotions.get(&uuid).cloned())
    }

    async fn find_by_code(&self, code: PromotionCode) -> Result<Option<Promotion>, CatalogError> {
        let state = self.state.read().await;

        Ok(state
            .codes
            .get(&code)
            .and_then(|uuid| state.promotions.get(uuid))
            .cloned())
    }

    async fn insert(&self, promotion: Promotion) -> Result<(), CatalogError> {
        self.state.write().await.insert(promotion)
    }

    async fn update_status(
        &self,
        uuid: PromotionUuid,
        status: PromotionStatus,
    ) -> Result<Promotion, CatalogError> {
        let mut state = self.state.write().await;

        let promotion = state
            .promotions
            .remove(&uuid)
            .ok_or(CatalogError::NotFound(uuid))?
            .with_status(status);

        state.promotions.insert(uuid, promotion.clone());

        Ok(promotion)
    }

    async fn list(&self) -> Result<Vec<Promotion>, CatalogError> {
        let mut promotions: Vec<Promotion> =
            self.state.read().await.promotions.values().cloned().collect();

        promotions.sort_by_key(Promotion::uuid);

        Ok(promotions)
    }
}
