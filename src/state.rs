//! 应用共享状态
//! Shared application state
//!
//! 所有协作方（存储、关联表、令牌服务、凭证校验、实时中枢）在此
//! 构建并注入，处理器只依赖抽象。
//! Every collaborator (store, relation map, token service, credential
//! verifier, realtime hub) is built and injected here; handlers depend
//! on the abstractions only.

use std::sync::Arc;

use crate::auth::{CredentialVerifier, HmacTokenService, TokenService};
use crate::chat::ChatHub;
use crate::conf::AppConfig;
use crate::modules::{admin, category, menu_item, outlet, owner, user};
use crate::repo::{RelationMap, Repository};
use crate::store::{DocumentStore, MemoryStore};

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn DocumentStore>,
    pub relations: Arc<RelationMap>,
    pub tokens: Arc<dyn TokenService>,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub hub: Arc<ChatHub>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let memory = Arc::new(MemoryStore::new());
        memory.set_validator(admin::META.collection, admin::validator());
        memory.set_validator(owner::META.collection, owner::validator());
        memory.set_validator(outlet::META.collection, outlet::validator());
        memory.set_validator(category::META.collection, category::validator());
        memory.set_validator(menu_item::META.collection, menu_item::validator());
        memory.set_validator(user::META.collection, user::validator());
        let store: Arc<dyn DocumentStore> = memory;

        let relations = Arc::new(RelationMap::new(&[
            admin::META,
            admin::ROLE_META,
            owner::META,
            outlet::META,
            category::META,
            menu_item::META,
            user::META,
        ]));

        let tokens: Arc<dyn TokenService> =
            Arc::new(HmacTokenService::new(config.token.clone()));
        let credentials: Arc<dyn CredentialVerifier> =
            Arc::new(user::StoreCredentials::new(store.clone()));
        let hub = Arc::new(ChatHub::new(config.chat.clone()));

        Self {
            config,
            store,
            relations,
            tokens,
            credentials,
            hub,
        }
    }

    fn repo(&self, meta: crate::repo::EntityMeta) -> Repository {
        Repository::new(self.store.clone(), meta, self.relations.clone())
    }

    pub fn admins(&self) -> Repository {
        self.repo(admin::META)
    }

    pub fn roles(&self) -> Repository {
        self.repo(admin::ROLE_META)
    }

    pub fn owners(&self) -> Repository {
        self.repo(owner::META)
    }

    pub fn outlets(&self) -> Repository {
        self.repo(outlet::META)
    }

    pub fn categories(&self) -> Repository {
        self.repo(category::META)
    }

    pub fn menu_items(&self) -> Repository {
        self.repo(menu_item::META)
    }

    pub fn users(&self) -> Repository {
        self.repo(user::META)
    }
}
