#![allow(dead_code)]

use async_trait::async_trait;
use authgate_server::clock::{Clock, ManualClock};
use authgate_server::error::DatabaseError;
use authgate_server::{AppError, AppState, MemoryThrottleStore, Settings, User, UserRepository};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Users table stand-in with the same unique-email rule as the Postgres schema.
#[derive(Default)]
pub struct InMemoryUsers {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait]
impl UserRepository for InMemoryUsers {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn create(&self, user: &User) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Err(DatabaseError::Duplicate.into());
        }
        users.insert(user.email.clone(), user.clone());
        Ok(user.clone())
    }

    async fn list(&self) -> Result<Vec<User>, AppError> {
        Ok(self.users.read().await.values().cloned().collect())
    }
}

pub struct TestContext {
    pub state: AppState,
    pub users: Arc<InMemoryUsers>,
    pub store: Arc<MemoryThrottleStore>,
    pub clock: Arc<ManualClock>,
}

pub fn test_context() -> TestContext {
    let config = Settings::new_for_test().expect("Failed to load test config");
    let clock = Arc::new(ManualClock::default());
    let users = Arc::new(InMemoryUsers::default());
    let store = Arc::new(MemoryThrottleStore::new(clock.clone()));

    let state = AppState::from_parts(
        config,
        users.clone(),
        store.clone(),
        clock.clone() as Arc<dyn Clock>,
    )
    .expect("Failed to build app state");

    TestContext {
        state,
        users,
        store,
        clock,
    }
}
