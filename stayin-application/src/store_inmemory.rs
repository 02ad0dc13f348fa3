//! 内存版 Stayin 存储
//!
//! 工作单元在开启时复制一份当前状态供读取，写操作同时记入变更日志；
//! 提交时在账本锁内重放变更日志并写入消费记录，两者一起生效。
use crate::error::AppResult;
use crate::store::{HousePublication, Rental, StayinWork, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stayin_eventing::error::EventingResult;
use stayin_eventing::persist::{
    ConsumedEventLedger, DataStore, InMemoryLedger, LedgerBuffer, UnitOfWork,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Default)]
struct StayinState {
    users: BTreeMap<String, UserProfile>,
    publications: BTreeMap<String, HousePublication>,
    rentals: BTreeMap<String, Rental>,
}

#[derive(Debug, Clone)]
enum Mutation {
    PutUser(UserProfile),
    DeleteUser(String),
    PutPublication(HousePublication),
    PutRental(Rental),
}

impl StayinState {
    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::PutUser(user) => {
                self.users.insert(user.user_id.clone(), user);
            }
            Mutation::DeleteUser(user_id) => {
                self.users.remove(&user_id);
            }
            Mutation::PutPublication(publication) => {
                self.publications.insert(publication.id.clone(), publication);
            }
            Mutation::PutRental(rental) => {
                self.rentals.insert(rental.id.clone(), rental);
            }
        }
    }
}

/// 克隆共享同一份状态与账本
#[derive(Clone, Default)]
pub struct InMemoryStayinStore {
    ledger: InMemoryLedger,
    state: Arc<Mutex<StayinState>>,
}

impl InMemoryStayinStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 底层账本，可用于检查消费记录或注入提交失败
    pub fn ledger(&self) -> &InMemoryLedger {
        &self.ledger
    }

    pub fn user(&self, user_id: &str) -> Option<UserProfile> {
        self.lock().users.get(user_id).cloned()
    }

    pub fn publication(&self, id: &str) -> Option<HousePublication> {
        self.lock().publications.get(id).cloned()
    }

    pub fn rental(&self, id: &str) -> Option<Rental> {
        self.lock().rentals.get(id).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn rental_count(&self) -> usize {
        self.lock().rentals.len()
    }

    fn lock(&self) -> MutexGuard<'_, StayinState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DataStore for InMemoryStayinStore {
    type Work = InMemoryStayinWork;

    async fn begin(&self) -> EventingResult<Self::Work> {
        Ok(InMemoryStayinWork {
            store: self.clone(),
            buffer: self.ledger.buffer(),
            staged: self.lock().clone(),
            mutations: Vec::new(),
        })
    }
}

pub struct InMemoryStayinWork {
    store: InMemoryStayinStore,
    buffer: LedgerBuffer,
    staged: StayinState,
    mutations: Vec<Mutation>,
}

impl InMemoryStayinWork {
    fn stage(&mut self, mutation: Mutation) {
        self.staged.apply(mutation.clone());
        self.mutations.push(mutation);
    }
}

#[async_trait]
impl ConsumedEventLedger for InMemoryStayinWork {
    async fn has_consumed(&mut self, event_id: &str) -> EventingResult<bool> {
        Ok(self.buffer.contains(event_id))
    }

    async fn record_consumed(
        &mut self,
        event_id: &str,
        consumed_at: DateTime<Utc>,
    ) -> EventingResult<()> {
        self.buffer.push(event_id, consumed_at);
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStayinWork {
    async fn commit(self) -> EventingResult<()> {
        let Self {
            store,
            buffer,
            mutations,
            ..
        } = self;
        let state = store.state.clone();

        store.ledger.commit_with(buffer, move || {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            for mutation in mutations {
                state.apply(mutation);
            }
        })
    }

    async fn rollback(self) -> EventingResult<()> {
        Ok(())
    }
}

#[async_trait]
impl StayinWork for InMemoryStayinWork {
    async fn upsert_user(&mut self, user: UserProfile) -> AppResult<()> {
        self.stage(Mutation::PutUser(user));
        Ok(())
    }

    async fn update_user(&mut self, user: UserProfile) -> AppResult<bool> {
        let existed = self.staged.users.contains_key(&user.user_id);
        self.stage(Mutation::PutUser(user));
        Ok(existed)
    }

    async fn delete_user_details(&mut self, user_id: &str) -> AppResult<()> {
        self.stage(Mutation::DeleteUser(user_id.to_string()));
        Ok(())
    }

    async fn create_house_publication(&mut self, publication: HousePublication) -> AppResult<()> {
        self.stage(Mutation::PutPublication(publication));
        Ok(())
    }

    async fn get_house_publication(&mut self, id: &str) -> AppResult<Option<HousePublication>> {
        Ok(self.staged.publications.get(id).cloned())
    }

    async fn add_rental(&mut self, rental: Rental) -> AppResult<()> {
        self.stage(Mutation::PutRental(rental));
        Ok(())
    }
}
