//! Thread-safe in-process store for tests and local development.
//!
//! Provisioning transactions write through immediately and keep an undo
//! record; dropping a transaction without committing removes its writes.
//! Token rows are unique per `(mobile_number, token_type)` just like the
//! Postgres index, so concurrent inserts for one key conflict.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
    StoreError, StoreResult,
    ports::{ExternalTokenRepository, ProvisioningTx, SessionRepository, UserRepository},
};
use crate::{
    auth::session::{NewSession, Session},
    telco::{ExternalAccessToken, ExternalTokenType, FirstOrCreateParams},
    users::{NewUser, Role, User},
};

type TokenKey = (String, ExternalTokenType);
type TxId = u64;

#[derive(Debug)]
struct TokenRow {
    token: ExternalAccessToken,
    owner: Option<TxId>,
}

#[derive(Debug)]
struct SimCardRow {
    _mobile_number_type: Option<String>,
    committed: bool,
    holders: HashSet<TxId>,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<i64, User>,
    roles: Vec<Role>,
    user_roles: HashMap<i64, HashSet<i64>>,
    sessions: HashMap<Uuid, Session>,
    tokens: HashMap<TokenKey, TokenRow>,
    sim_cards: HashMap<String, SimCardRow>,
    next_user_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    next_tx: Arc<AtomicU64>,
}

impl MemoryStore {
    /// Store pre-populated with the administrator-managed roles.
    pub fn with_default_roles() -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock();
            state.roles = vec![
                Role {
                    id: 1,
                    name: "SUPERADMIN".into(),
                },
                Role {
                    id: 2,
                    name: "ADMIN".into(),
                },
            ];
        }
        store
    }

    /// Insert a committed token row directly, bypassing provisioning.
    pub fn seed_external_token(&self, token: ExternalAccessToken) {
        let key = (token.mobile_number.clone(), token.token_type);
        self.state
            .lock()
            .tokens
            .insert(key, TokenRow { token, owner: None });
    }

    pub fn external_token_count(&self) -> usize {
        self.state.lock().tokens.len()
    }

    pub fn sim_card_count(&self) -> usize {
        self.state.lock().sim_cards.len()
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn create_session(&self, session: &NewSession) -> StoreResult<Session> {
        let mut state = self.state.lock();
        if state.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict("sessions_pkey".into()));
        }
        let row = Session {
            id: session.id,
            subject_id: session.subject_id,
            refresh_token_id: session.refresh_token_id,
            user_agent: session.user_agent.clone(),
            client_ip: session.client_ip.clone(),
            is_blocked: false,
            expires_at: session.expires_at,
            created_at: Utc::now(),
        };
        state.sessions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_session_by_id(&self, id: Uuid) -> StoreResult<Option<Session>> {
        Ok(self.state.lock().sessions.get(&id).cloned())
    }

    async fn block_session(&self, id: Uuid) -> StoreResult<Session> {
        let mut state = self.state.lock();
        let session = state.sessions.get_mut(&id).ok_or(StoreError::NotFound)?;
        session.is_blocked = true;
        Ok(session.clone())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        let mut state = self.state.lock();
        if state.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("users_username_key".into()));
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("users_email_key".into()));
        }

        state.next_user_id += 1;
        let row = User {
            id: state.next_user_id,
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            created_at: Utc::now(),
        };
        state.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .state
            .lock()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_user_role(&self, user_id: i64) -> StoreResult<Option<String>> {
        let state = self.state.lock();
        let Some(role_ids) = state.user_roles.get(&user_id) else {
            return Ok(None);
        };
        Ok(state
            .roles
            .iter()
            .filter(|role| role_ids.contains(&role.id))
            .min_by_key(|role| role.id)
            .map(|role| role.name.clone()))
    }

    async fn assign_role(&self, user_id: i64, role_name: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        let role_id = state
            .roles
            .iter()
            .find(|role| role.name == role_name)
            .map(|role| role.id)
            .ok_or(StoreError::NotFound)?;
        state.user_roles.entry(user_id).or_default().insert(role_id);
        Ok(())
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let mut roles = self.state.lock().roles.clone();
        roles.sort_by_key(|role| role.id);
        Ok(roles)
    }
}

#[async_trait]
impl ExternalTokenRepository for MemoryStore {
    async fn begin_provisioning(&self) -> StoreResult<Box<dyn ProvisioningTx>> {
        Ok(Box::new(MemoryProvisioningTx {
            id: self.next_tx.fetch_add(1, Ordering::SeqCst),
            state: self.state.clone(),
            inserted_tokens: Vec::new(),
            held_sim_cards: Vec::new(),
            committed: false,
        }))
    }

    async fn get_external_token(
        &self,
        mobile_number: &str,
        token_type: ExternalTokenType,
    ) -> StoreResult<Option<ExternalAccessToken>> {
        let key = (mobile_number.to_string(), token_type);
        Ok(self
            .state
            .lock()
            .tokens
            .get(&key)
            .map(|row| row.token.clone()))
    }
}

#[derive(Debug)]
struct MemoryProvisioningTx {
    id: TxId,
    state: Arc<Mutex<State>>,
    inserted_tokens: Vec<TokenKey>,
    held_sim_cards: Vec<String>,
    committed: bool,
}

#[async_trait]
impl ProvisioningTx for MemoryProvisioningTx {
    async fn find_token(
        &mut self,
        mobile_number: &str,
        token_type: ExternalTokenType,
    ) -> StoreResult<Option<ExternalAccessToken>> {
        let key = (mobile_number.to_string(), token_type);
        Ok(self
            .state
            .lock()
            .tokens
            .get(&key)
            .map(|row| row.token.clone()))
    }

    async fn ensure_sim_card(
        &mut self,
        mobile_number: &str,
        mobile_number_type: Option<&str>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock();
        let row = state
            .sim_cards
            .entry(mobile_number.to_string())
            .or_insert_with(|| SimCardRow {
                _mobile_number_type: mobile_number_type.map(str::to_string),
                committed: false,
                holders: HashSet::new(),
            });
        if !row.committed && row.holders.insert(self.id) {
            self.held_sim_cards.push(mobile_number.to_string());
        }
        Ok(())
    }

    async fn insert_token(
        &mut self,
        params: &FirstOrCreateParams,
    ) -> StoreResult<ExternalAccessToken> {
        let key = (params.mobile_number.clone(), params.token_type);
        let mut state = self.state.lock();
        if state.tokens.contains_key(&key) {
            return Err(StoreError::Conflict(
                "uq_sim_access_tokens_number_type".into(),
            ));
        }

        let token = ExternalAccessToken {
            access_token: params.access_token.clone(),
            mobile_number: params.mobile_number.clone(),
            token_type: params.token_type,
            created_at: Utc::now(),
        };
        state.tokens.insert(
            key.clone(),
            TokenRow {
                token: token.clone(),
                owner: Some(self.id),
            },
        );
        self.inserted_tokens.push(key);
        Ok(token)
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let mut state = self.state.lock();
        for key in self.inserted_tokens.drain(..) {
            if let Some(row) = state.tokens.get_mut(&key) {
                row.owner = None;
            }
        }
        for number in self.held_sim_cards.drain(..) {
            if let Some(row) = state.sim_cards.get_mut(&number) {
                row.committed = true;
                row.holders.clear();
            }
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for MemoryProvisioningTx {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut state = self.state.lock();
        for key in self.inserted_tokens.drain(..) {
            if matches!(state.tokens.get(&key), Some(row) if row.owner == Some(self.id)) {
                state.tokens.remove(&key);
            }
        }
        for number in self.held_sim_cards.drain(..) {
            let orphaned = match state.sim_cards.get_mut(&number) {
                Some(row) => {
                    row.holders.remove(&self.id);
                    !row.committed && row.holders.is_empty()
                }
                None => false,
            };
            if orphaned {
                state.sim_cards.remove(&number);
            }
        }
    }
}
