use std::{fmt, sync::Arc};

use anyhow::Context;
use panahon_core::{
    auth::{Authenticator, PasswordCrypto, SessionStore, TokenCodec},
    database::ports::{Store, UserRepository},
    telco::TokenProvisioner,
};

use crate::{infra::config::Config, telco::glabs::GlabsClient};

/// Shared handles for every request. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub codec: Arc<TokenCodec>,
    pub authenticator: Authenticator,
    pub users: Arc<dyn UserRepository>,
    pub provisioner: TokenProvisioner,
    pub glabs: GlabsClient,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new<S>(config: Arc<Config>, store: Arc<S>) -> anyhow::Result<Self>
    where
        S: Store + 'static,
    {
        Self::with_crypto(config, store, PasswordCrypto::default())
    }

    /// Like [`AppState::new`] with explicit Argon2 parameters.
    pub fn with_crypto<S>(
        config: Arc<Config>,
        store: Arc<S>,
        crypto: PasswordCrypto,
    ) -> anyhow::Result<Self>
    where
        S: Store + 'static,
    {
        let codec = Arc::new(
            TokenCodec::new(config.auth.token_symmetric_key.as_slice())
                .context("failed to initialize token codec")?,
        );
        let ttls = config.token_ttls().context("invalid token lifetimes")?;

        let sessions = SessionStore::new(store.clone(), codec.clone(), ttls);
        let authenticator = Authenticator::new(store.clone(), crypto, sessions);
        let glabs = GlabsClient::new(&config.glabs).context("failed to build Globe Labs client")?;

        Ok(Self {
            codec,
            authenticator,
            users: store.clone(),
            provisioner: TokenProvisioner::new(store),
            glabs,
            config,
        })
    }

    pub fn sessions(&self) -> &SessionStore {
        self.authenticator.sessions()
    }
}
