pub mod authenticator;
pub mod codec;
pub mod crypto;
pub mod identity;
pub mod session;

pub use authenticator::{Authenticator, LoginOutcome, Registration};
pub use codec::{IssuedToken, TokenCodec, TokenError, TokenKind, TokenPayload};
pub use crypto::{CryptoError, PasswordCrypto};
pub use identity::{Identity, RoleSet, roles};
pub use session::{ClientMeta, Session, SessionStore, SessionTokens, TokenTtls};
