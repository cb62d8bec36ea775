/*!
Authentication and authorization rules.

Registration, login, and token checks all live on the `Auth` struct,
which gets its signing secret, admin registration code, and token
lifetime injected at construction; there are no compiled-in secrets
anywhere in this module.

Session tokens are HS256-signed bearer credentials carrying the account
id, name, email, role, and an expiry. Whoever holds a valid, unexpired
token *is* that account until the token lapses; there is no server-side
revocation, and logout is the client throwing its token away.

Passwords are stored and compared as an unsalted single-pass SHA-256
digest, base64-encoded, for compatibility with the existing account
data. NOTE: that scheme is weak; anything handling accounts it actually
cares about should move to a salted, slow, memory-hard hash (and
re-digest on first login after the switch).
*/
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use jsonwebtoken::{
    decode, encode, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::account::{Account, Role};
use crate::store::{DbError, Store};

/// Injected secrets and knobs; see `config::Cfg`.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub token_secret: String,
    pub token_lifetime_secs: i64,
    pub admin_reg_code: String,
}

/// What a session token asserts.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub exp: i64,
}

/// A successful login: the token plus enough about the account for the
/// client to show who's signed in.
#[derive(Debug, Serialize)]
pub struct Session {
    pub token: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, PartialEq)]
pub enum AuthError {
    /// Registration against an email that already has an account.
    EmailTaken,
    /// Admin registration with the wrong shared code.
    InvalidAdminCode,
    /// Unknown email or wrong password; deliberately the same variant
    /// and message for both, so callers can't probe which emails exist.
    InvalidCredentials,
    /// Missing, malformed, expired, or wrongly-signed token.
    InvalidToken,
    /// A perfectly good token for an account that isn't allowed to do
    /// this.
    Forbidden,
    /// The store fell over.
    Db(DbError),
    /// Token machinery failed; should essentially never happen.
    Internal(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AuthError::EmailTaken => write!(
                f, "That email address is already registered. Please use a different one."
            ),
            AuthError::InvalidAdminCode => write!(
                f, "The administrator code provided is incorrect."
            ),
            AuthError::InvalidCredentials => write!(
                f, "The email address or password is incorrect."
            ),
            AuthError::InvalidToken => write!(
                f, "Your session is missing or expired. Please log in again."
            ),
            AuthError::Forbidden => write!(
                f, "You do not have permission to perform this action."
            ),
            AuthError::Db(e) => write!(f, "Database error: {}", e),
            AuthError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl From<DbError> for AuthError {
    fn from(e: DbError) -> AuthError { AuthError::Db(e) }
}

/// The digest stored in the `pwhash` column and compared at login.
pub fn hash_password(password: &str) -> String {
    BASE64.encode(Sha256::digest(password.as_bytes()))
}

pub struct Auth {
    cfg: AuthConfig,
}

impl Auth {
    pub fn new(cfg: AuthConfig) -> Self {
        log::trace!("Auth::new( [ config ] ) called.");

        Self { cfg }
    }

    /// Creates a Student account. The email must not already be taken
    /// (exact-case match, same as the store's UNIQUE constraint).
    pub async fn register(
        &self,
        store: &Store,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Uuid, AuthError> {
        log::trace!("Auth::register( Store, {:?}, {:?}, ... ) called.", name, email);

        if store.email_exists(email).await? {
            return Err(AuthError::EmailTaken);
        }

        let id = store.insert_account(
            name, email, &hash_password(password), Role::Student
        ).await?;

        log::trace!("Registered Student {:?} as {}.", email, &id);
        Ok(id)
    }

    /**
    Creates an Admin account, gated on the shared registration code.

    The code is checked before the email, so a wrong code learns nothing
    about which emails are registered, and no account row is created.
    */
    pub async fn register_admin(
        &self,
        store: &Store,
        name: &str,
        email: &str,
        password: &str,
        admin_code: &str,
    ) -> Result<Uuid, AuthError> {
        log::trace!(
            "Auth::register_admin( Store, {:?}, {:?}, ... ) called.",
            name, email
        );

        if admin_code != self.cfg.admin_reg_code {
            return Err(AuthError::InvalidAdminCode);
        }

        if store.email_exists(email).await? {
            return Err(AuthError::EmailTaken);
        }

        let id = store.insert_account(
            name, email, &hash_password(password), Role::Admin
        ).await?;

        log::trace!("Registered Admin {:?} as {}.", email, &id);
        Ok(id)
    }

    /**
    Checks credentials and issues a session token.

    An unknown email and a wrong password both come back as
    `InvalidCredentials`; the two cases are indistinguishable from
    outside.
    */
    pub async fn login(
        &self,
        store: &Store,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        log::trace!("Auth::login( Store, {:?}, ... ) called.", email);

        let account = match store.account_by_email(email).await? {
            None => { return Err(AuthError::InvalidCredentials); },
            Some(a) => a,
        };

        if hash_password(password) != account.pwhash {
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.issue_token(&account)?;

        log::trace!("Issued token for {} ({}).", &account.id, email);
        Ok(Session {
            token,
            name: account.name,
            email: account.email,
            role: account.role,
        })
    }

    /// Signs a fresh token for the account, expiring a configured
    /// interval from now.
    pub fn issue_token(&self, account: &Account) -> Result<String, AuthError> {
        let claims = Claims {
            sub: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            role: account.role,
            exp: OffsetDateTime::now_utc().unix_timestamp()
                + self.cfg.token_lifetime_secs,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.cfg.token_secret.as_bytes()),
        ).map_err(|e| AuthError::Internal(
            format!("Error signing token: {}", &e)
        ))
    }

    /**
    Verifies a token and checks its role against the allowed set.

    Anything wrong with the token itself (signature, shape, expiry) is
    `InvalidToken`; a sound token with a role not in `allowed` is
    `Forbidden`.
    */
    pub fn authorize(
        &self,
        token: &str,
        allowed: &[Role],
    ) -> Result<Claims, AuthError> {
        log::trace!("Auth::authorize( [ token ], {:?} ) called.", allowed);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.cfg.token_secret.as_bytes()),
            &Validation::default(),
        ).map_err(|e| {
            log::trace!("    ...token rejected: {}", &e);
            AuthError::InvalidToken
        })?;

        if !allowed.contains(&data.claims.role) {
            return Err(AuthError::Forbidden);
        }

        Ok(data.claims)
    }

    /// Student-scoped authorization: the token must be a valid Student
    /// token *for the given account*. Acting on somebody else's account
    /// is `Forbidden` even with a perfectly good token.
    pub fn authorize_account(
        &self,
        token: &str,
        account: &Uuid,
    ) -> Result<Claims, AuthError> {
        log::trace!("Auth::authorize_account( [ token ], {} ) called.", account);

        let claims = self.authorize(token, &[Role::Student])?;
        if claims.sub != *account {
            return Err(AuthError::Forbidden);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::tests::ensure_logging;
    use crate::store::tests::TEST_CONNECTION;

    fn test_auth() -> Auth {
        Auth::new(AuthConfig {
            token_secret: "a-long-test-secret-nobody-should-reuse".to_owned(),
            token_lifetime_secs: 7200,
            admin_reg_code: "LETMEIN".to_owned(),
        })
    }

    fn test_account(role: Role) -> Account {
        Account {
            id: Uuid::new_v4(),
            name: "Pat Tester".to_owned(),
            email: "pat@matric.test".to_owned(),
            pwhash: hash_password("hunter2"),
            role,
        }
    }

    #[test]
    fn digest_is_deterministic() {
        // Known SHA-256 vector for "password", base64-encoded.
        assert_eq!(
            hash_password("password"),
            "XohImNooBHFR0OVvjcYpJ3NgPQ1qq73WKhHvch0VQtg="
        );
        assert_eq!(hash_password("hunter2"), hash_password("hunter2"));
        assert_ne!(hash_password("hunter2"), hash_password("hunter3"));
    }

    #[test]
    fn token_round_trip() {
        let auth = test_auth();
        let account = test_account(Role::Student);

        let token = auth.issue_token(&account).unwrap();
        let claims = auth.authorize(&token, &[Role::Student]).unwrap();
        assert_eq!(claims.sub, account.id);
        assert_eq!(claims.role, Role::Student);
        assert_eq!(claims.email.as_str(), "pat@matric.test");

        // Also fine when the role is one of several allowed.
        auth.authorize(&token, &[Role::Student, Role::Admin]).unwrap();
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let auth = test_auth();
        let token = auth.issue_token(&test_account(Role::Student)).unwrap();

        assert_eq!(
            auth.authorize(&token, &[Role::Admin]),
            Err(AuthError::Forbidden)
        );
    }

    #[test]
    fn bad_tokens_are_invalid() {
        let auth = test_auth();

        assert_eq!(
            auth.authorize("not-even-a-token", &[Role::Student]),
            Err(AuthError::InvalidToken)
        );

        // Signed with somebody else's secret.
        let other = Auth::new(AuthConfig {
            token_secret: "a-different-secret-entirely".to_owned(),
            token_lifetime_secs: 7200,
            admin_reg_code: "LETMEIN".to_owned(),
        });
        let forged = other.issue_token(&test_account(Role::Admin)).unwrap();
        assert_eq!(
            auth.authorize(&forged, &[Role::Admin]),
            Err(AuthError::InvalidToken)
        );

        // Expired two hours ago.
        let stale_issuer = Auth::new(AuthConfig {
            token_secret: "a-long-test-secret-nobody-should-reuse".to_owned(),
            token_lifetime_secs: -7200,
            admin_reg_code: "LETMEIN".to_owned(),
        });
        let stale = stale_issuer.issue_token(&test_account(Role::Student)).unwrap();
        assert_eq!(
            auth.authorize(&stale, &[Role::Student]),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn identity_scope_is_enforced() {
        let auth = test_auth();
        let me = test_account(Role::Student);
        let token = auth.issue_token(&me).unwrap();

        auth.authorize_account(&token, &me.id).unwrap();
        assert_eq!(
            auth.authorize_account(&token, &Uuid::new_v4()),
            Err(AuthError::Forbidden)
        );

        // An admin token doesn't pass the student-scoped gate at all.
        let admin = test_account(Role::Admin);
        let admin_token = auth.issue_token(&admin).unwrap();
        assert_eq!(
            auth.authorize_account(&admin_token, &admin.id),
            Err(AuthError::Forbidden)
        );
    }

    #[tokio::test]
    #[serial]
    async fn register_then_login_round_trip() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        let auth = test_auth();

        let id = auth.register(&db, "New Kid", "kid@matric.test", "s3kr1t")
            .await.unwrap();

        let session = auth.login(&db, "kid@matric.test", "s3kr1t")
            .await.unwrap();
        assert_eq!(session.role, Role::Student);
        assert_eq!(session.name.as_str(), "New Kid");

        let claims = auth.authorize(&session.token, &[Role::Student]).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.role, Role::Student);

        // Same email again, even with a different password: taken.
        assert_eq!(
            auth.register(&db, "Imposter", "kid@matric.test", "other").await,
            Err(AuthError::EmailTaken)
        );

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn both_credential_failures_look_the_same() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        let auth = test_auth();

        auth.register(&db, "Real User", "real@matric.test", "rightpw")
            .await.unwrap();

        let wrong_pw = auth.login(&db, "real@matric.test", "wrongpw")
            .await.unwrap_err();
        let no_user = auth.login(&db, "nobody@matric.test", "rightpw")
            .await.unwrap_err();

        assert_eq!(wrong_pw, AuthError::InvalidCredentials);
        assert_eq!(no_user, AuthError::InvalidCredentials);
        // Identical all the way out to the message text.
        assert_eq!(format!("{}", wrong_pw), format!("{}", no_user));

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn admin_registration_is_gated() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        let auth = test_auth();

        // Wrong code: refused, and no account comes into being.
        assert_eq!(
            auth.register_admin(
                &db, "Wannabe", "wannabe@matric.test", "pw", "WRONG_CODE"
            ).await,
            Err(AuthError::InvalidAdminCode)
        );
        assert!(!db.email_exists("wannabe@matric.test").await.unwrap());

        let id = auth.register_admin(
            &db, "Boss", "boss@matric.test", "pw", "LETMEIN"
        ).await.unwrap();

        let session = auth.login(&db, "boss@matric.test", "pw")
            .await.unwrap();
        assert_eq!(session.role, Role::Admin);
        let claims = auth.authorize(&session.token, &[Role::Admin]).unwrap();
        assert_eq!(claims.sub, id);

        db.nuke_database().await.unwrap();
    }
}
