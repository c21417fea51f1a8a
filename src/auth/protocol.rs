/// The issuance and refresh protocol.
///
/// `AuthService` owns the two external collaborators (user store and
/// notification sink) and drives the credential state machine:
///
///   claims extracted -> user loaded -> refresh verified -> token verified
///   -> origin checked -> rotated -> persisted
///
/// A terminal failure at any step short-circuits with a typed error; no
/// step is skipped. A successful refresh rotates the user's signing secret
/// and refresh-token hash together, which implicitly revokes every access
/// token issued before the rotation.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};

use crate::auth::{codec, hasher, issuer, secret};
use crate::email_client::NotificationSink;
use crate::error::AppError;
use crate::storage::{NewUser, UserStore};

/// The pair delivered to clients. The refresh token is already in its
/// base64 transport encoding.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct AuthService<S, N> {
    store: S,
    notifier: Arc<N>,
    secret_length: usize,
    refresh_token_length: usize,
}

impl<S, N> AuthService<S, N>
where
    S: UserStore,
    N: NotificationSink + 'static,
{
    pub fn new(store: S, notifier: N, secret_length: usize, refresh_token_length: usize) -> Self {
        Self {
            store,
            notifier: Arc::new(notifier),
            secret_length,
            refresh_token_length,
        }
    }

    /// Issuance path: register a user and hand back their first token pair.
    pub async fn register(
        &self,
        ip: &str,
        email: &str,
        password: &str,
    ) -> Result<TokenPair, AppError> {
        let signing_secret = secret::new_secret(self.secret_length)?;
        let issued = issuer::issue(ip, email, &signing_secret, self.refresh_token_length)?;
        let password_hash = hasher::hash_credential(password)?;

        let user_id = self
            .store
            .create(NewUser {
                email,
                password_hash: &password_hash,
                origin_ip: ip,
                signing_secret: &signing_secret,
                refresh_token_hash: &issued.refresh_token_hash,
            })
            .await?;

        tracing::info!(user_id = %user_id, "user registered");

        Ok(TokenPair {
            access_token: issued.access_token,
            refresh_token: general_purpose::STANDARD.encode(&issued.refresh_token),
        })
    }

    /// Refresh path: validate the presented pair, rotate, persist, return
    /// the new pair. `current_ip` is the live connection origin, which
    /// becomes the recorded origin of the new credentials.
    pub async fn refresh(
        &self,
        access_token: &str,
        refresh_token: &str,
        current_ip: &str,
    ) -> Result<TokenPair, AppError> {
        // Unverified peek, only to learn whose secret to load. The real
        // verification happens below with the store-loaded secret.
        let claimed = codec::peek_claims(access_token)
            .map_err(|e| AppError::MalformedRequest(e.to_string()))?;

        let user = self.store.find_by_email(&claimed.email).await?;

        // Sole authorization gate: possession of the raw refresh token.
        let raw_refresh = decode_refresh_token(refresh_token)?;
        if !hasher::verify_credential(&raw_refresh, &user.refresh_token_hash) {
            tracing::warn!(email = %user.email, "refresh token mismatch");
            return Err(AppError::InvalidCredential);
        }

        // Mandatory second phase of the two-phase read.
        let verified = codec::verify(access_token, &user.signing_secret).map_err(|e| {
            tracing::warn!(email = %user.email, error = %e, "access token verification failed");
            AppError::InvalidCredential
        })?;

        // Origin drift does not fail the request; the account owner gets an
        // out-of-band heads-up and rotation proceeds.
        if user.origin_ip != verified.ip {
            tracing::warn!(
                email = %user.email,
                stored_ip = %user.origin_ip,
                token_ip = %verified.ip,
                "refresh requested from unexpected origin"
            );
            self.dispatch_origin_alert(&user.email, &user.origin_ip, current_ip);
        }

        let new_secret = secret::new_secret(self.secret_length)?;
        let issued = issuer::issue(
            current_ip,
            &verified.email,
            &new_secret,
            self.refresh_token_length,
        )?;

        // Conditioned on the hash that was true at verification time, so a
        // losing concurrent refresh observes a conflict instead of silently
        // overwriting the winner's credentials.
        let user_id = self
            .store
            .update_credentials(
                &user.email,
                current_ip,
                &new_secret,
                &issued.refresh_token_hash,
                &user.refresh_token_hash,
            )
            .await?;

        tracing::info!(user_id = %user_id, "credentials rotated");

        Ok(TokenPair {
            access_token: issued.access_token,
            refresh_token: general_purpose::STANDARD.encode(&issued.refresh_token),
        })
    }

    /// Fire-and-forget origin-change alert. Runs on its own task with its
    /// own error channel; never joins the request's error path.
    fn dispatch_origin_alert(&self, email: &str, previous_ip: &str, current_ip: &str) {
        let notifier = Arc::clone(&self.notifier);
        let email = email.to_string();
        let body = format!(
            "A token refresh for your account was requested from {}, but your \
             previous session originated from {}. If this was not you, change \
             your password immediately.",
            current_ip, previous_ip
        );

        tokio::spawn(async move {
            if let Err(e) = notifier
                .notify(&email, "Your access token was refreshed from a new address", &body)
                .await
            {
                tracing::warn!(email = %email, error = %e, "origin-change notification failed");
            }
        });
    }
}

/// Refresh tokens travel base64(standard)-encoded; any other encoding is a
/// client error.
fn decode_refresh_token(encoded: &str) -> Result<String, AppError> {
    let bytes = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| AppError::MalformedRequest(format!("refresh token encoding: {}", e)))?;

    String::from_utf8(bytes)
        .map_err(|e| AppError::MalformedRequest(format!("refresh token encoding: {}", e)))
}
