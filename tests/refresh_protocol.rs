//! Protocol tests running against in-memory collaborators, so the full
//! issuance/refresh state machine is exercised without a database or a
//! mail service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use tokio::sync::mpsc;
use uuid::Uuid;

use tokenguard::auth::{codec, hasher, AuthService};
use tokenguard::email_client::NotificationSink;
use tokenguard::error::{AppError, NotifyError, StoreError};
use tokenguard::storage::{NewUser, User, UserStore};

const SECRET_LENGTH: usize = 64;
const REFRESH_TOKEN_LENGTH: usize = 48;

#[derive(Clone, Default)]
struct InMemoryStore {
    users: Arc<Mutex<HashMap<String, User>>>,
}

impl InMemoryStore {
    fn get(&self, email: &str) -> Option<User> {
        self.users.lock().unwrap().get(email).cloned()
    }

    fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.email.clone(), user);
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create(&self, user: NewUser<'_>) -> Result<Uuid, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(user.email) {
            return Err(StoreError::DuplicateEmail);
        }

        let id = Uuid::new_v4();
        users.insert(
            user.email.to_string(),
            User {
                id,
                email: user.email.to_string(),
                password_hash: user.password_hash.to_string(),
                origin_ip: user.origin_ip.to_string(),
                signing_secret: user.signing_secret.to_string(),
                refresh_token_hash: user.refresh_token_hash.to_string(),
            },
        );
        Ok(id)
    }

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.get(email).ok_or(StoreError::NotFound)
    }

    async fn update_credentials(
        &self,
        email: &str,
        new_ip: &str,
        new_secret: &str,
        new_refresh_token_hash: &str,
        expected_refresh_token_hash: &str,
    ) -> Result<Uuid, StoreError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(email).ok_or(StoreError::NotFound)?;

        if user.refresh_token_hash != expected_refresh_token_hash {
            return Err(StoreError::RotationConflict);
        }

        user.origin_ip = new_ip.to_string();
        user.signing_secret = new_secret.to_string();
        user.refresh_token_hash = new_refresh_token_hash.to_string();
        Ok(user.id)
    }
}

/// Records every notification on a channel so tests can await dispatch.
struct RecordingSink {
    tx: mpsc::UnboundedSender<(String, String)>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        let _ = self.tx.send((recipient.to_string(), subject.to_string()));
        Ok(())
    }
}

/// Always fails, to prove notification failures never reach the caller.
struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn notify(&self, _: &str, _: &str, _: &str) -> Result<(), NotifyError> {
        Err(NotifyError::SendFailed("smtp down".to_string()))
    }
}

struct TestHarness {
    store: InMemoryStore,
    service: AuthService<InMemoryStore, RecordingSink>,
    notifications: mpsc::UnboundedReceiver<(String, String)>,
}

fn harness() -> TestHarness {
    let store = InMemoryStore::default();
    let (tx, notifications) = mpsc::unbounded_channel();
    let service = AuthService::new(
        store.clone(),
        RecordingSink { tx },
        SECRET_LENGTH,
        REFRESH_TOKEN_LENGTH,
    );
    TestHarness {
        store,
        service,
        notifications,
    }
}

#[tokio::test]
async fn registration_issues_a_working_token_pair() {
    let h = harness();

    let pair = h
        .service
        .register("10.0.0.1", "a@x.com", "Sup3rSecret")
        .await
        .unwrap();

    let user = h.store.get("a@x.com").unwrap();

    // Access token verifies under the stored per-user secret.
    let claims = codec::verify(&pair.access_token, &user.signing_secret).unwrap();
    assert_eq!(claims.ip, "10.0.0.1");
    assert_eq!(claims.email, "a@x.com");

    // Refresh token travels base64-encoded and only its hash is stored.
    let raw = general_purpose::STANDARD.decode(&pair.refresh_token).unwrap();
    let raw = String::from_utf8(raw).unwrap();
    assert_eq!(raw.len(), REFRESH_TOKEN_LENGTH);
    assert!(hasher::verify_credential(&raw, &user.refresh_token_hash));

    // Password stored hashed.
    assert!(hasher::verify_credential("Sup3rSecret", &user.password_hash));
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let h = harness();

    h.service
        .register("10.0.0.1", "a@x.com", "Sup3rSecret")
        .await
        .unwrap();

    let err = h
        .service
        .register("10.0.0.2", "a@x.com", "0therSecret")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateEmail));
}

#[tokio::test]
async fn refresh_rotates_and_invalidates_the_previous_pair() {
    let h = harness();

    let first = h
        .service
        .register("10.0.0.1", "a@x.com", "Sup3rSecret")
        .await
        .unwrap();
    let old_secret = h.store.get("a@x.com").unwrap().signing_secret;

    let second = h
        .service
        .refresh(&first.access_token, &first.refresh_token, "10.0.0.1")
        .await
        .unwrap();

    assert_ne!(second.access_token, first.access_token);
    assert_ne!(second.refresh_token, first.refresh_token);

    // The signing secret rotated, so the old access token no longer
    // verifies against stored state.
    let user = h.store.get("a@x.com").unwrap();
    assert_ne!(user.signing_secret, old_secret);
    assert!(codec::verify(&first.access_token, &user.signing_secret).is_err());
    assert!(codec::verify(&second.access_token, &user.signing_secret).is_ok());

    // Replaying the consumed pair is rejected.
    let err = h
        .service
        .refresh(&first.access_token, &first.refresh_token, "10.0.0.1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidCredential));
}

#[tokio::test]
async fn forged_refresh_token_is_rejected_before_rotation() {
    let h = harness();

    let pair = h
        .service
        .register("10.0.0.1", "a@x.com", "Sup3rSecret")
        .await
        .unwrap();

    let forged = general_purpose::STANDARD.encode("A".repeat(REFRESH_TOKEN_LENGTH));
    let err = h
        .service
        .refresh(&pair.access_token, &forged, "10.0.0.1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidCredential));

    // Nothing rotated.
    let user = h.store.get("a@x.com").unwrap();
    let claims = codec::verify(&pair.access_token, &user.signing_secret).unwrap();
    assert_eq!(claims.email, "a@x.com");
}

#[tokio::test]
async fn refresh_token_in_wrong_encoding_is_a_client_error() {
    let h = harness();

    let pair = h
        .service
        .register("10.0.0.1", "a@x.com", "Sup3rSecret")
        .await
        .unwrap();

    let err = h
        .service
        .refresh(&pair.access_token, "!!not//base64!!", "10.0.0.1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MalformedRequest(_)));
}

#[tokio::test]
async fn unknown_user_is_reported_distinctly() {
    let h = harness();

    // Token claims an email with no user record behind it.
    let access_token = codec::sign("10.0.0.1", "ghost@x.com", "whatever-secret").unwrap();
    let refresh_token = general_purpose::STANDARD.encode("irrelevant");

    let err = h
        .service
        .refresh(&access_token, &refresh_token, "10.0.0.1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UserNotFound));
}

#[tokio::test]
async fn garbage_access_token_is_malformed() {
    let h = harness();

    let err = h
        .service
        .refresh("definitely-not-a-jwt", "c29tZXRoaW5n", "10.0.0.1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MalformedRequest(_)));
}

#[tokio::test]
async fn origin_mismatch_rotates_and_fires_exactly_one_notification() {
    let mut h = harness();

    // Seed a user whose stored origin differs from the ip inside their
    // (otherwise valid) access token.
    let signing_secret = "seeded-signing-secret";
    let raw_refresh = "seeded-refresh-token-material";
    h.store.insert(User {
        id: Uuid::new_v4(),
        email: "a@x.com".to_string(),
        password_hash: hasher::hash_credential("Sup3rSecret").unwrap(),
        origin_ip: "10.0.0.1".to_string(),
        signing_secret: signing_secret.to_string(),
        refresh_token_hash: hasher::hash_credential(raw_refresh).unwrap(),
    });

    let access_token = codec::sign("192.168.0.9", "a@x.com", signing_secret).unwrap();
    let refresh_token = general_purpose::STANDARD.encode(raw_refresh);

    // The mismatch does not fail the refresh.
    let pair = h
        .service
        .refresh(&access_token, &refresh_token, "192.168.0.9")
        .await
        .unwrap();
    assert!(!pair.access_token.is_empty());

    // Exactly one alert, addressed to the account owner.
    let (recipient, _) = tokio::time::timeout(Duration::from_secs(2), h.notifications.recv())
        .await
        .expect("notification was never dispatched")
        .unwrap();
    assert_eq!(recipient, "a@x.com");
    assert!(h.notifications.try_recv().is_err());

    // The live connection IP is what gets recorded.
    assert_eq!(h.store.get("a@x.com").unwrap().origin_ip, "192.168.0.9");
}

#[tokio::test]
async fn matching_origin_fires_no_notification() {
    let mut h = harness();

    let pair = h
        .service
        .register("10.0.0.1", "a@x.com", "Sup3rSecret")
        .await
        .unwrap();

    h.service
        .refresh(&pair.access_token, &pair.refresh_token, "10.0.0.1")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.notifications.try_recv().is_err());
}

#[tokio::test]
async fn notification_failure_never_fails_the_refresh() {
    let store = InMemoryStore::default();
    let service = AuthService::new(
        store.clone(),
        FailingSink,
        SECRET_LENGTH,
        REFRESH_TOKEN_LENGTH,
    );

    let signing_secret = "seeded-signing-secret";
    let raw_refresh = "seeded-refresh-token-material";
    store.insert(User {
        id: Uuid::new_v4(),
        email: "a@x.com".to_string(),
        password_hash: hasher::hash_credential("Sup3rSecret").unwrap(),
        origin_ip: "10.0.0.1".to_string(),
        signing_secret: signing_secret.to_string(),
        refresh_token_hash: hasher::hash_credential(raw_refresh).unwrap(),
    });

    let access_token = codec::sign("192.168.0.9", "a@x.com", signing_secret).unwrap();
    let refresh_token = general_purpose::STANDARD.encode(raw_refresh);

    assert!(service
        .refresh(&access_token, &refresh_token, "192.168.0.9")
        .await
        .is_ok());
}

#[tokio::test]
async fn concurrent_refreshes_rotate_exactly_once() {
    let h = harness();

    let pair = h
        .service
        .register("10.0.0.1", "a@x.com", "Sup3rSecret")
        .await
        .unwrap();
    let state_before = h.store.get("a@x.com").unwrap();

    let (left, right) = tokio::join!(
        h.service
            .refresh(&pair.access_token, &pair.refresh_token, "10.0.0.1"),
        h.service
            .refresh(&pair.access_token, &pair.refresh_token, "10.0.0.2"),
    );

    let winners = [&left, &right].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one concurrent refresh may win");

    let loser = if left.is_err() { left } else { right };
    assert!(matches!(
        loser.unwrap_err(),
        AppError::InvalidCredential | AppError::RotationConflict
    ));

    // Stored state reflects exactly one rotation.
    let state_after = h.store.get("a@x.com").unwrap();
    assert_ne!(state_after.signing_secret, state_before.signing_secret);
    assert_ne!(
        state_after.refresh_token_hash,
        state_before.refresh_token_hash
    );
}
