//! Integration tests for the credvault crate.
//!
//! These tests exercise the full store/retrieve lifecycle against both
//! backends, the error taxonomy seen by callers, and backend failure
//! propagation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use credvault::{
    BackendError, CredentialKind, CredentialVault, Envelope, KdfIterations, MemorySecretBackend,
    SecretBackend, SecretRecord, SqliteSecretBackend, VaultConfig, VaultError,
};
use tokio_util::sync::CancellationToken;

fn fast_config() -> VaultConfig {
    VaultConfig::default().with_kdf_iterations(KdfIterations::MIN)
}

fn memory_vault() -> CredentialVault<MemorySecretBackend> {
    CredentialVault::with_config(MemorySecretBackend::new(), &fast_config()).unwrap()
}

/// A backend whose every call fails, counting attempts.
#[derive(Default)]
struct FailingBackend {
    puts: AtomicUsize,
    gets: AtomicUsize,
}

#[async_trait]
impl SecretBackend for FailingBackend {
    async fn put(&self, _key: &str, _record: SecretRecord) -> Result<(), BackendError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::Unavailable("quota exceeded".into()))
    }

    async fn get(&self, _key: &str) -> Result<Option<SecretRecord>, BackendError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::Unavailable("connection refused".into()))
    }
}

/// An in-memory backend that counts writes and can fire a cancellation token
/// from inside `put`, before the write lands.
#[derive(Default)]
struct CountingBackend {
    inner: MemorySecretBackend,
    puts: AtomicUsize,
    cancel_during_put: Option<CancellationToken>,
}

#[async_trait]
impl SecretBackend for CountingBackend {
    async fn put(&self, key: &str, record: SecretRecord) -> Result<(), BackendError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(cancel) = &self.cancel_during_put {
            cancel.cancel();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.inner.put(key, record).await
    }

    async fn get(&self, key: &str) -> Result<Option<SecretRecord>, BackendError> {
        self.inner.get(key).await
    }
}

/// A backend that never answers within any reasonable timeout.
struct StalledBackend;

#[async_trait]
impl SecretBackend for StalledBackend {
    async fn put(&self, _key: &str, _record: SecretRecord) -> Result<(), BackendError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }

    async fn get(&self, _key: &str) -> Result<Option<SecretRecord>, BackendError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(None)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Round trip
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn alice_example() {
    let vault = memory_vault();

    let id = vault.store_secret("alice", "p@ss1", "master1").await.unwrap();
    assert_eq!(id, "vault-secret-alice");

    let (username, password) = vault.retrieve_secret("alice", "master1").await.unwrap();
    assert_eq!(username, "alice");
    assert_eq!(password, "p@ss1");

    let err = vault.retrieve_secret("alice", "wrong").await.unwrap_err();
    assert!(matches!(err, VaultError::InvalidMasterPassword { .. }));
}

#[tokio::test]
async fn roundtrip_for_assorted_inputs() {
    let vault = memory_vault();
    let cases = [
        ("bob@example.com", "hunter2", "correct horse battery staple"),
        ("+6591234567", "пароль", "m"),
        ("user with spaces", "pässwörd 🔐", "ünïcødé master"),
        ("50%off", "%%", "%"),
    ];

    for (username, password, master) in cases {
        vault.store_secret(username, password, master).await.unwrap();
        let (u, p) = vault.retrieve_secret(username, master).await.unwrap();
        assert_eq!((u.as_str(), p.as_str()), (username, password));
    }
}

#[tokio::test]
async fn credential_kind_reported_on_retrieve() {
    let vault = memory_vault();
    let cancel = CancellationToken::new();

    vault.store_secret("carol@example.com", "pw", "m").await.unwrap();
    vault.store_secret("6591234567", "pw", "m").await.unwrap();

    let email = vault.retrieve("carol@example.com", "m", &cancel).await.unwrap();
    let phone = vault.retrieve("6591234567", "m", &cancel).await.unwrap();
    assert_eq!(email.kind(), CredentialKind::Email);
    assert_eq!(phone.kind(), CredentialKind::Phone);
}

// ═══════════════════════════════════════════════════════════════════════
//  Salts, overwrite, isolation
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn repeated_store_uses_fresh_salt_and_ciphertext() {
    let vault = memory_vault();

    vault.store_secret("alice", "p@ss1", "master1").await.unwrap();
    let first =
        Envelope::from_record(&vault.backend().record("vault-secret-alice").unwrap()).unwrap();

    vault.store_secret("alice", "p@ss1", "master1").await.unwrap();
    let second =
        Envelope::from_record(&vault.backend().record("vault-secret-alice").unwrap()).unwrap();

    assert_ne!(first.salt, second.salt);
    assert_ne!(first.encrypted_username, second.encrypted_username);
    assert_ne!(first.encrypted_password, second.encrypted_password);
}

#[tokio::test]
async fn overwrite_replaces_previous_envelope() {
    let vault = memory_vault();

    vault.store_secret("alice", "old-password", "master1").await.unwrap();
    vault.store_secret("alice", "new-password", "master1").await.unwrap();

    assert_eq!(vault.backend().len(), 1);
    let (_, password) = vault.retrieve_secret("alice", "master1").await.unwrap();
    assert_eq!(password, "new-password");
}

#[tokio::test]
async fn overwrite_with_new_master_invalidates_old_master() {
    let vault = memory_vault();

    vault.store_secret("alice", "p1", "master-old").await.unwrap();
    vault.store_secret("alice", "p2", "master-new").await.unwrap();

    let err = vault.retrieve_secret("alice", "master-old").await.unwrap_err();
    assert!(err.is_auth_failure());

    let (_, password) = vault.retrieve_secret("alice", "master-new").await.unwrap();
    assert_eq!(password, "p2");
}

#[tokio::test]
async fn secrets_are_isolated_per_username() {
    let vault = memory_vault();

    vault.store_secret("alice", "alice-pw", "shared").await.unwrap();
    vault.store_secret("bob", "bob-pw", "shared").await.unwrap();

    let alice =
        Envelope::from_record(&vault.backend().record("vault-secret-alice").unwrap()).unwrap();
    let bob = Envelope::from_record(&vault.backend().record("vault-secret-bob").unwrap()).unwrap();
    assert_ne!(alice.salt, bob.salt);

    assert_eq!(vault.retrieve_secret("bob", "shared").await.unwrap().1, "bob-pw");
}

// ═══════════════════════════════════════════════════════════════════════
//  Error taxonomy
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn not_found_is_not_an_auth_failure() {
    let vault = memory_vault();
    vault.store_secret("alice", "p@ss1", "master1").await.unwrap();

    let err = vault.retrieve_secret("alice2", "master1").await.unwrap_err();
    assert!(matches!(
        err,
        VaultError::SecretNotFound { ref secret_id } if secret_id == "vault-secret-alice2"
    ));
}

#[tokio::test]
async fn many_wrong_masters_never_yield_plaintext() {
    let vault = memory_vault();
    vault.store_secret("alice", "p@ss1", "master1").await.unwrap();

    for wrong in ["master2", "Master1", "master1 ", "", "master"] {
        let err = vault.retrieve_secret("alice", wrong).await.unwrap_err();
        assert!(
            matches!(err, VaultError::InvalidMasterPassword { .. }),
            "unexpected error for {wrong:?}: {err}"
        );
    }
}

#[tokio::test]
async fn tampered_token_is_an_auth_failure_not_format() {
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE;

    let vault = memory_vault();
    vault.store_secret("alice", "p@ss1", "master1").await.unwrap();

    let mut record = vault.backend().record("vault-secret-alice").unwrap();
    let mut raw = URL_SAFE.decode(&record["encrypted_password"]).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0x01;
    record.insert("encrypted_password".into(), URL_SAFE.encode(raw));
    vault.backend().insert_raw("vault-secret-alice", record);

    let err = vault.retrieve_secret("alice", "master1").await.unwrap_err();
    assert!(matches!(err, VaultError::InvalidMasterPassword { .. }));
}

#[tokio::test]
async fn garbage_token_is_format_error() {
    let vault = memory_vault();
    vault.store_secret("alice", "p@ss1", "master1").await.unwrap();

    let mut record = vault.backend().record("vault-secret-alice").unwrap();
    record.insert("encrypted_username".into(), "definitely not a token".into());
    vault.backend().insert_raw("vault-secret-alice", record);

    let err = vault.retrieve_secret("alice", "master1").await.unwrap_err();
    assert!(matches!(err, VaultError::Format { .. }));
}

#[tokio::test]
async fn backend_write_failure_propagates_without_retry() {
    let backend = Arc::new(FailingBackend::default());
    let vault = CredentialVault::with_config(Arc::clone(&backend), &fast_config()).unwrap();

    let err = vault.store_secret("alice", "p@ss1", "master1").await.unwrap_err();
    match err {
        VaultError::StoreWrite { secret_id, source } => {
            assert_eq!(secret_id, "vault-secret-alice");
            assert!(source.to_string().contains("quota exceeded"));
        }
        other => panic!("expected StoreWrite, got {other:?}"),
    }
    assert_eq!(backend.puts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn backend_read_failure_is_not_not_found() {
    let backend = Arc::new(FailingBackend::default());
    let vault = CredentialVault::with_config(Arc::clone(&backend), &fast_config()).unwrap();

    let err = vault.retrieve_secret("alice", "master1").await.unwrap_err();
    assert!(matches!(err, VaultError::StoreRead { .. }));
    assert!(!err.is_not_found());
    assert!(err.is_store_failure());
    assert_eq!(backend.gets.load(Ordering::SeqCst), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  Timeouts and cancellation
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn stalled_backend_times_out() {
    let config = fast_config().with_io_timeout_ms(50);
    let vault = CredentialVault::with_config(StalledBackend, &config).unwrap();

    let err = vault.retrieve_secret("alice", "master1").await.unwrap_err();
    assert!(matches!(
        err,
        VaultError::Timeout {
            operation: "retrieve",
            timeout_ms: 50
        }
    ));

    let err = vault.store_secret("alice", "p@ss1", "master1").await.unwrap_err();
    assert!(matches!(err, VaultError::Timeout { operation: "store", .. }));
}

#[tokio::test]
async fn cancellation_interrupts_stalled_read() {
    let vault = CredentialVault::with_config(StalledBackend, &fast_config()).unwrap();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = vault.retrieve("alice", "master1", &cancel).await.unwrap_err();
    assert!(matches!(err, VaultError::Cancelled { operation: "retrieve" }));
}

#[tokio::test]
async fn cancellation_during_derivation_skips_the_write() {
    let iterations = KdfIterations::new(1_000_000).unwrap();
    let config = VaultConfig::default().with_kdf_iterations(iterations);
    let backend = Arc::new(CountingBackend::default());
    let vault = CredentialVault::with_config(Arc::clone(&backend), &config).unwrap();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        trigger.cancel();
    });

    let err = vault
        .store("alice", "p@ss1", "master1", &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Cancelled { operation: "store" }));
    assert_eq!(backend.puts.load(Ordering::SeqCst), 0);
    assert!(backend.inner.is_empty());
}

#[tokio::test]
async fn cancellation_after_write_issued_reports_success() {
    let cancel = CancellationToken::new();
    let backend = Arc::new(CountingBackend {
        cancel_during_put: Some(cancel.clone()),
        ..CountingBackend::default()
    });
    let vault = CredentialVault::with_config(Arc::clone(&backend), &fast_config()).unwrap();

    let id = vault
        .store("alice", "p@ss1", "master1", &cancel)
        .await
        .unwrap();
    assert_eq!(id.as_str(), "vault-secret-alice");
    assert!(cancel.is_cancelled());
    assert_eq!(backend.puts.load(Ordering::SeqCst), 1);

    let (_, password) = vault.retrieve_secret("alice", "master1").await.unwrap();
    assert_eq!(password, "p@ss1");
}

#[tokio::test]
async fn concurrent_operations_do_not_interfere() {
    let vault = Arc::new(memory_vault());

    let mut handles = Vec::new();
    for i in 0..8 {
        let vault = Arc::clone(&vault);
        handles.push(tokio::spawn(async move {
            let user = format!("user{i}");
            let pass = format!("pass{i}");
            let master = format!("master{i}");
            vault.store_secret(&user, &pass, &master).await.unwrap();
            let (_, got) = vault.retrieve_secret(&user, &master).await.unwrap();
            assert_eq!(got, pass);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(vault.backend().len(), 8);
}

// ═══════════════════════════════════════════════════════════════════════
//  SQLite backend
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn sqlite_vault_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("credvault.db");
    let config = fast_config().with_database_path(&db_path);

    {
        let backend = SqliteSecretBackend::open(&config.database_path).unwrap();
        let vault = CredentialVault::with_config(backend, &config).unwrap();
        vault.store_secret("alice", "p@ss1", "master1").await.unwrap();
    }

    let backend = SqliteSecretBackend::open(&config.database_path).unwrap();
    let vault = CredentialVault::with_config(backend, &config).unwrap();

    let (username, password) = vault.retrieve_secret("alice", "master1").await.unwrap();
    assert_eq!((username.as_str(), password.as_str()), ("alice", "p@ss1"));

    let err = vault.retrieve_secret("alice", "wrong").await.unwrap_err();
    assert!(matches!(err, VaultError::InvalidMasterPassword { .. }));

    assert!(db_path.exists());
}

#[tokio::test]
async fn sqlite_overwrite_keeps_single_row() {
    let backend = SqliteSecretBackend::open_in_memory().unwrap();
    let vault = CredentialVault::with_config(backend.clone(), &fast_config()).unwrap();

    vault.store_secret("alice", "one", "m").await.unwrap();
    vault.store_secret("alice", "two", "m").await.unwrap();

    assert_eq!(backend.count().await.unwrap(), 1);
    assert_eq!(vault.retrieve_secret("alice", "m").await.unwrap().1, "two");
}

#[tokio::test]
async fn sqlite_corrupt_row_is_format_error_not_store_failure() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("credvault.db");

    let backend = SqliteSecretBackend::open(&db_path).unwrap();
    let vault = CredentialVault::with_config(backend, &fast_config()).unwrap();
    vault.store_secret("alice", "p@ss1", "m").await.unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute(
        "UPDATE secrets SET record = ?1 WHERE secret_id = ?2",
        rusqlite::params![r#"{"salt": 1}"#, "vault-secret-alice"],
    )
    .unwrap();
    drop(conn);

    let err = vault.retrieve_secret("alice", "m").await.unwrap_err();
    assert!(matches!(err, VaultError::Format { .. }), "got {err:?}");
    assert!(!err.is_store_failure());
    assert!(!err.is_auth_failure());
}
