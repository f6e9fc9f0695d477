//! Startup wiring: backend selection and token verification.

use crate::config::{AuthConfig, DatabaseConfig};
use anyhow::Context;
use rsvp_core::environment::SystemClock;
use rsvp_core::store::{RecordStore, StoreError};
use rsvp_postgres::PostgresStore;
use rsvp_runtime::{BackendSelector, MemoryStore, Registry};
use rsvp_web::{SharedVerifier, StaticTokenVerifier, TrustedSubjectVerifier};
use std::sync::Arc;

/// Open the fallback store, then settle on a backend.
///
/// The primary store is tried only when a database URL is configured and the
/// fallback is not forced. A primary that cannot be reached within the
/// connect timeout is logged and skipped; it never fails startup.
///
/// # Errors
///
/// Returns an error if the fallback data directory cannot be loaded.
pub async fn build_registry(config: &DatabaseConfig) -> anyhow::Result<Registry> {
    let fallback: Arc<dyn RecordStore> = match &config.fallback_dir {
        Some(dir) => Arc::new(
            MemoryStore::open(dir)
                .await
                .with_context(|| format!("loading fallback store from {}", dir.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };

    let selector = match (&config.url, config.wants_primary()) {
        (Some(url), true) => {
            let max_connections = config.max_connections;
            let timeout = config.connect_timeout();
            BackendSelector::initialize(
                fallback,
                async move {
                    let store = PostgresStore::connect(url, max_connections, timeout).await?;
                    store.migrate().await?;
                    Ok::<_, StoreError>(Arc::new(store) as Arc<dyn RecordStore>)
                },
                timeout,
            )
            .await
        }
        _ => BackendSelector::fallback_only(fallback),
    };

    Ok(Registry::new(Arc::new(selector), Arc::new(SystemClock)))
}

/// Build the token verifier described by `config`.
///
/// # Errors
///
/// Returns an error if `AUTH_TOKENS` is malformed.
pub fn build_verifier(config: &AuthConfig) -> anyhow::Result<SharedVerifier> {
    if config.trust_subject {
        tracing::warn!("Bearer values are trusted as user ids");
        return Ok(Arc::new(TrustedSubjectVerifier));
    }

    let verifier = StaticTokenVerifier::parse(&config.tokens)
        .map_err(anyhow::Error::msg)
        .context("parsing AUTH_TOKENS")?;
    if verifier.is_empty() {
        tracing::warn!("No bearer tokens configured; authenticated routes will reject every request");
    }
    Ok(Arc::new(verifier))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rsvp_runtime::BackendMode;
    use rsvp_web::TokenVerifier;

    #[tokio::test]
    async fn test_without_database_url_uses_fallback() {
        let config = Config::from_lookup(|_| None);
        let registry = build_registry(&config.database).await.unwrap();
        assert_eq!(registry.mode(), BackendMode::Fallback);
    }

    #[tokio::test]
    async fn test_unreachable_database_falls_back() {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://nobody@127.0.0.1:1/none".to_string()),
            "DATABASE_CONNECT_TIMEOUT" => Some("1".to_string()),
            _ => None,
        });
        let registry = build_registry(&config.database).await.unwrap();
        assert_eq!(registry.mode(), BackendMode::Fallback);
    }

    #[tokio::test]
    async fn test_fallback_directory_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().into_owned();
        let config = Config::from_lookup(|key| (key == "FALLBACK_DATA_DIR").then(|| path.clone()));

        let first = build_registry(&config.database).await.unwrap();
        let user = first
            .users
            .create(rsvp_core::types::User::new(
                "Ada",
                "ada@example.com",
                "password123",
                chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            ))
            .await
            .unwrap();

        let second = build_registry(&config.database).await.unwrap();
        let reloaded = second.users.find_by_id(user.id).await.unwrap();
        assert_eq!(reloaded, Some(user));
    }

    #[test]
    fn test_verifier_selection() {
        let config = Config::from_lookup(|key| {
            (key == "AUTH_TOKENS").then(|| "broken".to_string())
        });
        assert!(build_verifier(&config.auth).is_err());

        let trusted = Config::from_lookup(|key| {
            (key == "AUTH_TRUST_SUBJECT").then(|| "true".to_string())
        });
        let verifier = build_verifier(&trusted.auth).unwrap();
        let user = rsvp_core::types::UserId::new();
        assert_eq!(verifier.verify(&user.to_string()), Some(user));
    }
}
