//! Database initialization, schema setup and lookups shared by the routes.

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use aurora_db::{Aurora, FieldType};
use chrono::{DateTime, Utc};

use crate::config::SeedClient;

/// Initialize the Aurora database with all collections.
pub fn init_database(db_path: &str) -> anyhow::Result<Aurora> {
    let db = Aurora::open(db_path)
        .map_err(|e| anyhow::anyhow!("failed to open database at {db_path}: {e}"))?;

    // Collections may already exist from a previous run.
    let _ = db.new_collection(
        "clients",
        vec![
            ("client_id", FieldType::String, true),
            ("api_key_hash", FieldType::String, false),
            ("created_at", FieldType::String, false),
        ],
    );

    let _ = db.new_collection(
        "sessions",
        vec![
            ("token_hash", FieldType::String, true),
            ("client_id", FieldType::String, false),
            ("created_at", FieldType::String, false),
            ("expires_at", FieldType::String, false),
            ("revoked", FieldType::String, false),
        ],
    );

    let _ = db.new_collection(
        "documents",
        vec![
            ("id", FieldType::String, true),
            ("folder_id", FieldType::String, false),
            ("name", FieldType::String, false),
            ("mime_type", FieldType::String, false),
            ("content", FieldType::String, false),
            ("created_at", FieldType::String, false),
        ],
    );

    Ok(db)
}

/// Register `seed` unless a client with that id already exists.
pub async fn seed_client(db: &Aurora, seed: &SeedClient) -> anyhow::Result<()> {
    let existing = db
        .query("clients")
        .filter(|f| f.eq("client_id", seed.client_id.clone()))
        .collect()
        .await
        .map_err(|e| anyhow::anyhow!("query clients: {e}"))?;
    if !existing.is_empty() {
        tracing::debug!("Seed client '{}' already registered", seed.client_id);
        return Ok(());
    }

    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let api_key_hash = Argon2::default()
        .hash_password(seed.api_key.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("hash api key: {e}"))?
        .to_string();

    db.insert_into(
        "clients",
        vec![
            ("client_id", seed.client_id.clone().into()),
            ("api_key_hash", api_key_hash.into()),
            ("created_at", Utc::now().to_rfc3339().into()),
        ],
    )
    .await
    .map_err(|e| anyhow::anyhow!("insert seed client: {e}"))?;

    tracing::info!("Registered seed client '{}'", seed.client_id);
    Ok(())
}

/// A stored session is usable while not revoked and not past its expiry.
pub fn session_is_live(revoked: &str, expires_at: &str, now: DateTime<Utc>) -> bool {
    if revoked == "true" {
        return false;
    }
    DateTime::parse_from_rfc3339(expires_at)
        .map(|expires| now < expires.with_timezone(&Utc))
        .unwrap_or(false)
}
