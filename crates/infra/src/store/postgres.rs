//! Postgres-backed role and onboarding stores.
//!
//! The store traits are synchronous, so every call bridges into the ambient
//! Tokio runtime with `block_in_place` + `Handle::block_on`. This requires a
//! multi-threaded runtime; on a current-thread runtime (or with no runtime at
//! all) calls fail with `StoreError::Unavailable` instead of panicking.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | `ColumnDecode`, `Decode`, `ColumnNotFound` | `Corrupt` |
//! | anything else (pool, IO, TLS, database) | `Unavailable` |
//!
//! Role text that does not parse is not an error: an unknown `current_role`
//! pointer reads as no pointer, and grant or onboarding rows naming an unknown
//! role are skipped with a warning. The rest of the identity's roles still
//! reconcile.

use std::future::Future;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tokio::runtime::{Handle, RuntimeFlavor};

use rolegate_auth::grants::{LegacyCapabilityFlags, RoleGrant};
use rolegate_auth::onboarding::OnboardingRecord;
use rolegate_auth::roles::Role;
use rolegate_auth::store::{OnboardingStore, RoleStore, StoreError};
use rolegate_auth::test_mode::TestModeSession;
use rolegate_core::Identity;

use super::schema;

/// Open a pool and apply the schema.
pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Create the tables if they do not exist.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    for ddl in schema::ALL {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
    }
    tracing::info!("role schema ready");
    Ok(())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("{operation}: {err}"))
        }
        other => {
            tracing::warn!(operation, error = %other, "postgres call failed");
            StoreError::Unavailable(format!("{operation}: {other}"))
        }
    }
}

fn run<T>(fut: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
    let handle = Handle::try_current()
        .map_err(|_| StoreError::unavailable("postgres store used outside a tokio runtime"))?;
    if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
        return Err(StoreError::unavailable(
            "postgres store requires a multi-threaded tokio runtime",
        ));
    }
    tokio::task::block_in_place(|| handle.block_on(fut))
}

/// Unknown pointer text reads as no pointer.
fn pointer_from_column(identity: &Identity, raw: Option<&str>) -> Option<Role> {
    let raw = raw?;
    match raw.parse::<Role>() {
        Ok(role) => Some(role),
        Err(err) => {
            tracing::warn!(identity = %identity, current_role = raw, error = %err, "ignoring unrecognised current role pointer");
            None
        }
    }
}

/// `None` means the row names an unknown role and is skipped.
fn role_from_column(identity: &Identity, table: &'static str, raw: &str) -> Option<Role> {
    match raw.parse::<Role>() {
        Ok(role) => Some(role),
        Err(err) => {
            tracing::warn!(identity = %identity, table, role = raw, error = %err, "skipping row with unrecognised role");
            None
        }
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| map_sqlx_error("decode", e))
}

#[derive(Debug, Clone)]
pub struct PostgresRoleStore {
    pool: PgPool,
}

impl PostgresRoleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Seed or replace the legacy flags row for an identity.
    pub fn put_flags(&self, identity: &Identity, flags: &LegacyCapabilityFlags) -> Result<(), StoreError> {
        run(async {
            sqlx::query(
                r#"
                INSERT INTO role_accounts (
                    identity, is_viewer, is_advertiser, is_publisher, is_admin,
                    is_stakeholder, is_developer, is_test_user, current_role
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (identity) DO UPDATE SET
                    is_viewer = EXCLUDED.is_viewer,
                    is_advertiser = EXCLUDED.is_advertiser,
                    is_publisher = EXCLUDED.is_publisher,
                    is_admin = EXCLUDED.is_admin,
                    is_stakeholder = EXCLUDED.is_stakeholder,
                    is_developer = EXCLUDED.is_developer,
                    is_test_user = EXCLUDED.is_test_user,
                    current_role = EXCLUDED.current_role
                "#,
            )
            .bind(identity.as_str())
            .bind(flags.is_viewer)
            .bind(flags.is_advertiser)
            .bind(flags.is_publisher)
            .bind(flags.is_admin)
            .bind(flags.is_stakeholder)
            .bind(flags.is_developer)
            .bind(flags.is_test_user)
            .bind(flags.current_role.map(|r| r.as_str()))
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("put_flags", e))?;
            Ok(())
        })
    }
}

fn flags_from_row(identity: &Identity, row: &PgRow) -> Result<LegacyCapabilityFlags, StoreError> {
    let current_role: Option<String> = get(row, "current_role")?;
    Ok(LegacyCapabilityFlags {
        is_viewer: get(row, "is_viewer")?,
        is_advertiser: get(row, "is_advertiser")?,
        is_publisher: get(row, "is_publisher")?,
        is_admin: get(row, "is_admin")?,
        is_stakeholder: get(row, "is_stakeholder")?,
        is_developer: get(row, "is_developer")?,
        is_test_user: get(row, "is_test_user")?,
        current_role: pointer_from_column(identity, current_role.as_deref()),
    })
}

fn grant_from_row(identity: &Identity, row: &PgRow) -> Result<Option<RoleGrant>, StoreError> {
    let role: String = get(row, "role")?;
    let Some(role) = role_from_column(identity, "role_grants", &role) else {
        return Ok(None);
    };
    Ok(Some(RoleGrant {
        identity: identity.clone(),
        role,
        is_active: get(row, "is_active")?,
        is_test_grant: get(row, "is_test_grant")?,
        granted_at: get(row, "granted_at")?,
    }))
}

/// Map rows, dropping the ones the mapper skips.
fn collect_rows<T>(
    rows: &[PgRow],
    mut map: impl FnMut(&PgRow) -> Result<Option<T>, StoreError>,
) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(item) = map(row)? {
            out.push(item);
        }
    }
    Ok(out)
}

impl RoleStore for PostgresRoleStore {
    fn load_flags(&self, identity: &Identity) -> Result<Option<LegacyCapabilityFlags>, StoreError> {
        run(async {
            let row = sqlx::query(
                r#"
                SELECT is_viewer, is_advertiser, is_publisher, is_admin,
                       is_stakeholder, is_developer, is_test_user, current_role
                FROM role_accounts
                WHERE identity = $1
                "#,
            )
            .bind(identity.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_flags", e))?;

            row.as_ref().map(|row| flags_from_row(identity, row)).transpose()
        })
    }

    fn list_grants(&self, identity: &Identity) -> Result<Vec<RoleGrant>, StoreError> {
        run(async {
            let rows = sqlx::query(
                r#"
                SELECT role, is_active, is_test_grant, granted_at
                FROM role_grants
                WHERE identity = $1
                ORDER BY role ASC
                "#,
            )
            .bind(identity.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_grants", e))?;

            collect_rows(&rows, |row| grant_from_row(identity, row))
        })
    }

    fn upsert_grant(&self, grant: RoleGrant) -> Result<(), StoreError> {
        run(async {
            sqlx::query(
                r#"
                INSERT INTO role_grants (identity, role, is_active, is_test_grant, granted_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (identity, role) DO UPDATE SET
                    is_active = EXCLUDED.is_active,
                    is_test_grant = EXCLUDED.is_test_grant,
                    granted_at = EXCLUDED.granted_at
                "#,
            )
            .bind(grant.identity.as_str())
            .bind(grant.role.as_str())
            .bind(grant.is_active)
            .bind(grant.is_test_grant)
            .bind(grant.granted_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("upsert_grant", e))?;
            Ok(())
        })
    }

    fn deactivate_grant(&self, identity: &Identity, role: Role) -> Result<bool, StoreError> {
        run(async {
            let result = sqlx::query(
                "UPDATE role_grants SET is_active = FALSE WHERE identity = $1 AND role = $2",
            )
            .bind(identity.as_str())
            .bind(role.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("deactivate_grant", e))?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn set_current_role(&self, identity: &Identity, role: Role) -> Result<(), StoreError> {
        run(async {
            sqlx::query(
                r#"
                INSERT INTO role_accounts (identity, current_role)
                VALUES ($1, $2)
                ON CONFLICT (identity) DO UPDATE SET current_role = EXCLUDED.current_role
                "#,
            )
            .bind(identity.as_str())
            .bind(role.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_current_role", e))?;
            Ok(())
        })
    }

    fn load_test_session(&self, identity: &Identity) -> Result<Option<TestModeSession>, StoreError> {
        run(async {
            let row = sqlx::query(
                "SELECT active, activated_at, expires_at FROM test_mode_sessions WHERE identity = $1",
            )
            .bind(identity.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_test_session", e))?;

            let Some(row) = row else {
                return Ok(None);
            };
            Ok(Some(TestModeSession {
                active: get(&row, "active")?,
                activated_at: get(&row, "activated_at")?,
                expires_at: get(&row, "expires_at")?,
            }))
        })
    }

    fn save_test_session(&self, identity: &Identity, session: TestModeSession) -> Result<(), StoreError> {
        run(async {
            sqlx::query(
                r#"
                INSERT INTO test_mode_sessions (identity, active, activated_at, expires_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (identity) DO UPDATE SET
                    active = EXCLUDED.active,
                    activated_at = EXCLUDED.activated_at,
                    expires_at = EXCLUDED.expires_at
                "#,
            )
            .bind(identity.as_str())
            .bind(session.active)
            .bind(session.activated_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("save_test_session", e))?;
            Ok(())
        })
    }

    fn clear_test_session(&self, identity: &Identity) -> Result<(), StoreError> {
        run(async {
            sqlx::query("DELETE FROM test_mode_sessions WHERE identity = $1")
                .bind(identity.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("clear_test_session", e))?;
            Ok(())
        })
    }
}

#[derive(Debug, Clone)]
pub struct PostgresOnboardingStore {
    pool: PgPool,
}

impl PostgresOnboardingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(identity: &Identity, row: &PgRow) -> Result<Option<OnboardingRecord>, StoreError> {
    let role: String = get(row, "role")?;
    let Some(role) = role_from_column(identity, "onboarding_progress", &role) else {
        return Ok(None);
    };
    Ok(Some(OnboardingRecord {
        identity: identity.clone(),
        role,
        current_step: get(row, "current_step")?,
        is_complete: get(row, "is_complete")?,
        completed_at: get(row, "completed_at")?,
        updated_at: get(row, "updated_at")?,
    }))
}

const ONBOARDING_COLUMNS: &str = "role, current_step, is_complete, completed_at, updated_at";

impl OnboardingStore for PostgresOnboardingStore {
    fn get(&self, identity: &Identity, role: Role) -> Result<Option<OnboardingRecord>, StoreError> {
        run(async {
            let sql = format!(
                "SELECT {ONBOARDING_COLUMNS} FROM onboarding_progress WHERE identity = $1 AND role = $2"
            );
            let row = sqlx::query(&sql)
            .bind(identity.as_str())
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("onboarding_get", e))?;

            match row {
                Some(row) => record_from_row(identity, &row),
                None => Ok(None),
            }
        })
    }

    fn upsert(&self, record: OnboardingRecord) -> Result<(), StoreError> {
        run(async {
            sqlx::query(
                r#"
                INSERT INTO onboarding_progress (
                    identity, role, current_step, is_complete, completed_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (identity, role) DO UPDATE SET
                    current_step = EXCLUDED.current_step,
                    is_complete = EXCLUDED.is_complete,
                    completed_at = EXCLUDED.completed_at,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(record.identity.as_str())
            .bind(record.role.as_str())
            .bind(record.current_step.as_deref())
            .bind(record.is_complete)
            .bind(record.completed_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("onboarding_upsert", e))?;
            Ok(())
        })
    }

    fn delete(&self, identity: &Identity, role: Role) -> Result<bool, StoreError> {
        run(async {
            let result = sqlx::query("DELETE FROM onboarding_progress WHERE identity = $1 AND role = $2")
                .bind(identity.as_str())
                .bind(role.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("onboarding_delete", e))?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn delete_all(&self, identity: &Identity) -> Result<usize, StoreError> {
        run(async {
            let result = sqlx::query("DELETE FROM onboarding_progress WHERE identity = $1")
                .bind(identity.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("onboarding_delete_all", e))?;
            Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
        })
    }

    fn list(&self, identity: &Identity) -> Result<Vec<OnboardingRecord>, StoreError> {
        run(async {
            let sql = format!(
                "SELECT {ONBOARDING_COLUMNS} FROM onboarding_progress WHERE identity = $1 ORDER BY role ASC"
            );
            let rows = sqlx::query(&sql)
            .bind(identity.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("onboarding_list", e))?;

            collect_rows(&rows, |row| record_from_row(identity, row))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_outside_a_runtime_are_unavailable() {
        let result = run(async { Ok::<_, StoreError>(()) });
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn current_thread_runtime_is_rejected() {
        let result = run(async { Ok::<_, StoreError>(()) });
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn decode_errors_map_to_corrupt() {
        let err = map_sqlx_error("decode", sqlx::Error::ColumnNotFound("role".to_string()));
        assert!(matches!(err, StoreError::Corrupt(_)));

        let err = map_sqlx_error("load_flags", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    fn identity() -> Identity {
        Identity::parse("npub_abc").unwrap()
    }

    #[test]
    fn unknown_pointer_reads_as_no_pointer() {
        let id = identity();
        assert_eq!(pointer_from_column(&id, Some("superuser")), None);
        assert_eq!(pointer_from_column(&id, None), None);
        assert_eq!(pointer_from_column(&id, Some("publisher")), Some(Role::Publisher));
    }

    #[test]
    fn unknown_grant_role_skips_the_row() {
        let id = identity();
        assert_eq!(role_from_column(&id, "role_grants", "pirate"), None);
        assert_eq!(role_from_column(&id, "role_grants", "admin"), Some(Role::Admin));
    }

    #[test]
    fn unknown_pointer_keeps_legacy_flags_in_the_union() {
        use rolegate_auth::grants::RoleSnapshot;

        let id = identity();
        let flags = LegacyCapabilityFlags {
            is_admin: true,
            current_role: pointer_from_column(&id, Some("superuser")),
            ..Default::default()
        };
        let grants: Vec<RoleGrant> = ["publisher", "pirate"]
            .into_iter()
            .filter_map(|raw| role_from_column(&id, "role_grants", raw))
            .map(|role| RoleGrant::active(id.clone(), role, chrono::Utc::now()))
            .collect();

        let snapshot = RoleSnapshot {
            flags: Some(flags),
            grants,
        };
        let available = snapshot.held_roles();
        assert!(available.contains(&Role::Admin));
        assert!(available.contains(&Role::Publisher));
        assert_eq!(snapshot.current_role(), None);
    }
}
