//! DDL applied by [`super::migrate`]. Every statement is idempotent.

pub const CREATE_ROLE_ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS role_accounts (
    identity       TEXT PRIMARY KEY,
    is_viewer      BOOLEAN NOT NULL DEFAULT TRUE,
    is_advertiser  BOOLEAN NOT NULL DEFAULT FALSE,
    is_publisher   BOOLEAN NOT NULL DEFAULT FALSE,
    is_admin       BOOLEAN NOT NULL DEFAULT FALSE,
    is_stakeholder BOOLEAN NOT NULL DEFAULT FALSE,
    is_developer   BOOLEAN NOT NULL DEFAULT FALSE,
    is_test_user   BOOLEAN NOT NULL DEFAULT FALSE,
    current_role   TEXT NULL
)
"#;

pub const CREATE_ROLE_GRANTS: &str = r#"
CREATE TABLE IF NOT EXISTS role_grants (
    identity      TEXT NOT NULL,
    role          TEXT NOT NULL,
    is_active     BOOLEAN NOT NULL,
    is_test_grant BOOLEAN NOT NULL DEFAULT FALSE,
    granted_at    TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (identity, role)
)
"#;

pub const CREATE_TEST_MODE_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS test_mode_sessions (
    identity     TEXT PRIMARY KEY,
    active       BOOLEAN NOT NULL,
    activated_at TIMESTAMPTZ NOT NULL,
    expires_at   TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_ONBOARDING_PROGRESS: &str = r#"
CREATE TABLE IF NOT EXISTS onboarding_progress (
    identity     TEXT NOT NULL,
    role         TEXT NOT NULL,
    current_step TEXT NULL,
    is_complete  BOOLEAN NOT NULL DEFAULT FALSE,
    completed_at TIMESTAMPTZ NULL,
    updated_at   TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (identity, role)
)
"#;

pub const ALL: [&str; 4] = [
    CREATE_ROLE_ACCOUNTS,
    CREATE_ROLE_GRANTS,
    CREATE_TEST_MODE_SESSIONS,
    CREATE_ONBOARDING_PROGRESS,
];
