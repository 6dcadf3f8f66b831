//! SQL schema for the SQLite store.
//!
//! Executed once at connection startup. Uniqueness rules that the pipeline
//! relies on for duplicate suppression live here as indexes.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS tenants (
    tenant_id        TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    specialty        TEXT,
    default_language TEXT NOT NULL,
    ai_config        TEXT NOT NULL,   -- JSON-encoded AiConfig
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS channel_accounts (
    channel_account_id  TEXT PRIMARY KEY,
    tenant_id           TEXT NOT NULL REFERENCES tenants(tenant_id),
    channel_type        TEXT NOT NULL,
    external_account_id TEXT NOT NULL,
    credentials         TEXT NOT NULL,   -- JSON-encoded ChannelCredentials
    active              INTEGER NOT NULL DEFAULT 1,
    created_at          TEXT NOT NULL,
    UNIQUE (channel_type, external_account_id)
);

CREATE TABLE IF NOT EXISTS customers (
    customer_id       TEXT PRIMARY KEY,
    tenant_id         TEXT NOT NULL REFERENCES tenants(tenant_id),
    display_name      TEXT,
    profile_image_url TEXT,
    language          TEXT,
    country           TEXT,
    tags              TEXT NOT NULL DEFAULT '[]',
    metadata          TEXT NOT NULL DEFAULT '{}',
    created_at        TEXT NOT NULL
);

-- One row per channel identity; the pair is the identity anchor.
CREATE TABLE IF NOT EXISTS customer_channels (
    customer_channel_id TEXT PRIMARY KEY,
    customer_id         TEXT NOT NULL REFERENCES customers(customer_id),
    channel_account_id  TEXT NOT NULL REFERENCES channel_accounts(channel_account_id),
    channel_user_id     TEXT NOT NULL,
    channel_username    TEXT,
    created_at          TEXT NOT NULL,
    UNIQUE (channel_account_id, channel_user_id)
);

CREATE TABLE IF NOT EXISTS conversations (
    conversation_id   TEXT PRIMARY KEY,
    customer_id       TEXT NOT NULL REFERENCES customers(customer_id),
    tenant_id         TEXT NOT NULL REFERENCES tenants(tenant_id),
    status            TEXT NOT NULL,   -- active|waiting|escalated|resolved|open
    ai_enabled        INTEGER NOT NULL DEFAULT 1,
    assigned_agent_id TEXT,
    last_message_at   TEXT,
    created_at        TEXT NOT NULL
);

-- At most one live thread per (customer, tenant).
CREATE UNIQUE INDEX IF NOT EXISTS conversations_open_idx
    ON conversations(customer_id, tenant_id) WHERE status != 'resolved';

CREATE TABLE IF NOT EXISTS messages (
    message_id          TEXT PRIMARY KEY,
    conversation_id     TEXT NOT NULL REFERENCES conversations(conversation_id),
    direction           TEXT NOT NULL,
    sender_type         TEXT NOT NULL,
    content             TEXT NOT NULL,
    content_type        TEXT NOT NULL,
    media_url           TEXT,
    original_language   TEXT,
    translated_content  TEXT,
    translated_language TEXT,
    ai_confidence       REAL,
    ai_model            TEXT,
    status              TEXT NOT NULL,
    external_id         TEXT,
    created_at          TEXT NOT NULL
);

-- One row per logical channel event.
CREATE UNIQUE INDEX IF NOT EXISTS messages_external_idx
    ON messages(conversation_id, direction, external_id)
    WHERE external_id IS NOT NULL;

CREATE INDEX IF NOT EXISTS messages_conversation_idx
    ON messages(conversation_id, created_at);

CREATE TABLE IF NOT EXISTS escalations (
    escalation_id   TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(conversation_id),
    message_id      TEXT REFERENCES messages(message_id),
    reason          TEXT NOT NULL,
    ai_confidence   REAL,
    priority        TEXT NOT NULL,
    status          TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

-- At most one escalation per triggering message.
CREATE UNIQUE INDEX IF NOT EXISTS escalations_message_idx
    ON escalations(message_id) WHERE message_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS knowledge_documents (
    document_id TEXT PRIMARY KEY,
    tenant_id   TEXT NOT NULL REFERENCES tenants(tenant_id),
    name        TEXT NOT NULL,
    description TEXT,
    content     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

-- Derived from documents; regenerated wholesale, never edited.
CREATE TABLE IF NOT EXISTS knowledge_chunks (
    chunk_id    TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES knowledge_documents(document_id) ON DELETE CASCADE,
    tenant_id   TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    content     TEXT NOT NULL,
    embedding   TEXT NOT NULL   -- JSON array of f32
);

CREATE INDEX IF NOT EXISTS knowledge_chunks_tenant_idx ON knowledge_chunks(tenant_id);

-- Short-TTL distributed locks; expires_at is unix millis.
CREATE TABLE IF NOT EXISTS locks (
    key        TEXT PRIMARY KEY,
    token      TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS kv_cache (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

PRAGMA user_version = 1;
";
