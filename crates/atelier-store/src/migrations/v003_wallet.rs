use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Amounts are integer cents.
CREATE TABLE IF NOT EXISTS wallets (
    user_id       TEXT PRIMARY KEY NOT NULL,  -- FK -> profiles(id)
    balance_cents INTEGER NOT NULL DEFAULT 0 CHECK (balance_cents >= 0),
    gems          INTEGER NOT NULL DEFAULT 0 CHECK (gems >= 0),
    updated_at    TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES profiles(id) ON DELETE CASCADE
);

-- Append-only ledger.
CREATE TABLE IF NOT EXISTS wallet_transactions (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    user_id      TEXT NOT NULL,
    kind         TEXT NOT NULL,               -- deposit / withdrawal / gem_purchase
    amount_cents INTEGER NOT NULL,            -- signed
    gems_delta   INTEGER NOT NULL DEFAULT 0,
    description  TEXT NOT NULL,
    created_at   TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES wallets(user_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_wallet_tx_user_ts
    ON wallet_transactions(user_id, created_at DESC);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
