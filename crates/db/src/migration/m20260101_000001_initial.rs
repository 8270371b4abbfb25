//! Initial schema: accounts, ledger operations and the hot configuration row.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(INITIAL_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            "DROP TABLE IF EXISTS hot_config, ledger_operations, accounts CASCADE;",
        )
        .await?;
        Ok(())
    }
}

const INITIAL_SQL: &str = r"
-- Accounts held by the operator. Balances never go negative.
CREATE TABLE accounts (
    id BIGSERIAL PRIMARY KEY,
    address TEXT NOT NULL,
    username TEXT,
    password_hash TEXT,
    balance BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT accounts_address_key UNIQUE (address),
    CONSTRAINT accounts_username_key UNIQUE (username),
    CONSTRAINT chk_accounts_balance_non_negative CHECK (balance >= 0)
);

-- Every applied operation; batch_number is set once the operation is settled
CREATE TABLE ledger_operations (
    id BIGSERIAL PRIMARY KEY,
    account_id BIGINT NOT NULL REFERENCES accounts(id),
    kind TEXT NOT NULL,
    value BIGINT NOT NULL,
    from_address TEXT,
    to_address TEXT,
    address TEXT,
    nonce BIGINT,
    signature TEXT,
    batch_number BIGINT,
    settled_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_ledger_operations_kind CHECK (
        kind IN ('deposit', 'transfer', 'onchain_withdrawal', 'offchain_withdrawal')
    ),
    CONSTRAINT chk_ledger_operations_value CHECK (value >= 0),
    CONSTRAINT chk_ledger_operations_settled CHECK ((batch_number IS NULL) = (settled_at IS NULL))
);

-- History lookups by account
CREATE INDEX idx_ledger_operations_account ON ledger_operations(account_id, id);

-- Pending operations per category (the settlement hot path)
CREATE INDEX idx_ledger_operations_pending ON ledger_operations(kind, id) WHERE batch_number IS NULL;

-- Last batch number per category
CREATE INDEX idx_ledger_operations_batch ON ledger_operations(kind, batch_number) WHERE batch_number IS NOT NULL;

-- Settlement periods, in milliseconds. Single row with id 1.
CREATE TABLE hot_config (
    id INTEGER PRIMARY KEY,
    deposit_period_ms BIGINT NOT NULL,
    transfer_period_ms BIGINT NOT NULL,
    onchain_withdrawal_period_ms BIGINT NOT NULL,
    offchain_withdrawal_period_ms BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_hot_config_single_row CHECK (id = 1),
    CONSTRAINT chk_hot_config_periods CHECK (
        deposit_period_ms >= 0
        AND transfer_period_ms >= 0
        AND onchain_withdrawal_period_ms >= 0
        AND offchain_withdrawal_period_ms >= 0
    )
);
";
