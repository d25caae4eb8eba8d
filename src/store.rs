use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use thiserror::Error;

use crate::models::{self, Account, AccountRow, NewAccount};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("account {0} not found")]
    NotFound(i64),
    #[error("account {0} was modified concurrently")]
    Conflict(i64),
    #[error("account number already exists")]
    Duplicate,
    #[error("balance does not fit the balance column")]
    BalanceOutOfRange,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Maps a unique index violation to [`StoreError::Duplicate`].
fn map_write_error(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return StoreError::Duplicate;
        }
    }
    StoreError::Database(err)
}

const SELECT_ACCOUNT: &str = r#"
    SELECT
        id,
        account_number,
        holder_name,
        email,
        phone_number,
        account_type,
        balance_cents,
        date_opened,
        is_active,
        version
    FROM accounts
"#;

/// Durable mapping from id to [`Account`] backed by the `accounts` table.
#[derive(Clone)]
pub struct AccountStore {
    p: Pool<Sqlite>,
}

impl AccountStore {
    pub fn new(p: Pool<Sqlite>) -> Self {
        Self { p }
    }

    /// Opens (and creates when missing) the database behind `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let p = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self::new(p))
    }

    /// Fresh in-memory database, unique per call.
    #[cfg(test)]
    pub async fn connect_test() -> Result<Self, StoreError> {
        let test_id = uuid::Uuid::new_v4().to_string();
        Self::connect(&format!("sqlite:file:memdb_{}?mode=memory&cache=shared", test_id), 1).await
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.p
    }

    /// All accounts, most recently opened first.
    pub async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "{} ORDER BY date_opened DESC, id DESC",
            SELECT_ACCOUNT
        ))
        .fetch_all(&self.p)
        .await?;
        Ok(rows.into_iter().map(Account::from).collect())
    }

    pub async fn get(&self, id: i64) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!("{} WHERE id = ?", SELECT_ACCOUNT))
            .bind(id)
            .fetch_optional(&self.p)
            .await?;
        Ok(row.map(Account::from))
    }

    /// Whether `account_number` is taken, ignoring the row `excluding_id`.
    pub async fn exists(
        &self,
        account_number: &str,
        excluding_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM accounts
            WHERE account_number = ? AND (? IS NULL OR id <> ?)
            LIMIT 1
            "#,
        )
        .bind(account_number)
        .bind(excluding_id)
        .bind(excluding_id)
        .fetch_optional(&self.p)
        .await?;
        Ok(found.is_some())
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.p)
            .await?;
        Ok(count)
    }

    /// Stores `account` and returns the assigned id. New rows start at version 1.
    pub async fn insert(&self, account: &NewAccount) -> Result<i64, StoreError> {
        let cents = models::to_cents(&account.balance).ok_or(StoreError::BalanceOutOfRange)?;
        let res = sqlx::query(
            r#"
            INSERT INTO accounts (
                account_number,
                holder_name,
                email,
                phone_number,
                account_type,
                balance_cents,
                date_opened,
                is_active,
                version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&account.account_number)
        .bind(&account.holder_name)
        .bind(&account.email)
        .bind(&account.phone_number)
        .bind(&account.account_type)
        .bind(cents)
        .bind(account.date_opened)
        .bind(account.is_active)
        .execute(&self.p)
        .await
        .map_err(map_write_error)?;

        Ok(res.last_insert_rowid())
    }

    /// Replaces every column of the row `account.id`, provided the stored row
    /// still carries `account.version`. Returns the new version.
    pub async fn update(&self, account: &Account) -> Result<i64, StoreError> {
        let cents = models::to_cents(&account.balance).ok_or(StoreError::BalanceOutOfRange)?;
        let res = sqlx::query(
            r#"
            UPDATE accounts
            SET
                account_number = ?,
                holder_name = ?,
                email = ?,
                phone_number = ?,
                account_type = ?,
                balance_cents = ?,
                date_opened = ?,
                is_active = ?,
                version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&account.account_number)
        .bind(&account.holder_name)
        .bind(&account.email)
        .bind(&account.phone_number)
        .bind(&account.account_type)
        .bind(cents)
        .bind(account.date_opened)
        .bind(account.is_active)
        .bind(account.id)
        .bind(account.version)
        .execute(&self.p)
        .await
        .map_err(map_write_error)?;

        if res.rows_affected() == 1 {
            return Ok(account.version + 1);
        }

        let still_there: Option<i64> = sqlx::query_scalar("SELECT id FROM accounts WHERE id = ?")
            .bind(account.id)
            .fetch_optional(&self.p)
            .await?;
        match still_there {
            Some(_) => Err(StoreError::Conflict(account.id)),
            None => Err(StoreError::NotFound(account.id)),
        }
    }

    /// Removes the row. Returns `false` when there was nothing to remove.
    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&self.p)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
