//! # Client Repository
//!
//! Client rows and their two mutable balances. Balance arithmetic lives in
//! `kassa_core::ledger`; this module loads and stores the result inside the
//! caller's transaction.
//!
//! ## Read-Modify-Write Under the Write Lock
//! ```text
//! tx: touch(client)            ← write first: takes the database write lock
//!     fetch(client)            ← nobody else can change it now
//!     CreditAccount::settle()  ← pure arithmetic
//!     save_balances(client)
//!     commit
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kassa_core::{Client, CreditAccount};

#[derive(Debug, Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
}

impl ClientRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ClientRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Client>> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(client)
    }

    /// Name or phone substring search.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Client>> {
        let pattern = format!("%{}%", query.trim());
        let clients = sqlx::query_as::<_, Client>(
            r#"
            SELECT * FROM clients
            WHERE name LIKE ?1 OR phone LIKE ?1
            ORDER BY name
            LIMIT ?2
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(clients)
    }

    /// Clients who owe the store, largest debt first.
    pub async fn list_debtors(&self) -> DbResult<Vec<Client>> {
        let clients = sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE balance_tiyin < 0 ORDER BY balance_tiyin, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(clients)
    }

    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Client>> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(client)
    }

    pub async fn insert(conn: &mut SqliteConnection, client: &Client) -> DbResult<()> {
        debug!(id = %client.id, name = %client.name, "Inserting client");

        sqlx::query(
            r#"
            INSERT INTO clients (
                id, name, phone, balance_tiyin, bonus_balance_tiyin,
                debt_due_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&client.id)
        .bind(&client.name)
        .bind(&client.phone)
        .bind(client.balance_tiyin)
        .bind(client.bonus_balance_tiyin)
        .bind(client.debt_due_date)
        .bind(client.created_at)
        .bind(client.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Bumps `updated_at`. Used as the opening write of a transaction that
    /// will read-modify-write this client. `false` when the client is missing.
    pub async fn touch(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE clients SET updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn save_balances(
        conn: &mut SqliteConnection,
        id: &str,
        account: &CreditAccount,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE clients SET
                balance_tiyin = ?2,
                bonus_balance_tiyin = ?3,
                debt_due_date = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(account.balance.tiyin())
        .bind(account.bonus_balance.tiyin())
        .bind(account.debt_due_date)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Client", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{client, memory_db};
    use chrono::NaiveDate;
    use kassa_core::Money;

    #[tokio::test]
    async fn test_save_balances_round_trip() {
        let db = memory_db().await;
        let c = client("Bobur");
        let mut conn = db.pool().acquire().await.unwrap();
        ClientRepository::insert(&mut conn, &c).await.unwrap();

        assert!(ClientRepository::touch(&mut conn, &c.id).await.unwrap());
        assert!(!ClientRepository::touch(&mut conn, "missing").await.unwrap());

        let due = NaiveDate::from_ymd_opt(2026, 11, 18).unwrap();
        let account = CreditAccount {
            balance: Money::from_som(-50_000),
            bonus_balance: Money::from_som(1_000),
            debt_due_date: Some(due),
        };
        ClientRepository::save_balances(&mut conn, &c.id, &account).await.unwrap();
        drop(conn);

        let stored = db.clients().get_by_id(&c.id).await.unwrap().unwrap();
        assert_eq!(stored.balance(), Money::from_som(-50_000));
        assert_eq!(stored.bonus_balance(), Money::from_som(1_000));
        assert_eq!(stored.debt_due_date, Some(due));
        assert_eq!(db.clients().list_debtors().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_negative_bonus_rejected_by_schema() {
        let db = memory_db().await;
        let c = client("Malika");
        let mut conn = db.pool().acquire().await.unwrap();
        ClientRepository::insert(&mut conn, &c).await.unwrap();

        let account = CreditAccount {
            balance: Money::zero(),
            bonus_balance: Money::from_tiyin(-1),
            debt_due_date: None,
        };
        let err = ClientRepository::save_balances(&mut conn, &c.id, &account)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }
}
