//! # Client Credit Ledger
//!
//! Clients, their debt (nasiya) and cashback bonus, plus drawer expenses.
//!
//! ## Balance Sign
//! ```text
//!   balance < 0   client owes the store        (debt_due_date set)
//!   balance = 0   settled                      (debt_due_date cleared)
//!   balance > 0   client paid in advance
//! ```
//!
//! ## Payment Rows
//! ```text
//! ┌──────────────────────┬─────────────────┬──────────┬──────────────────────┐
//! │ Operation            │ amount          │ method   │ counts in shift cash │
//! ├──────────────────────┼─────────────────┼──────────┼──────────────────────┤
//! │ record_payment       │ +amount         │ tender   │ yes (window, > 0)    │
//! │ grant_debt           │ −amount         │ debt     │ no                   │
//! └──────────────────────┴─────────────────┴──────────┴──────────────────────┘
//! ```
//!
//! Every balance write opens with `ClientRepository::touch` so the client row
//! is write-locked before its balances are read.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use kassa_core::validation::{normalize_phone, validate_name, validate_positive_amount};
use kassa_core::{
    Actor, Capability, Client, CoreError, CreditAccount, Expense, Money, Payment, PaymentMethod,
    Sale, ValidationError,
};
use kassa_db::{ClientRepository, ExpenseRepository, PaymentRepository};

use crate::error::PosResult;
use crate::events::{NotificationKind, PosEvent, Recipient};
use crate::{clean_note, ServiceContext};

// =============================================================================
// Request / Result Types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClient {
    pub name: String,
    pub phone: Option<String>,
}

impl NewClient {
    pub fn new(name: impl Into<String>) -> Self {
        NewClient {
            name: name.into(),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

/// A payment row and the client as it stands after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceChange {
    pub payment: Payment,
    pub client: Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientHistory {
    pub client: Client,
    pub sales: Vec<Sale>,
    pub payments: Vec<Payment>,
}

// =============================================================================
// Credit Ledger Service
// =============================================================================

#[derive(Clone)]
pub struct CreditLedger {
    ctx: ServiceContext,
}

impl CreditLedger {
    pub(crate) fn new(ctx: ServiceContext) -> Self {
        CreditLedger { ctx }
    }

    pub async fn create_client(&self, actor: &Actor, new: NewClient) -> PosResult<Client> {
        self.ctx.ensure_open()?;
        actor.require(Capability::ManageClients)?;

        let now = Utc::now();
        let client = Client {
            id: Uuid::new_v4().to_string(),
            name: validate_name("name", &new.name)?,
            phone: normalize_phone(new.phone.as_deref())?,
            balance_tiyin: 0,
            bonus_balance_tiyin: 0,
            debt_due_date: None,
            created_at: now,
            updated_at: now,
        };
        let client_ref = &client;

        self.ctx
            .retry("create_client", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                ClientRepository::insert(&mut tx, client_ref).await?;
                tx.commit().await.map_err(kassa_db::DbError::from)?;
                Ok(())
            })
            .await?;

        info!(client_id = %client.id, name = %client.name, "Client created");
        self.ctx
            .events
            .publish(PosEvent::audit(actor, "client.create", client.name.clone()));
        Ok(client)
    }

    /// Money received from a client towards their balance.
    pub async fn record_payment(
        &self,
        actor: &Actor,
        client_id: &str,
        amount: Money,
        method: PaymentMethod,
        note: Option<&str>,
    ) -> PosResult<BalanceChange> {
        self.ctx.ensure_open()?;
        actor.require(Capability::CollectPayment)?;
        validate_positive_amount("amount", amount)?;
        if !matches!(
            method,
            PaymentMethod::Cash | PaymentMethod::Card | PaymentMethod::Transfer
        ) {
            return Err(ValidationError::InvalidFormat {
                field: "method".to_string(),
                reason: "must be cash, card or transfer".to_string(),
            }
            .into());
        }
        let note = clean_note(note);
        let note = note.as_deref();
        let shift_id = self.open_shift_id(actor).await?;
        let shift_id = shift_id.as_deref();

        let change = self
            .ctx
            .retry("record_payment", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                let client = lock_client(&mut tx, client_id).await?;

                let mut account = CreditAccount::from(&client);
                account.settle(amount);
                ClientRepository::save_balances(&mut tx, client_id, &account).await?;

                let payment = new_payment(client_id, amount, method, shift_id, actor, note);
                PaymentRepository::insert(&mut tx, &payment).await?;
                let client = fetch_client(&mut tx, client_id).await?;

                tx.commit().await.map_err(kassa_db::DbError::from)?;
                Ok(BalanceChange { payment, client })
            })
            .await?;

        info!(
            client_id = %client_id,
            amount = %amount,
            method = method.as_str(),
            balance = %change.client.balance(),
            "Client payment recorded"
        );
        self.ctx.events.publish_all([
            PosEvent::notify(
                Recipient::Client(client_id.to_string()),
                NotificationKind::DebtPayment {
                    amount,
                    balance: change.client.balance(),
                },
            ),
            PosEvent::audit(
                actor,
                "client.payment",
                format!("{} {} ({})", change.client.name, amount, method.as_str()),
            ),
        ]);
        Ok(change)
    }

    /// Debt recorded outside a sale, e.g. goods taken earlier on paper credit.
    pub async fn grant_debt(
        &self,
        actor: &Actor,
        client_id: &str,
        amount: Money,
        due_date: Option<NaiveDate>,
        note: Option<&str>,
    ) -> PosResult<BalanceChange> {
        self.ctx.ensure_open()?;
        actor.require(Capability::GrantDebt)?;
        validate_positive_amount("amount", amount)?;
        let note = clean_note(note);
        let note = note.as_deref();
        let shift_id = self.open_shift_id(actor).await?;
        let shift_id = shift_id.as_deref();

        let change = self
            .ctx
            .retry("grant_debt", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                let client = lock_client(&mut tx, client_id).await?;

                let mut account = CreditAccount::from(&client);
                account.grant_debt(amount, self.ctx.debt_terms(Utc::now().date_naive()), due_date);
                ClientRepository::save_balances(&mut tx, client_id, &account).await?;

                let payment =
                    new_payment(client_id, -amount, PaymentMethod::Debt, shift_id, actor, note);
                PaymentRepository::insert(&mut tx, &payment).await?;
                let client = fetch_client(&mut tx, client_id).await?;

                tx.commit().await.map_err(kassa_db::DbError::from)?;
                Ok(BalanceChange { payment, client })
            })
            .await?;

        info!(
            client_id = %client_id,
            amount = %amount,
            balance = %change.client.balance(),
            due_date = ?change.client.debt_due_date,
            "Debt granted"
        );
        self.ctx.events.publish(PosEvent::audit(
            actor,
            "client.debt_grant",
            format!("{} {}", change.client.name, amount),
        ));
        Ok(change)
    }

    /// Cash taken out of the drawer.
    pub async fn record_expense(
        &self,
        actor: &Actor,
        amount: Money,
        category: &str,
        note: Option<&str>,
    ) -> PosResult<Expense> {
        self.ctx.ensure_open()?;
        actor.require(Capability::RecordExpense)?;
        validate_positive_amount("amount", amount)?;
        let category = validate_name("category", category)?;

        let expense = Expense {
            id: Uuid::new_v4().to_string(),
            amount_tiyin: amount.tiyin(),
            category,
            note: clean_note(note),
            created_by: actor.id.clone(),
            shift_id: self.open_shift_id(actor).await?,
            created_at: Utc::now(),
        };
        let expense_ref = &expense;

        self.ctx
            .retry("record_expense", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                ExpenseRepository::insert(&mut tx, expense_ref).await?;
                tx.commit().await.map_err(kassa_db::DbError::from)?;
                Ok(())
            })
            .await?;

        info!(expense_id = %expense.id, amount = %amount, category = %expense.category, "Expense recorded");
        self.ctx.events.publish(PosEvent::audit(
            actor,
            "expense.record",
            format!("{} {}", expense.category, amount),
        ));
        Ok(expense)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Client with their latest sales and payments, newest first.
    pub async fn client_history(&self, client_id: &str, limit: u32) -> PosResult<ClientHistory> {
        let client = self
            .ctx
            .db
            .clients()
            .get_by_id(client_id)
            .await?
            .ok_or_else(|| CoreError::ClientNotFound(client_id.to_string()))?;
        let sales = self.ctx.db.sales().list_for_client(client_id, limit).await?;
        let payments = self.ctx.db.payments().list_for_client(client_id, limit).await?;
        Ok(ClientHistory {
            client,
            sales,
            payments,
        })
    }

    pub async fn search(&self, query: &str, limit: u32) -> PosResult<Vec<Client>> {
        Ok(self.ctx.db.clients().search(query, limit).await?)
    }

    /// Clients with a negative balance.
    pub async fn debtors(&self) -> PosResult<Vec<Client>> {
        Ok(self.ctx.db.clients().list_debtors().await?)
    }

    /// Read before the transaction starts; a shift closing concurrently
    /// only affects the tag.
    async fn open_shift_id(&self, actor: &Actor) -> PosResult<Option<String>> {
        Ok(self
            .ctx
            .db
            .shifts()
            .current_for(&actor.id)
            .await?
            .map(|shift| shift.id))
    }
}

/// First write of a balance transaction.
async fn lock_client(conn: &mut SqliteConnection, client_id: &str) -> PosResult<Client> {
    if !ClientRepository::touch(&mut *conn, client_id).await? {
        return Err(CoreError::ClientNotFound(client_id.to_string()).into());
    }
    fetch_client(conn, client_id).await
}

async fn fetch_client(conn: &mut SqliteConnection, client_id: &str) -> PosResult<Client> {
    Ok(ClientRepository::fetch(conn, client_id)
        .await?
        .ok_or_else(|| CoreError::ClientNotFound(client_id.to_string()))?)
}

fn new_payment(
    client_id: &str,
    amount: Money,
    method: PaymentMethod,
    shift_id: Option<&str>,
    actor: &Actor,
    note: Option<&str>,
) -> Payment {
    Payment {
        id: Uuid::new_v4().to_string(),
        client_id: client_id.to_string(),
        amount_tiyin: amount.tiyin(),
        method,
        shift_id: shift_id.map(str::to_string),
        created_by: actor.id.clone(),
        note: note.map(str::to_string),
        created_at: Utc::now(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
