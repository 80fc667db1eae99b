//! # Actors and Capabilities
//!
//! The identity behind every mutating call. Authentication happens outside
//! this workspace; callers hand in an [`Actor`] and each service checks the
//! one [`Capability`] it needs at its boundary.
//!
//! ## Role Matrix
//! ```text
//! ┌───────────────────┬───────┬─────────┬─────────┬───────────┐
//! │ Capability        │ Admin │ Manager │ Cashier │ Warehouse │
//! ├───────────────────┼───────┼─────────┼─────────┼───────────┤
//! │ Sell              │   ✓   │    ✓    │    ✓    │           │
//! │ Refund            │   ✓   │    ✓    │         │           │
//! │ ManageShift       │   ✓   │    ✓    │    ✓    │           │
//! │ ManageAnyShift    │   ✓   │         │         │           │
//! │ ManageClients     │   ✓   │    ✓    │    ✓    │           │
//! │ CollectPayment    │   ✓   │    ✓    │    ✓    │           │
//! │ GrantDebt         │   ✓   │    ✓    │         │           │
//! │ RecordExpense     │   ✓   │    ✓    │    ✓    │           │
//! │ Restock           │   ✓   │    ✓    │         │     ✓     │
//! │ AdjustStock       │   ✓   │    ✓    │         │     ✓     │
//! │ ManageSuppliers   │   ✓   │    ✓    │         │     ✓     │
//! │ EditProducts      │   ✓   │    ✓    │         │     ✓     │
//! └───────────────────┴───────┴─────────┴─────────┴───────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

/// Staff role as issued by the external auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Cashier,
    Warehouse,
}

/// A single permission checked at an operation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Sell,
    Refund,
    ManageShift,
    /// Close a shift that belongs to another cashier.
    ManageAnyShift,
    ManageClients,
    CollectPayment,
    GrantDebt,
    RecordExpense,
    Restock,
    AdjustStock,
    ManageSuppliers,
    EditProducts,
}

impl Capability {
    /// Stable machine code, e.g. for permission tables kept elsewhere.
    pub fn code(&self) -> &'static str {
        match self {
            Capability::Sell => "sale.create",
            Capability::Refund => "sale.refund",
            Capability::ManageShift => "shift.manage",
            Capability::ManageAnyShift => "shift.manage_any",
            Capability::ManageClients => "client.manage",
            Capability::CollectPayment => "client.payment",
            Capability::GrantDebt => "client.debt",
            Capability::RecordExpense => "expense.create",
            Capability::Restock => "stock.restock",
            Capability::AdjustStock => "stock.adjust",
            Capability::ManageSuppliers => "supplier.manage",
            Capability::EditProducts => "product.edit",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Capability::Sell => "create sales",
            Capability::Refund => "refund sales",
            Capability::ManageShift => "open or close shifts",
            Capability::ManageAnyShift => "close other cashiers' shifts",
            Capability::ManageClients => "manage clients",
            Capability::CollectPayment => "collect client payments",
            Capability::GrantDebt => "grant client debt",
            Capability::RecordExpense => "record expenses",
            Capability::Restock => "restock products",
            Capability::AdjustStock => "adjust stock",
            Capability::ManageSuppliers => "manage suppliers",
            Capability::EditProducts => "edit products",
        };
        f.write_str(text)
    }
}

impl Role {
    /// The capability set granted to this role.
    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Admin => &[
                Sell,
                Refund,
                ManageShift,
                ManageAnyShift,
                ManageClients,
                CollectPayment,
                GrantDebt,
                RecordExpense,
                Restock,
                AdjustStock,
                ManageSuppliers,
                EditProducts,
            ],
            Role::Manager => &[
                Sell,
                Refund,
                ManageShift,
                ManageClients,
                CollectPayment,
                GrantDebt,
                RecordExpense,
                Restock,
                AdjustStock,
                ManageSuppliers,
                EditProducts,
            ],
            Role::Cashier => &[
                Sell,
                ManageShift,
                ManageClients,
                CollectPayment,
                RecordExpense,
            ],
            Role::Warehouse => &[Restock, AdjustStock, ManageSuppliers, EditProducts],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Cashier => "cashier",
            Role::Warehouse => "warehouse",
        }
    }
}

/// An authenticated staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Actor {
            id: id.into(),
            name: name.into(),
            role,
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.role.capabilities().contains(&capability)
    }

    /// Role gate called once at each operation boundary.
    pub fn require(&self, capability: Capability) -> CoreResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(CoreError::Forbidden {
                actor: self.name.clone(),
                capability,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refund_restricted_to_admin_and_manager() {
        assert!(Actor::new("1", "Admin", Role::Admin).can(Capability::Refund));
        assert!(Actor::new("2", "Manager", Role::Manager).can(Capability::Refund));
        assert!(!Actor::new("3", "Cashier", Role::Cashier).can(Capability::Refund));
        assert!(!Actor::new("4", "Store", Role::Warehouse).can(Capability::Refund));
    }

    #[test]
    fn test_require_returns_forbidden() {
        let cashier = Actor::new("c1", "Aziz", Role::Cashier);
        assert!(cashier.require(Capability::Sell).is_ok());

        let err = cashier.require(Capability::ManageAnyShift).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Forbidden {
                capability: Capability::ManageAnyShift,
                ..
            }
        ));
    }

    #[test]
    fn test_only_admin_manages_any_shift() {
        for role in [Role::Manager, Role::Cashier, Role::Warehouse] {
            assert!(!role.capabilities().contains(&Capability::ManageAnyShift));
        }
        assert!(Role::Admin.capabilities().contains(&Capability::ManageAnyShift));
    }

    #[test]
    fn test_capability_codes_are_unique() {
        let all = Role::Admin.capabilities();
        let mut codes: Vec<_> = all.iter().map(|c| c.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
