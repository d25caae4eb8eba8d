use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::NaiveDateTime;
use serde::Serialize;

/// Labels offered by the create and edit forms. Any other text is accepted.
pub const ACCOUNT_TYPES: [&str; 4] = [
    "Savings Account",
    "Current Account",
    "Fixed Deposit",
    "Recurring Deposit",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: i64,
    pub account_number: String,
    pub holder_name: String,
    pub email: String,
    pub phone_number: String,
    pub account_type: String,
    pub balance: BigDecimal,
    pub date_opened: NaiveDateTime,
    pub is_active: bool,
    pub version: i64,
}

/// An account that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub account_number: String,
    pub holder_name: String,
    pub email: String,
    pub phone_number: String,
    pub account_type: String,
    pub balance: BigDecimal,
    pub date_opened: NaiveDateTime,
    pub is_active: bool,
}

impl NewAccount {
    pub fn into_account(self, id: i64, version: i64) -> Account {
        Account {
            id,
            account_number: self.account_number,
            holder_name: self.holder_name,
            email: self.email,
            phone_number: self.phone_number,
            account_type: self.account_type,
            balance: self.balance,
            date_opened: self.date_opened,
            is_active: self.is_active,
            version,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AccountRow {
    id: i64,
    account_number: String,
    holder_name: String,
    email: String,
    phone_number: String,
    account_type: String,
    balance_cents: i64,
    date_opened: NaiveDateTime,
    is_active: bool,
    version: i64,
}

impl From<AccountRow> for Account {
    fn from(r: AccountRow) -> Self {
        Account {
            id: r.id,
            account_number: r.account_number,
            holder_name: r.holder_name,
            email: r.email,
            phone_number: r.phone_number,
            account_type: r.account_type,
            balance: from_cents(r.balance_cents),
            date_opened: r.date_opened,
            is_active: r.is_active,
            version: r.version,
        }
    }
}

pub fn from_cents(cents: i64) -> BigDecimal {
    BigDecimal::new(cents.into(), 2)
}

/// Two fraction digits, zero included.
pub fn format_amount(amount: &BigDecimal) -> String {
    format!("{:.2}", amount)
}

/// `None` when the amount does not fit the column.
pub fn to_cents(amount: &BigDecimal) -> Option<i64> {
    (amount.with_scale(2) * BigDecimal::from(100)).to_i64()
}
