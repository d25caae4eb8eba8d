use std::{collections::BTreeMap, str::FromStr};

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::{self, Account};

static PHONE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9 ().\-]*[0-9][0-9 ().\-]*$").unwrap());

static AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").unwrap());

/// Integer digits beyond this can never fit the cents column.
const MAX_AMOUNT_DIGITS: usize = 17;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Format the forms use for `date_opened`.
pub const DATE_OPENED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Plain decimal notation only. Digit counts are checked on the text so an
/// amount is never expanded before it is known to be small.
fn validate_balance(value: &str) -> Result<(), ValidationError> {
    let digits = value.trim_start_matches('-');
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
    let message = if !AMOUNT.is_match(value) {
        "Balance must be a valid amount"
    } else if value.starts_with('-') && digits.bytes().any(|b| matches!(b, b'1'..=b'9')) {
        "Balance must be positive"
    } else if frac.trim_end_matches('0').len() > 2 {
        "Balance cannot have more than 2 decimal places"
    } else if int.trim_start_matches('0').len() > MAX_AMOUNT_DIGITS {
        "Balance is too large"
    } else {
        match BigDecimal::from_str(value).ok().and_then(|b| models::to_cents(&b)) {
            Some(_) => return Ok(()),
            None => "Balance is too large",
        }
    };
    let mut err = ValidationError::new("balance");
    err.message = Some(message.into());
    Err(err)
}

fn validate_date_opened(value: &str) -> Result<(), ValidationError> {
    match parse_date_opened(value) {
        Some(_) => Ok(()),
        None => {
            let mut err = ValidationError::new("date");
            err.message = Some("Date opened must be a valid date".into());
            Err(err)
        }
    }
}

pub fn parse_date_opened(value: &str) -> Option<NaiveDateTime> {
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Field name to messages, in the shape the form templates read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }
}

#[cfg(test)]
impl FieldErrors {
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

fn required_message(field: &str) -> Option<&'static str> {
    match field {
        "account_number" => Some("Account number is required"),
        "holder_name" => Some("Account holder name is required"),
        "email" => Some("Email is required"),
        "phone_number" => Some("Phone number is required"),
        "account_type" => Some("Account type is required"),
        "balance" => Some("Balance is required"),
        _ => None,
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = Self::default();
        for (field, errs) in errors.field_errors() {
            for e in errs {
                let required = if e.code == "required" {
                    required_message(field)
                } else {
                    None
                };
                match (&e.message, required) {
                    (Some(m), _) => out.add(field, m.to_string()),
                    (None, Some(m)) => out.add(field, m),
                    (None, None) => out.add(field, format!("{} is invalid", field)),
                }
            }
        }
        out
    }
}

/// Account form as posted by the create and edit pages. Every value arrives
/// as text so a bad value becomes a field message instead of a rejected
/// request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct AccountForm {
    pub account_id: Option<String>,
    #[validate(
        required,
        length(max = 20, message = "Account number cannot exceed 20 characters")
    )]
    pub account_number: Option<String>,
    #[validate(
        required,
        length(max = 100, message = "Account holder name cannot exceed 100 characters")
    )]
    pub holder_name: Option<String>,
    #[validate(required, email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(
        required,
        length(max = 15, message = "Phone number cannot exceed 15 characters"),
        regex(path = "PHONE_NUMBER", message = "Invalid phone number")
    )]
    pub phone_number: Option<String>,
    #[validate(required)]
    pub account_type: Option<String>,
    #[validate(required, custom = "validate_balance")]
    pub balance: Option<String>,
    #[validate(custom = "validate_date_opened")]
    pub date_opened: Option<String>,
    pub is_active: Option<String>,
    pub version: Option<String>,
}

/// Values of a form that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountFields {
    pub account_number: String,
    pub holder_name: String,
    pub email: String,
    pub phone_number: String,
    pub account_type: String,
    pub balance: BigDecimal,
    pub date_opened: Option<NaiveDateTime>,
    pub is_active: bool,
}

fn text(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

impl AccountForm {
    /// Blank form for the create page, active by default.
    pub fn blank() -> Self {
        Self {
            is_active: Some("true".to_string()),
            ..Default::default()
        }
    }

    /// Trims every value and drops the blank ones.
    pub fn normalized(self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        Self {
            account_id: clean(self.account_id),
            account_number: clean(self.account_number),
            holder_name: clean(self.holder_name),
            email: clean(self.email),
            phone_number: clean(self.phone_number),
            account_type: clean(self.account_type),
            balance: clean(self.balance),
            date_opened: clean(self.date_opened),
            is_active: clean(self.is_active),
            version: clean(self.version),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.account_id.as_deref()?.trim().parse().ok()
    }

    pub fn version(&self) -> Option<i64> {
        self.version.as_deref()?.trim().parse().ok()
    }

    /// Unchecked checkboxes are not posted at all.
    pub fn is_active(&self) -> bool {
        matches!(
            self.is_active.as_deref().map(str::trim),
            Some("true") | Some("on") | Some("1")
        )
    }

    /// Runs the field rules and converts the values.
    pub fn bind(&self) -> Result<AccountFields, FieldErrors> {
        self.validate()?;

        let balance = self
            .balance
            .as_deref()
            .and_then(|b| BigDecimal::from_str(b).ok())
            .ok_or_else(|| FieldErrors::single("balance", "Balance must be a valid amount"))?;

        Ok(AccountFields {
            account_number: text(&self.account_number),
            holder_name: text(&self.holder_name),
            email: text(&self.email),
            phone_number: text(&self.phone_number),
            account_type: text(&self.account_type),
            balance: balance.with_scale(2),
            date_opened: self.date_opened.as_deref().and_then(parse_date_opened),
            is_active: self.is_active(),
        })
    }
}

impl From<&Account> for AccountForm {
    fn from(a: &Account) -> Self {
        Self {
            account_id: Some(a.id.to_string()),
            account_number: Some(a.account_number.clone()),
            holder_name: Some(a.holder_name.clone()),
            email: Some(a.email.clone()),
            phone_number: Some(a.phone_number.clone()),
            account_type: Some(a.account_type.clone()),
            balance: Some(models::format_amount(&a.balance)),
            date_opened: Some(a.date_opened.format(DATE_OPENED_FORMAT).to_string()),
            is_active: Some(a.is_active.to_string()),
            version: Some(a.version.to_string()),
        }
    }
}
