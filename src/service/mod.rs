pub mod form;

use chrono::{Local, SubsecRound};
use thiserror::Error;

use crate::{
    models::{Account, NewAccount, ACCOUNT_TYPES},
    store::{AccountStore, StoreError},
};
use form::{AccountForm, FieldErrors};

const DUPLICATE_NUMBER: &str = "Account number already exists";
const STALE_FORM: &str = "This form is out of date, reload the account and try again";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid account form")]
    Validation(FieldErrors),
    #[error("account not found")]
    NotFound,
    /// The row still exists but refused the update.
    #[error("account {0} was changed by another request while it was being saved")]
    Conflict(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn duplicate_number() -> ServiceError {
    ServiceError::Validation(FieldErrors::single("account_number", DUPLICATE_NUMBER))
}

/// The five account actions on top of an [`AccountStore`].
#[derive(Clone)]
pub struct AccountService {
    store: AccountStore,
}

impl AccountService {
    pub fn new(store: AccountStore) -> Self {
        Self { store }
    }

    pub fn account_types(&self) -> &'static [&'static str] {
        &ACCOUNT_TYPES
    }

    pub async fn list(&self) -> Result<Vec<Account>, ServiceError> {
        Ok(self.store.list().await?)
    }

    pub async fn details(&self, id: Option<i64>) -> Result<Account, ServiceError> {
        let id = id.ok_or(ServiceError::NotFound)?;
        self.store.get(id).await?.ok_or(ServiceError::NotFound)
    }

    pub async fn create(&self, form: &AccountForm) -> Result<Account, ServiceError> {
        let form = form.clone().normalized();
        let fields = form.bind().map_err(ServiceError::Validation)?;

        if self.store.exists(&fields.account_number, None).await? {
            log::warn!("account number {} already exists", fields.account_number);
            return Err(duplicate_number());
        }

        let account = NewAccount {
            account_number: fields.account_number,
            holder_name: fields.holder_name,
            email: fields.email,
            phone_number: fields.phone_number,
            account_type: fields.account_type,
            balance: fields.balance,
            date_opened: Local::now().naive_local().trunc_subsecs(3),
            is_active: fields.is_active,
        };

        let id = match self.store.insert(&account).await {
            Ok(id) => id,
            Err(StoreError::Duplicate) => {
                log::warn!("account number {} was taken concurrently", account.account_number);
                return Err(duplicate_number());
            }
            Err(err) => return Err(err.into()),
        };

        log::info!("account {} created with id {}", account.account_number, id);
        Ok(account.into_account(id, 1))
    }

    pub async fn edit(&self, id: i64, form: &AccountForm) -> Result<Account, ServiceError> {
        let form = form.clone().normalized();
        if form.id() != Some(id) {
            log::debug!("edit of {} carries id {:?}", id, form.account_id);
            return Err(ServiceError::NotFound);
        }

        let (fields, date_opened, version) = match (form.bind(), form.version()) {
            (Ok(fields), Some(version)) => match fields.date_opened {
                Some(date_opened) => (fields, date_opened, version),
                None => {
                    return Err(ServiceError::Validation(FieldErrors::single(
                        "date_opened",
                        "Date opened is required",
                    )))
                }
            },
            (bound, version) => {
                let mut errors = bound.err().unwrap_or_default();
                if form.date_opened.is_none() {
                    errors.add("date_opened", "Date opened is required");
                }
                if version.is_none() {
                    errors.add("version", STALE_FORM);
                }
                return Err(ServiceError::Validation(errors));
            }
        };

        if self.store.exists(&fields.account_number, Some(id)).await? {
            log::warn!("account number {} already exists", fields.account_number);
            return Err(duplicate_number());
        }

        let mut account = Account {
            id,
            account_number: fields.account_number,
            holder_name: fields.holder_name,
            email: fields.email,
            phone_number: fields.phone_number,
            account_type: fields.account_type,
            balance: fields.balance,
            date_opened,
            is_active: fields.is_active,
            version,
        };

        match self.store.update(&account).await {
            Ok(new_version) => {
                account.version = new_version;
                log::info!("account {} updated", id);
                Ok(account)
            }
            Err(StoreError::Duplicate) => Err(duplicate_number()),
            Err(StoreError::NotFound(_)) | Err(StoreError::Conflict(_)) => {
                match self.store.get(id).await? {
                    None => {
                        log::info!("account {} vanished during update", id);
                        Err(ServiceError::NotFound)
                    }
                    Some(_) => {
                        log::error!("account {} still exists but rejected the update", id);
                        Err(ServiceError::Conflict(id))
                    }
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The record shown on the delete confirmation page.
    pub async fn delete_confirm(&self, id: Option<i64>) -> Result<Account, ServiceError> {
        self.details(id).await
    }

    /// Removes the account. An unknown id counts as already removed.
    pub async fn delete(&self, id: i64) -> Result<bool, ServiceError> {
        let removed = self.store.delete(id).await?;
        if removed {
            log::info!("account {} deleted", id);
        } else {
            log::debug!("account {} was already gone", id);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use bigdecimal::BigDecimal;

    use super::*;

    async fn setup_test(seeded: bool) -> AccountService {
        let store = AccountStore::connect_test().await.expect("Failed to create test database");
        crate::migration::migrate(store.pool(), "./migrations")
            .await
            .expect("Failed to migrate test database");
        if !seeded {
            sqlx::query("DELETE FROM accounts").execute(store.pool()).await.unwrap();
        }
        AccountService::new(store)
    }

    fn create_form(number: &str, balance: &str) -> AccountForm {
        AccountForm {
            account_number: Some(number.to_string()),
            holder_name: Some("Grace Hopper".to_string()),
            email: Some("grace@example.com".to_string()),
            phone_number: Some("555-010-2030".to_string()),
            account_type: Some("Recurring Deposit".to_string()),
            balance: Some(balance.to_string()),
            is_active: Some("true".to_string()),
            ..Default::default()
        }
    }

    async fn find(service: &AccountService, number: &str) -> Account {
        service
            .list()
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.account_number == number)
            .expect("Account should be listed")
    }

    fn field_errors(err: ServiceError) -> FieldErrors {
        match err {
            ServiceError::Validation(errors) => errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_then_details() {
        let service = setup_test(false).await;
        let before = Local::now().naive_local().trunc_subsecs(3);

        let created = service.create(&create_form("ACC100", "1234.5")).await.unwrap();
        let stored = service.details(Some(created.id)).await.unwrap();

        assert_eq!(stored, created);
        assert_eq!(stored.account_number, "ACC100");
        assert_eq!(stored.holder_name, "Grace Hopper");
        assert_eq!(stored.email, "grace@example.com");
        assert_eq!(stored.phone_number, "555-010-2030");
        assert_eq!(stored.account_type, "Recurring Deposit");
        assert_eq!(stored.balance, BigDecimal::from_str("1234.50").unwrap());
        assert!(stored.is_active);
        assert!(stored.date_opened >= before);
    }

    #[tokio::test]
    async fn test_create_ignores_posted_id_and_date() {
        let service = setup_test(false).await;
        let form = AccountForm {
            account_id: Some("77".to_string()),
            date_opened: Some("2001-01-01".to_string()),
            ..create_form("ACC100", "1")
        };

        let created = service.create(&form).await.unwrap();
        assert_ne!(created.id, 77);
        assert!(created.date_opened.format("%Y").to_string() != "2001");
    }

    #[tokio::test]
    async fn test_create_invalid_leaves_store_unchanged() {
        let service = setup_test(true).await;
        let form = AccountForm {
            email: Some("nope".to_string()),
            balance: Some("-5".to_string()),
            ..create_form("ACC100", "0")
        };

        let errors = field_errors(service.create(&form).await.unwrap_err());
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["balance", "email"]);
        assert_eq!(service.store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_create_duplicate_number() {
        let service = setup_test(true).await;

        let errors = field_errors(service.create(&create_form("ACC001", "1")).await.unwrap_err());
        assert_eq!(errors.get("account_number").unwrap(), [DUPLICATE_NUMBER]);
        assert_eq!(service.store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_details_not_found() {
        let service = setup_test(true).await;
        assert!(matches!(service.details(None).await, Err(ServiceError::NotFound)));
        assert!(matches!(service.details(Some(999)).await, Err(ServiceError::NotFound)));
        assert!(matches!(service.delete_confirm(Some(999)).await, Err(ServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_edit_only_balance() {
        let service = setup_test(true).await;
        let original = find(&service, "ACC002").await;

        let form = AccountForm {
            balance: Some("10500.00".to_string()),
            ..AccountForm::from(&original)
        };
        let updated = service.edit(original.id, &form).await.unwrap();

        let stored = service.details(Some(original.id)).await.unwrap();
        assert_eq!(stored, updated);
        assert_eq!(stored.balance.to_string(), "10500.00");
        assert_eq!(
            stored,
            Account {
                balance: BigDecimal::from(10500),
                version: original.version + 1,
                ..original
            }
        );
    }

    #[tokio::test]
    async fn test_edit_keeps_own_number() {
        let service = setup_test(true).await;
        let original = find(&service, "ACC001").await;

        let form = AccountForm {
            holder_name: Some("Johnathan Doe".to_string()),
            ..AccountForm::from(&original)
        };
        let updated = service.edit(original.id, &form).await.unwrap();
        assert_eq!(updated.account_number, "ACC001");
        assert_eq!(updated.holder_name, "Johnathan Doe");
    }

    #[tokio::test]
    async fn test_edit_collides_with_other_account() {
        let service = setup_test(true).await;
        let original = find(&service, "ACC001").await;

        let form = AccountForm {
            account_number: Some("ACC002".to_string()),
            ..AccountForm::from(&original)
        };
        let errors = field_errors(service.edit(original.id, &form).await.unwrap_err());
        assert_eq!(errors.get("account_number").unwrap(), [DUPLICATE_NUMBER]);
        assert_eq!(find(&service, "ACC001").await, original);
    }

    #[tokio::test]
    async fn test_edit_id_mismatch() {
        let service = setup_test(true).await;
        let original = find(&service, "ACC001").await;
        let form = AccountForm::from(&original);

        assert!(matches!(
            service.edit(original.id + 1, &form).await,
            Err(ServiceError::NotFound)
        ));

        let form = AccountForm {
            account_id: None,
            ..form
        };
        assert!(matches!(service.edit(original.id, &form).await, Err(ServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_edit_requires_date_and_version() {
        let service = setup_test(true).await;
        let original = find(&service, "ACC001").await;

        let form = AccountForm {
            date_opened: None,
            version: None,
            ..AccountForm::from(&original)
        };
        let errors = field_errors(service.edit(original.id, &form).await.unwrap_err());
        assert_eq!(errors.get("date_opened").unwrap(), ["Date opened is required"]);
        assert_eq!(errors.get("version").unwrap(), [STALE_FORM]);
    }

    #[tokio::test]
    async fn test_edit_date_opened_in_the_future() {
        let service = setup_test(true).await;
        let original = find(&service, "ACC001").await;

        let form = AccountForm {
            date_opened: Some("2099-12-31T23:59:00.000".to_string()),
            ..AccountForm::from(&original)
        };
        let updated = service.edit(original.id, &form).await.unwrap();
        assert_eq!(updated.date_opened.format("%Y-%m-%d").to_string(), "2099-12-31");
        assert_eq!(service.list().await.unwrap()[0].id, original.id);
    }

    #[tokio::test]
    async fn test_edit_vanished_account_is_not_found() {
        let service = setup_test(true).await;
        let original = find(&service, "ACC001").await;
        let form = AccountForm::from(&original);

        service.delete(original.id).await.unwrap();
        assert!(matches!(service.edit(original.id, &form).await, Err(ServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_edit_stale_form_is_fatal() {
        let service = setup_test(true).await;
        let original = find(&service, "ACC001").await;
        let stale = AccountForm::from(&original);

        let fresh = AccountForm {
            holder_name: Some("First Writer".to_string()),
            ..AccountForm::from(&original)
        };
        service.edit(original.id, &fresh).await.unwrap();

        let err = service.edit(original.id, &stale).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(id) if id == original.id));
        assert_eq!(find(&service, "ACC001").await.holder_name, "First Writer");
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_silent() {
        let service = setup_test(true).await;

        assert!(!service.delete(999).await.unwrap());
        assert_eq!(service.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_seeded_scenario() {
        let service = setup_test(true).await;

        service.create(&create_form("ACC003", "250.00")).await.unwrap();
        let accounts = service.list().await.unwrap();
        assert_eq!(accounts.len(), 3);
        assert_eq!(accounts[0].account_number, "ACC003");

        let acc002 = find(&service, "ACC002").await;
        let form = AccountForm {
            balance: Some("10500.00".to_string()),
            ..AccountForm::from(&acc002)
        };
        service.edit(acc002.id, &form).await.unwrap();
        let acc002 = service.details(Some(acc002.id)).await.unwrap();
        assert_eq!(acc002.balance, BigDecimal::from_str("10500.00").unwrap());

        let acc001 = find(&service, "ACC001").await;
        assert!(service.delete(acc001.id).await.unwrap());
        let accounts = service.list().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|a| a.account_number != "ACC001"));

        let errors = field_errors(service.create(&create_form("ACC002", "1")).await.unwrap_err());
        assert!(errors.get("account_number").is_some());
        assert_eq!(service.list().await.unwrap().len(), 2);
    }

    #[test]
    fn test_account_type_suggestions() {
        let labels = [
            "Savings Account",
            "Current Account",
            "Fixed Deposit",
            "Recurring Deposit",
        ];
        assert_eq!(ACCOUNT_TYPES, labels);
    }
}
