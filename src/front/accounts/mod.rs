use anyhow::anyhow;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form, Router,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::{
    models::Account,
    service::{
        form::{AccountForm, FieldErrors},
        ServiceError,
    },
};

/// A page that ends the request early: the not-found page or the error page.
pub struct AppMessage(Response);

impl AppMessage {
    pub fn not_found(s: &AppState) -> AppMessage {
        Self::page(StatusCode::NOT_FOUND, "error.not_found.hbs", s)
    }

    pub fn new_error(msg: anyhow::Error, s: &AppState) -> AppMessage {
        log::error!("request failed: {:#}", msg);
        Self::page(StatusCode::INTERNAL_SERVER_ERROR, "error.get.hbs", s)
    }

    pub fn from_service(err: ServiceError, s: &AppState) -> AppMessage {
        match err {
            ServiceError::NotFound => Self::not_found(s),
            other => Self::new_error(anyhow!(other), s),
        }
    }

    fn page(status: StatusCode, name: &str, s: &AppState) -> AppMessage {
        match s.t.render(name, &()) {
            Ok(html) => Self((status, html).into_response()),
            Err(err) => Self(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to render template. Error: {err}"),
                )
                    .into_response(),
            ),
        }
    }
}

impl IntoResponse for AppMessage {
    fn into_response(self) -> Response {
        self.0
    }
}

pub fn new_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::get(index))
        .route("/create", axum::routing::get(create_form).post(create))
        .route("/:id", axum::routing::get(details))
        .route("/:id/edit", axum::routing::get(edit_form).post(edit))
        .route("/:id/delete", axum::routing::get(delete_confirm).post(delete))
}

fn render<T: Serialize>(s: &AppState, name: &str, data: &T) -> Result<Response, AppMessage> {
    s.t.render(name, data)
        .map(IntoResponse::into_response)
        .map_err(|err| AppMessage::new_error(anyhow!(err), s))
}

/// Ids that do not parse behave like ids that do not exist.
fn parse_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

fn notice_message(notice: &str) -> Option<&'static str> {
    match notice {
        "created" => Some("Account created successfully!"),
        "updated" => Some("Account updated successfully!"),
        "deleted" => Some("Account deleted successfully!"),
        _ => None,
    }
}

fn render_form(
    s: &AppState,
    status: StatusCode,
    form: &AccountForm,
    errors: &FieldErrors,
    edit_id: Option<i64>,
) -> Result<Response, AppMessage> {
    #[derive(Serialize)]
    struct Ctx<'a> {
        title: &'static str,
        action: String,
        is_edit: bool,
        checked: bool,
        form: &'a AccountForm,
        errors: &'a FieldErrors,
        account_types: &'static [&'static str],
    }

    let ctx = Ctx {
        title: if edit_id.is_some() { "Edit Account" } else { "Create Account" },
        action: match edit_id {
            Some(id) => format!("/accounts/{}/edit", id),
            None => "/accounts/create".to_string(),
        },
        is_edit: edit_id.is_some(),
        checked: form.is_active(),
        form,
        errors,
        account_types: s.accounts.account_types(),
    };
    let html = s
        .t
        .render("accounts.form.hbs", &ctx)
        .map_err(|err| AppMessage::new_error(anyhow!(err), s))?;
    Ok((status, html).into_response())
}

#[derive(Deserialize)]
struct IndexQuery {
    notice: Option<String>,
}

#[axum::debug_handler]
async fn index(
    State(s): State<AppState>,
    Query(q): Query<IndexQuery>,
) -> Result<Response, AppMessage> {
    let accounts = s
        .accounts
        .list()
        .await
        .map_err(|err| AppMessage::from_service(err, &s))?;

    #[derive(Serialize)]
    struct Ctx {
        accounts: Vec<Account>,
        notice: Option<&'static str>,
    }

    let ctx = Ctx {
        accounts,
        notice: q.notice.as_deref().and_then(notice_message),
    };
    render(&s, "accounts.index.hbs", &ctx)
}

#[axum::debug_handler]
async fn details(
    State(s): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppMessage> {
    let account = s
        .accounts
        .details(parse_id(&id))
        .await
        .map_err(|err| AppMessage::from_service(err, &s))?;

    #[derive(Serialize)]
    struct Ctx {
        account: Account,
    }

    render(&s, "accounts.details.hbs", &Ctx { account })
}

#[axum::debug_handler]
async fn create_form(State(s): State<AppState>) -> Result<Response, AppMessage> {
    render_form(
        &s,
        StatusCode::OK,
        &AccountForm::blank(),
        &FieldErrors::default(),
        None,
    )
}

#[axum::debug_handler]
async fn create(
    State(s): State<AppState>,
    Form(form): Form<AccountForm>,
) -> Result<Response, AppMessage> {
    let form = form.normalized();
    log::debug!("create account {:?}", form.account_number);

    match s.accounts.create(&form).await {
        Ok(_) => Ok(Redirect::to("/accounts?notice=created").into_response()),
        Err(ServiceError::Validation(errors)) => {
            render_form(&s, StatusCode::UNPROCESSABLE_ENTITY, &form, &errors, None)
        }
        Err(err) => Err(AppMessage::from_service(err, &s)),
    }
}

#[axum::debug_handler]
async fn edit_form(
    State(s): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppMessage> {
    let account = s
        .accounts
        .details(parse_id(&id))
        .await
        .map_err(|err| AppMessage::from_service(err, &s))?;

    render_form(
        &s,
        StatusCode::OK,
        &AccountForm::from(&account),
        &FieldErrors::default(),
        Some(account.id),
    )
}

#[axum::debug_handler]
async fn edit(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<AccountForm>,
) -> Result<Response, AppMessage> {
    let id = parse_id(&id).ok_or_else(|| AppMessage::not_found(&s))?;
    let form = form.normalized();
    log::debug!("edit account {}", id);

    match s.accounts.edit(id, &form).await {
        Ok(_) => Ok(Redirect::to("/accounts?notice=updated").into_response()),
        Err(ServiceError::Validation(errors)) => {
            render_form(&s, StatusCode::UNPROCESSABLE_ENTITY, &form, &errors, Some(id))
        }
        Err(err) => Err(AppMessage::from_service(err, &s)),
    }
}

#[axum::debug_handler]
async fn delete_confirm(
    State(s): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppMessage> {
    let account = s
        .accounts
        .delete_confirm(parse_id(&id))
        .await
        .map_err(|err| AppMessage::from_service(err, &s))?;

    #[derive(Serialize)]
    struct Ctx {
        account: Account,
    }

    render(&s, "accounts.delete.hbs", &Ctx { account })
}

#[axum::debug_handler]
async fn delete(
    State(s): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppMessage> {
    let Some(id) = parse_id(&id) else {
        return Ok(Redirect::to("/accounts").into_response());
    };

    let removed = s
        .accounts
        .delete(id)
        .await
        .map_err(|err| AppMessage::from_service(err, &s))?;

    let to = if removed {
        "/accounts?notice=deleted"
    } else {
        "/accounts"
    };
    Ok(Redirect::to(to).into_response())
}
