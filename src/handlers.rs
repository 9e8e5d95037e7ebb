use crate::{
    AppState,
    auth::{AuthUser, ensure_self},
    error::{AppError, AppJson},
    mailer::OrderConfirmation,
    models::{
        AdminStats, AdminStatus, CartQuery, CategoryStat, DeleteOutcome, Document,
        InsertOutcome, IssueTokenRequest, MenuItemUpdate, PaymentIntentRequest,
        PaymentIntentResponse, PaymentReceipt, StoredDocument, TokenResponse, UpdateOutcome,
        strip_reserved,
    },
    payments::amount_in_cents,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde_json::Value;
use uuid::Uuid;

type ApiResult<T> = Result<Json<T>, AppError>;

// --- Identity ---

/// issue_token
///
/// [Public Route] Signs the submitted claim object into a one-hour token.
#[utoipa::path(
    post,
    path = "/jwt",
    request_body = Object,
    responses(
        (status = 200, description = "Signed token", body = TokenResponse),
        (status = 400, description = "Claim without a usable email")
    )
)]
pub async fn issue_token(
    State(state): State<AppState>,
    AppJson(payload): AppJson<IssueTokenRequest>,
) -> ApiResult<TokenResponse> {
    let token = state.tokens.issue(payload)?;
    Ok(Json(TokenResponse { token }))
}

/// register_user
///
/// [Public Route] Stores a new user document unless one with the same email
/// already exists. The duplicate case is not an error: it answers with a
/// null `insertedId`.
#[utoipa::path(
    post,
    path = "/users",
    request_body = Object,
    responses((status = 200, description = "Insert result", body = InsertOutcome))
)]
pub async fn register_user(
    State(state): State<AppState>,
    AppJson(payload): AppJson<Document>,
) -> ApiResult<InsertOutcome> {
    let user = strip_reserved(payload);
    let email = user
        .get("email")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("user must have an email".to_string()))?;

    if state.repo.find_user_by_email(&email).await?.is_some() {
        return Ok(Json(InsertOutcome::skipped("User already exists")));
    }

    let id = state.repo.insert_user(user).await?;
    tracing::info!(%id, %email, "user registered");
    Ok(Json(InsertOutcome::inserted(id)))
}

/// list_users
///
/// [Admin Route] Every user document.
#[utoipa::path(get, path = "/users", responses((status = 200, description = "All users")))]
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Vec<StoredDocument>> {
    Ok(Json(state.repo.list_users().await?))
}

/// get_user
///
/// [Admin Route]
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses((status = 200, description = "User"), (status = 404, description = "Not Found"))
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StoredDocument> {
    state.repo.get_user(id).await?.map(Json).ok_or(AppError::NotFound)
}

/// promote_user
///
/// [Admin Route] Grants the admin role. Promoting an admin again is a no-op
/// reported as `modifiedCount: 0`.
#[utoipa::path(
    patch,
    path = "/users/admin/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses((status = 200, description = "Update result", body = UpdateOutcome))
)]
pub async fn promote_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<UpdateOutcome> {
    let outcome = state.repo.promote_user(id).await?;
    tracing::info!(%id, modified = outcome.modified_count, "user promoted to admin");
    Ok(Json(outcome))
}

/// delete_user
///
/// [Admin Route]
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses((status = 200, description = "Delete result", body = DeleteOutcome))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<DeleteOutcome> {
    let outcome = state.repo.delete_user(id).await?;
    tracing::info!(%id, deleted = outcome.deleted_count, "user deleted");
    Ok(Json(outcome))
}

/// admin_status
///
/// [Self Route] Tells callers whether they are admins. Asking about another
/// email is refused even for admins.
#[utoipa::path(
    get,
    path = "/users/admin/{email}",
    params(("email" = String, Path, description = "Caller's own email")),
    responses(
        (status = 200, description = "Admin flag", body = AdminStatus),
        (status = 403, description = "Not the caller's email")
    )
)]
pub async fn admin_status(
    user: AuthUser,
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<AdminStatus> {
    ensure_self(&user, &email)?;
    let admin = state
        .repo
        .find_user_by_email(&email)
        .await?
        .is_some_and(|record| record.is_admin());
    Ok(Json(AdminStatus { admin }))
}

// --- Menu & Reviews ---

/// list_menu
///
/// [Public Route]
#[utoipa::path(get, path = "/menu", responses((status = 200, description = "Menu items")))]
pub async fn list_menu(State(state): State<AppState>) -> ApiResult<Vec<StoredDocument>> {
    Ok(Json(state.repo.list_menu().await?))
}

/// get_menu_item
///
/// [Public Route]
#[utoipa::path(
    get,
    path = "/menu/{id}",
    params(("id" = Uuid, Path, description = "Menu item ID")),
    responses((status = 200, description = "Menu item"), (status = 404, description = "Not Found"))
)]
pub async fn get_menu_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StoredDocument> {
    state
        .repo
        .get_menu_item(id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

/// create_menu_item
///
/// [Admin Route]
#[utoipa::path(
    post,
    path = "/menu",
    request_body = Object,
    responses((status = 200, description = "Insert result", body = InsertOutcome))
)]
pub async fn create_menu_item(
    State(state): State<AppState>,
    AppJson(payload): AppJson<Document>,
) -> ApiResult<InsertOutcome> {
    let id = state.repo.insert_menu_item(strip_reserved(payload)).await?;
    tracing::info!(%id, "menu item created");
    Ok(Json(InsertOutcome::inserted(id)))
}

/// update_menu_item
///
/// [Admin Route] Writes only the editable fields present in the body:
/// name, category, price, recipe, image.
#[utoipa::path(
    patch,
    path = "/menu/{id}",
    params(("id" = Uuid, Path, description = "Menu item ID")),
    request_body = MenuItemUpdate,
    responses((status = 200, description = "Update result", body = UpdateOutcome))
)]
pub async fn update_menu_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<MenuItemUpdate>,
) -> ApiResult<UpdateOutcome> {
    let outcome = state
        .repo
        .update_menu_item(id, payload.into_patch())
        .await?;
    tracing::info!(%id, modified = outcome.modified_count, "menu item updated");
    Ok(Json(outcome))
}

/// delete_menu_item
///
/// [Admin Route]
#[utoipa::path(
    delete,
    path = "/menu/{id}",
    params(("id" = Uuid, Path, description = "Menu item ID")),
    responses((status = 200, description = "Delete result", body = DeleteOutcome))
)]
pub async fn delete_menu_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<DeleteOutcome> {
    let outcome = state.repo.delete_menu_item(id).await?;
    tracing::info!(%id, deleted = outcome.deleted_count, "menu item deleted");
    Ok(Json(outcome))
}

/// list_reviews
///
/// [Public Route]
#[utoipa::path(get, path = "/reviews", responses((status = 200, description = "Reviews")))]
pub async fn list_reviews(State(state): State<AppState>) -> ApiResult<Vec<StoredDocument>> {
    Ok(Json(state.repo.list_reviews().await?))
}

// --- Carts ---

/// list_cart
///
/// [Public Route] Cart lines whose `userEmail` matches `?email=`.
#[utoipa::path(
    get,
    path = "/carts",
    params(CartQuery),
    responses((status = 200, description = "Cart lines"), (status = 400, description = "Missing email"))
)]
pub async fn list_cart(
    State(state): State<AppState>,
    Query(query): Query<CartQuery>,
) -> ApiResult<Vec<StoredDocument>> {
    let email = query
        .email
        .ok_or_else(|| AppError::BadRequest("email query parameter is required".to_string()))?;
    Ok(Json(state.repo.list_cart(&email).await?))
}

/// add_cart_item
///
/// [Public Route]
#[utoipa::path(
    post,
    path = "/carts",
    request_body = Object,
    responses((status = 200, description = "Insert result", body = InsertOutcome))
)]
pub async fn add_cart_item(
    State(state): State<AppState>,
    AppJson(payload): AppJson<Document>,
) -> ApiResult<InsertOutcome> {
    let id = state.repo.insert_cart_item(strip_reserved(payload)).await?;
    Ok(Json(InsertOutcome::inserted(id)))
}

/// remove_cart_item
///
/// [Public Route]
#[utoipa::path(
    delete,
    path = "/carts/{id}",
    params(("id" = Uuid, Path, description = "Cart line ID")),
    responses((status = 200, description = "Delete result", body = DeleteOutcome))
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<DeleteOutcome> {
    Ok(Json(state.repo.delete_cart_item(id).await?))
}

// --- Payments ---

/// create_payment_intent
///
/// [Public Route] Opens a USD card payment intent for `price` dollars and
/// hands the client secret back to the browser.
#[utoipa::path(
    post,
    path = "/create-payment-intent",
    request_body = PaymentIntentRequest,
    responses(
        (status = 200, description = "Client secret", body = PaymentIntentResponse),
        (status = 400, description = "Invalid price"),
        (status = 502, description = "Gateway failure")
    )
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    AppJson(payload): AppJson<PaymentIntentRequest>,
) -> ApiResult<PaymentIntentResponse> {
    let amount = amount_in_cents(payload.price)
        .ok_or_else(|| AppError::BadRequest("price must be a positive number".to_string()))?;
    tracing::debug!(amount, "creating payment intent");

    let client_secret = state.payments.create_payment_intent(amount, "usd").await?;
    Ok(Json(PaymentIntentResponse { client_secret }))
}

/// record_payment
///
/// [Public Route] Stores the payment, clears the paid cart lines listed in
/// `cartIds`, then emails an order confirmation in the background.
#[utoipa::path(
    post,
    path = "/payments",
    request_body = Object,
    responses(
        (status = 200, description = "Payment and cart results", body = PaymentReceipt),
        (status = 400, description = "Malformed cartIds")
    )
)]
pub async fn record_payment(
    State(state): State<AppState>,
    AppJson(payload): AppJson<Document>,
) -> ApiResult<PaymentReceipt> {
    let payment = strip_reserved(payload);
    let cart_ids = parse_cart_ids(&payment)?;

    let confirmation = match (
        payment.get("email").and_then(Value::as_str),
        payment.get("transactionId").and_then(Value::as_str),
    ) {
        (Some(to), Some(transaction_id)) => Some(OrderConfirmation {
            to: to.to_string(),
            transaction_id: transaction_id.to_string(),
        }),
        _ => None,
    };

    let (payment_id, delete_result) = state.repo.record_payment(payment, cart_ids).await?;
    tracing::info!(%payment_id, cleared = delete_result.deleted_count, "payment recorded");

    if let Some(message) = confirmation {
        let mailer = state.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send_order_confirmation(&message).await {
                tracing::error!(to = %message.to, "order confirmation failed: {e}");
            }
        });
    }

    Ok(Json(PaymentReceipt {
        payment_result: InsertOutcome::inserted(payment_id),
        delete_result,
    }))
}

/// `cartIds` is optional but, when present, must be an array of ids.
fn parse_cart_ids(payment: &Document) -> Result<Vec<Uuid>, AppError> {
    let invalid = || AppError::BadRequest("cartIds must be an array of ids".to_string());

    match payment.get("cartIds") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(ids)) => ids
            .iter()
            .map(|id| {
                id.as_str()
                    .and_then(|raw| Uuid::parse_str(raw).ok())
                    .ok_or_else(invalid)
            })
            .collect(),
        Some(_) => Err(invalid()),
    }
}

/// list_payments
///
/// [Self Route] Payment history of the caller.
#[utoipa::path(
    get,
    path = "/payments/{email}",
    params(("email" = String, Path, description = "Caller's own email")),
    responses(
        (status = 200, description = "Payments"),
        (status = 403, description = "Not the caller's email")
    )
)]
pub async fn list_payments(
    user: AuthUser,
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<Vec<StoredDocument>> {
    ensure_self(&user, &email)?;
    Ok(Json(state.repo.list_payments(&email).await?))
}

// --- Analytics ---

/// admin_stats
///
/// [Admin Route] Users, menu items, orders and total revenue.
#[utoipa::path(
    get,
    path = "/admin-stats",
    responses((status = 200, description = "Dashboard counters", body = AdminStats))
)]
pub async fn admin_stats(State(state): State<AppState>) -> ApiResult<AdminStats> {
    Ok(Json(state.repo.admin_stats().await?))
}

/// order_stats
///
/// [Admin Route] Items sold and revenue per menu category.
#[utoipa::path(
    get,
    path = "/order-stats",
    responses((status = 200, description = "Per-category totals", body = [CategoryStat]))
)]
pub async fn order_stats(State(state): State<AppState>) -> ApiResult<Vec<CategoryStat>> {
    Ok(Json(state.repo.order_stats().await?))
}
