#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use bistro_server::{
    AppConfig, AppState, MockMailer, MockPaymentGateway,
    models::{
        ADMIN_ROLE, AdminStats, CategoryStat, DeleteOutcome, Document, IssueTokenRequest,
        StoredDocument, UpdateOutcome, UserRecord,
    },
    repository::{RepoResult, Repository, RepositoryError},
};
use serde_json::{Value, json};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tower::util::ServiceExt;
use uuid::Uuid;

const USERS: &str = "users";
const MENU: &str = "menu";
const REVIEWS: &str = "reviews";
const CARTS: &str = "carts";
const PAYMENTS: &str = "payments";

// --- In-Memory Repository ---

/// Document store kept in process memory. Knobs on the user lookup let
/// tests simulate a slow or broken store behind the admin gate.
#[derive(Default)]
pub struct InMemoryRepository {
    collections: Mutex<HashMap<&'static str, Vec<StoredDocument>>>,
    user_lookups: AtomicUsize,
    user_lookup_delay: Option<Duration>,
    fail_user_lookup: bool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every user lookup sleeps `delay` first.
    pub fn slow(delay: Duration) -> Self {
        Self {
            user_lookup_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Every user lookup fails with a store error.
    pub fn failing() -> Self {
        Self {
            fail_user_lookup: true,
            ..Self::default()
        }
    }

    pub fn user_lookups(&self) -> usize {
        self.user_lookups.load(Ordering::SeqCst)
    }

    pub fn seed(&self, collection: &'static str, body: Value) -> Uuid {
        let Value::Object(body) = body else {
            panic!("seed documents must be JSON objects");
        };
        self.insert(collection, body)
    }

    pub fn seed_user(&self, email: &str, role: Option<&str>) -> Uuid {
        let mut body = json!({ "email": email, "name": "Test User" });
        if let Some(role) = role {
            body["role"] = json!(role);
        }
        self.seed(USERS, body)
    }

    pub fn seed_menu_item(&self, body: Value) -> Uuid {
        self.seed(MENU, body)
    }

    pub fn seed_review(&self, body: Value) -> Uuid {
        self.seed(REVIEWS, body)
    }

    pub fn seed_cart_item(&self, body: Value) -> Uuid {
        self.seed(CARTS, body)
    }

    pub fn seed_payment(&self, body: Value) -> Uuid {
        self.seed(PAYMENTS, body)
    }

    /// Overwrites a user's role in place, as another admin request would.
    pub fn set_role(&self, email: &str, role: Option<&str>) {
        let mut collections = self.collections.lock().unwrap();
        for doc in collections.entry(USERS).or_default() {
            if doc.str_field("email") == Some(email) {
                match role {
                    Some(role) => doc.body.insert("role".into(), json!(role)),
                    None => doc.body.remove("role"),
                };
            }
        }
    }

    pub fn all(&self, collection: &'static str) -> Vec<StoredDocument> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn insert(&self, collection: &'static str, body: Document) -> Uuid {
        let id = Uuid::new_v4();
        self.collections
            .lock()
            .unwrap()
            .entry(collection)
            .or_default()
            .push(StoredDocument { id, body });
        id
    }

    fn find_one(&self, collection: &'static str, id: Uuid) -> Option<StoredDocument> {
        self.all(collection).into_iter().find(|doc| doc.id == id)
    }

    fn find_by_field(&self, collection: &'static str, field: &str, value: &str) -> Vec<StoredDocument> {
        self.all(collection)
            .into_iter()
            .filter(|doc| doc.str_field(field) == Some(value))
            .collect()
    }

    fn set_fields(&self, collection: &'static str, id: Uuid, patch: Document) -> UpdateOutcome {
        let mut collections = self.collections.lock().unwrap();
        let Some(doc) = collections
            .entry(collection)
            .or_default()
            .iter_mut()
            .find(|doc| doc.id == id)
        else {
            return UpdateOutcome::default();
        };

        let unchanged = patch.iter().all(|(k, v)| doc.body.get(k) == Some(v));
        doc.body.extend(patch);
        UpdateOutcome {
            matched_count: 1,
            modified_count: u64::from(!unchanged),
        }
    }

    fn delete_where(&self, collection: &'static str, keep: impl Fn(&StoredDocument) -> bool) -> DeleteOutcome {
        let mut collections = self.collections.lock().unwrap();
        let docs = collections.entry(collection).or_default();
        let before = docs.len();
        docs.retain(|doc| keep(doc));
        DeleteOutcome {
            deleted_count: (before - docs.len()) as u64,
        }
    }
}

fn numeric(doc: &StoredDocument, field: &str) -> f64 {
    doc.body.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<UserRecord>> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.user_lookup_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_user_lookup {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self
            .find_by_field(USERS, "email", email)
            .first()
            .and_then(UserRecord::from_document))
    }

    async fn list_users(&self) -> RepoResult<Vec<StoredDocument>> {
        Ok(self.all(USERS))
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<StoredDocument>> {
        Ok(self.find_one(USERS, id))
    }

    async fn insert_user(&self, user: Document) -> RepoResult<Uuid> {
        Ok(self.insert(USERS, user))
    }

    async fn promote_user(&self, id: Uuid) -> RepoResult<UpdateOutcome> {
        let mut patch = Document::new();
        patch.insert("role".into(), json!(ADMIN_ROLE));
        Ok(self.set_fields(USERS, id, patch))
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<DeleteOutcome> {
        Ok(self.delete_where(USERS, |doc| doc.id != id))
    }

    async fn list_menu(&self) -> RepoResult<Vec<StoredDocument>> {
        Ok(self.all(MENU))
    }

    async fn get_menu_item(&self, id: Uuid) -> RepoResult<Option<StoredDocument>> {
        Ok(self.find_one(MENU, id))
    }

    async fn insert_menu_item(&self, item: Document) -> RepoResult<Uuid> {
        Ok(self.insert(MENU, item))
    }

    async fn update_menu_item(&self, id: Uuid, patch: Document) -> RepoResult<UpdateOutcome> {
        Ok(self.set_fields(MENU, id, patch))
    }

    async fn delete_menu_item(&self, id: Uuid) -> RepoResult<DeleteOutcome> {
        Ok(self.delete_where(MENU, |doc| doc.id != id))
    }

    async fn list_reviews(&self) -> RepoResult<Vec<StoredDocument>> {
        Ok(self.all(REVIEWS))
    }

    async fn list_cart(&self, user_email: &str) -> RepoResult<Vec<StoredDocument>> {
        Ok(self.find_by_field(CARTS, "userEmail", user_email))
    }

    async fn insert_cart_item(&self, item: Document) -> RepoResult<Uuid> {
        Ok(self.insert(CARTS, item))
    }

    async fn delete_cart_item(&self, id: Uuid) -> RepoResult<DeleteOutcome> {
        Ok(self.delete_where(CARTS, |doc| doc.id != id))
    }

    async fn list_payments(&self, email: &str) -> RepoResult<Vec<StoredDocument>> {
        Ok(self.find_by_field(PAYMENTS, "email", email))
    }

    async fn record_payment(
        &self,
        payment: Document,
        cart_ids: Vec<Uuid>,
    ) -> RepoResult<(Uuid, DeleteOutcome)> {
        let id = self.insert(PAYMENTS, payment);
        let deleted = self.delete_where(CARTS, |doc| !cart_ids.contains(&doc.id));
        Ok((id, deleted))
    }

    async fn admin_stats(&self) -> RepoResult<AdminStats> {
        let payments = self.all(PAYMENTS);
        Ok(AdminStats {
            users: self.all(USERS).len() as i64,
            menu_items: self.all(MENU).len() as i64,
            orders: payments.len() as i64,
            revenue: payments.iter().map(|p| numeric(p, "price")).sum(),
        })
    }

    async fn order_stats(&self) -> RepoResult<Vec<CategoryStat>> {
        let menu = self.all(MENU);
        let mut groups: BTreeMap<String, (i64, f64)> = BTreeMap::new();

        for payment in self.all(PAYMENTS) {
            let Some(Value::Array(ids)) = payment.body.get("menuItemIds") else {
                continue;
            };
            // Each menu item counts once per payment, however often it is listed.
            let ids: BTreeSet<&str> = ids.iter().filter_map(Value::as_str).collect();
            for item in menu.iter().filter(|m| ids.contains(m.id.to_string().as_str())) {
                if let Some(category) = item.str_field("category") {
                    let entry = groups.entry(category.to_string()).or_default();
                    entry.0 += 1;
                    entry.1 += numeric(item, "price");
                }
            }
        }

        Ok(groups
            .into_iter()
            .map(|(category, (quantity, revenue))| CategoryStat {
                category,
                quantity,
                revenue,
            })
            .collect())
    }
}

// --- State & Request Helpers ---

pub fn test_config() -> AppConfig {
    AppConfig {
        role_lookup_timeout: Duration::from_millis(200),
        ..AppConfig::default()
    }
}

pub fn test_state(repo: Arc<InMemoryRepository>) -> AppState {
    AppState::new(
        test_config(),
        repo,
        Arc::new(MockPaymentGateway::new()),
        Arc::new(MockMailer::new()),
    )
}

/// Signs a token for `email` with the state's own codec.
pub fn token_for(state: &AppState, email: &str) -> String {
    state
        .tokens
        .issue(IssueTokenRequest {
            email: email.to_string(),
            extra: Document::new(),
        })
        .unwrap()
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Drives one request through the router and decodes the JSON answer
/// (non-JSON bodies come back as a JSON string).
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}
