use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{FromRow, types::Json};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// Role value that grants administrator rights.
pub const ADMIN_ROLE: &str = "admin";

/// A schemaless JSON object as submitted by clients and stored verbatim.
pub type Document = Map<String, Value>;

// --- Stored Documents ---

/// DocumentRow
///
/// Raw database row shared by every collection table: `(id UUID, doc JSONB)`.
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub doc: Json<Document>,
}

/// StoredDocument
///
/// A document as returned to clients: the stored body with the server
/// generated identifier merged in as `_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(flatten)]
    pub body: Document,
}

impl From<DocumentRow> for StoredDocument {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            body: row.doc.0,
        }
    }
}

impl StoredDocument {
    /// Reads a top-level string field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }
}

/// Removes keys the server owns before a client body is persisted.
pub fn strip_reserved(mut body: Document) -> Document {
    body.remove("_id");
    body
}

// --- Identity ---

/// UserRecord
///
/// The two fields of a user document the authorization gate cares about.
/// Everything else on the document (name, photo...) is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub email: String,
    /// Absent for ordinary customers, `"admin"` for administrators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl UserRecord {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(ADMIN_ROLE)
    }

    /// Projects a stored user document. Returns `None` when it has no email.
    pub fn from_document(doc: &StoredDocument) -> Option<Self> {
        Some(Self {
            id: doc.id,
            email: doc.str_field("email")?.to_string(),
            role: doc.str_field("role").map(str::to_string),
        })
    }
}

/// IssueTokenRequest
///
/// Claim payload submitted to `POST /jwt`. Only `email` is required; any extra
/// fields are signed into the token as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTokenRequest {
    pub email: String,
    #[serde(flatten)]
    pub extra: Document,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
}

/// AdminStatus
///
/// Answer of `GET /users/admin/{email}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct AdminStatus {
    pub admin: bool,
}

// --- Write Outcomes ---

/// InsertOutcome
///
/// `insertedId` is null when nothing was written (e.g. duplicate registration),
/// in which case `message` says why.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InsertOutcome {
    pub inserted_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InsertOutcome {
    pub fn inserted(id: Uuid) -> Self {
        Self {
            inserted_id: Some(id),
            message: None,
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            inserted_id: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DeleteOutcome {
    pub deleted_count: u64,
}

// --- Menu ---

/// MenuItemUpdate
///
/// Partial update for `PATCH /menu/{id}`. Only the fields present are written.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MenuItemUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl MenuItemUpdate {
    /// The `$set` patch: present fields only.
    pub fn into_patch(self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(patch)) => patch,
            _ => Document::new(),
        }
    }
}

// --- Carts & Payments ---

#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct CartQuery {
    /// Owner of the cart lines (`userEmail` on the stored document).
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PaymentIntentRequest {
    /// Order total in dollars.
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
}

/// PaymentReceipt
///
/// Result of `POST /payments`: the payment insert and the cart clean-up.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PaymentReceipt {
    pub payment_result: InsertOutcome,
    pub delete_result: DeleteOutcome,
}

// --- Analytics ---

/// AdminStats
///
/// Dashboard counters for `GET /admin-stats`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AdminStats {
    pub users: i64,
    pub menu_items: i64,
    pub orders: i64,
    pub revenue: f64,
}

/// CategoryStat
///
/// One row of `GET /order-stats`: how many ordered items fell in a menu
/// category and what they earned.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[ts(export)]
pub struct CategoryStat {
    pub category: String,
    pub quantity: i64,
    pub revenue: f64,
}
