use crate::models::{
    ADMIN_ROLE, AdminStats, CategoryStat, DeleteOutcome, Document, DocumentRow, StoredDocument, UpdateOutcome,
    UserRecord,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, types::Json};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// RepositoryError
///
/// Failure of the underlying store. Handlers turn it into a 500, the admin
/// gate into `Unavailable`.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// Abstract contract for every persistence operation, so handlers and the
/// authorization gate never see the concrete store. Tests swap in in-memory fakes.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    /// The only read the admin gate performs. Never cached.
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<UserRecord>>;
    async fn list_users(&self) -> RepoResult<Vec<StoredDocument>>;
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<StoredDocument>>;
    async fn insert_user(&self, user: Document) -> RepoResult<Uuid>;
    /// Sets `role = "admin"`. Promoting an admin again reports `modified_count == 0`.
    async fn promote_user(&self, id: Uuid) -> RepoResult<UpdateOutcome>;
    async fn delete_user(&self, id: Uuid) -> RepoResult<DeleteOutcome>;

    // --- Menu & Reviews ---
    async fn list_menu(&self) -> RepoResult<Vec<StoredDocument>>;
    async fn get_menu_item(&self, id: Uuid) -> RepoResult<Option<StoredDocument>>;
    async fn insert_menu_item(&self, item: Document) -> RepoResult<Uuid>;
    async fn update_menu_item(&self, id: Uuid, patch: Document) -> RepoResult<UpdateOutcome>;
    async fn delete_menu_item(&self, id: Uuid) -> RepoResult<DeleteOutcome>;
    async fn list_reviews(&self) -> RepoResult<Vec<StoredDocument>>;

    // --- Carts ---
    async fn list_cart(&self, user_email: &str) -> RepoResult<Vec<StoredDocument>>;
    async fn insert_cart_item(&self, item: Document) -> RepoResult<Uuid>;
    async fn delete_cart_item(&self, id: Uuid) -> RepoResult<DeleteOutcome>;

    // --- Payments ---
    async fn list_payments(&self, email: &str) -> RepoResult<Vec<StoredDocument>>;
    /// Inserts the payment and removes the paid cart lines as one unit.
    async fn record_payment(
        &self,
        payment: Document,
        cart_ids: Vec<Uuid>,
    ) -> RepoResult<(Uuid, DeleteOutcome)>;

    // --- Analytics ---
    async fn admin_stats(&self) -> RepoResult<AdminStats>;
    async fn order_stats(&self) -> RepoResult<Vec<CategoryStat>>;
}

/// RepositoryState
///
/// The shared handle injected into `AppState` at startup.
pub type RepositoryState = Arc<dyn Repository>;

// Collection tables. Each is `(id UUID PRIMARY KEY, doc JSONB NOT NULL)`.
const USERS: &str = "users";
const MENU: &str = "menu";
const REVIEWS: &str = "reviews";
const CARTS: &str = "carts";
const PAYMENTS: &str = "payments";

/// PostgresRepository
///
/// `Repository` backed by one JSONB table per collection.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_all(&self, table: &str) -> RepoResult<Vec<StoredDocument>> {
        let sql = format!("SELECT id, doc FROM {table} ORDER BY created_at ASC");
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StoredDocument::from).collect())
    }

    /// Every document whose top-level `field` equals `value`.
    async fn find_by_field(
        &self,
        table: &str,
        field: &str,
        value: &str,
    ) -> RepoResult<Vec<StoredDocument>> {
        let sql =
            format!("SELECT id, doc FROM {table} WHERE doc->>$1 = $2 ORDER BY created_at ASC");
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(field)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StoredDocument::from).collect())
    }

    async fn find_one(&self, table: &str, id: Uuid) -> RepoResult<Option<StoredDocument>> {
        let sql = format!("SELECT id, doc FROM {table} WHERE id = $1");
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(StoredDocument::from))
    }

    async fn insert_one(&self, table: &str, doc: Document) -> RepoResult<Uuid> {
        let id = Uuid::new_v4();
        let sql = format!("INSERT INTO {table} (id, doc) VALUES ($1, $2)");
        sqlx::query(&sql)
            .bind(id)
            .bind(Json(doc))
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    /// Merges `patch` into the document (`$set` semantics). The sub-select
    /// sees the row before the update, which tells matched from modified.
    async fn set_fields(&self, table: &str, id: Uuid, patch: Document) -> RepoResult<UpdateOutcome> {
        let sql = format!(
            "UPDATE {table} AS t SET doc = t.doc || $2 \
             FROM (SELECT id, doc @> $2 AS unchanged FROM {table} WHERE id = $1) AS prev \
             WHERE t.id = prev.id \
             RETURNING prev.unchanged"
        );
        let unchanged: Option<bool> = sqlx::query_scalar(&sql)
            .bind(id)
            .bind(Json(Value::Object(patch)))
            .fetch_optional(&self.pool)
            .await?;

        Ok(match unchanged {
            None => UpdateOutcome::default(),
            Some(unchanged) => UpdateOutcome {
                matched_count: 1,
                modified_count: u64::from(!unchanged),
            },
        })
    }

    async fn delete_one(&self, table: &str, id: Uuid) -> RepoResult<DeleteOutcome> {
        let sql = format!("DELETE FROM {table} WHERE id = $1");
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(DeleteOutcome {
            deleted_count: result.rows_affected(),
        })
    }

    async fn count(&self, table: &str) -> RepoResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?)
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, doc FROM users WHERE doc->>'email' = $1 ORDER BY created_at ASC LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(StoredDocument::from)
            .as_ref()
            .and_then(UserRecord::from_document))
    }

    async fn list_users(&self) -> RepoResult<Vec<StoredDocument>> {
        self.find_all(USERS).await
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<StoredDocument>> {
        self.find_one(USERS, id).await
    }

    async fn insert_user(&self, user: Document) -> RepoResult<Uuid> {
        self.insert_one(USERS, user).await
    }

    async fn promote_user(&self, id: Uuid) -> RepoResult<UpdateOutcome> {
        let mut patch = Document::new();
        patch.insert("role".into(), Value::from(ADMIN_ROLE));
        self.set_fields(USERS, id, patch).await
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<DeleteOutcome> {
        self.delete_one(USERS, id).await
    }

    async fn list_menu(&self) -> RepoResult<Vec<StoredDocument>> {
        self.find_all(MENU).await
    }

    async fn get_menu_item(&self, id: Uuid) -> RepoResult<Option<StoredDocument>> {
        self.find_one(MENU, id).await
    }

    async fn insert_menu_item(&self, item: Document) -> RepoResult<Uuid> {
        self.insert_one(MENU, item).await
    }

    async fn update_menu_item(&self, id: Uuid, patch: Document) -> RepoResult<UpdateOutcome> {
        self.set_fields(MENU, id, patch).await
    }

    async fn delete_menu_item(&self, id: Uuid) -> RepoResult<DeleteOutcome> {
        self.delete_one(MENU, id).await
    }

    async fn list_reviews(&self) -> RepoResult<Vec<StoredDocument>> {
        self.find_all(REVIEWS).await
    }

    async fn list_cart(&self, user_email: &str) -> RepoResult<Vec<StoredDocument>> {
        self.find_by_field(CARTS, "userEmail", user_email).await
    }

    async fn insert_cart_item(&self, item: Document) -> RepoResult<Uuid> {
        self.insert_one(CARTS, item).await
    }

    async fn delete_cart_item(&self, id: Uuid) -> RepoResult<DeleteOutcome> {
        self.delete_one(CARTS, id).await
    }

    async fn list_payments(&self, email: &str) -> RepoResult<Vec<StoredDocument>> {
        self.find_by_field(PAYMENTS, "email", email).await
    }

    async fn record_payment(
        &self,
        payment: Document,
        cart_ids: Vec<Uuid>,
    ) -> RepoResult<(Uuid, DeleteOutcome)> {
        let mut tx = self.pool.begin().await?;

        let payment_id = Uuid::new_v4();
        sqlx::query("INSERT INTO payments (id, doc) VALUES ($1, $2)")
            .bind(payment_id)
            .bind(Json(payment))
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM carts WHERE id = ANY($1)")
            .bind(&cart_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((
            payment_id,
            DeleteOutcome {
                deleted_count: deleted.rows_affected(),
            },
        ))
    }

    async fn admin_stats(&self) -> RepoResult<AdminStats> {
        let users = self.count(USERS).await?;
        let menu_items = self.count(MENU).await?;
        let orders = self.count(PAYMENTS).await?;

        // Non-numeric prices are ignored, as a `$sum` would.
        let revenue: f64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM((doc->>'price')::float8), 0)::float8
            FROM payments
            WHERE jsonb_typeof(doc->'price') = 'number'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AdminStats {
            users,
            menu_items,
            orders,
            revenue,
        })
    }

    async fn order_stats(&self) -> RepoResult<Vec<CategoryStat>> {
        // Expand each payment's distinct menuItemIds, join the menu, keep
        // categorized items, then group by category. An id listed twice in one
        // payment counts once.
        let stats = sqlx::query_as::<_, CategoryStat>(
            r#"
            SELECT
                m.doc->>'category' AS category,
                COUNT(*) AS quantity,
                COALESCE(SUM(
                    CASE WHEN jsonb_typeof(m.doc->'price') = 'number'
                         THEN (m.doc->>'price')::float8 ELSE 0 END
                ), 0)::float8 AS revenue
            FROM payments p
            CROSS JOIN LATERAL (
                SELECT DISTINCT menu_id
                FROM jsonb_array_elements_text(
                    CASE WHEN jsonb_typeof(p.doc->'menuItemIds') = 'array'
                         THEN p.doc->'menuItemIds' ELSE '[]'::jsonb END
                ) AS ids(menu_id)
            ) AS item
            JOIN menu m ON m.id::text = item.menu_id
            WHERE m.doc->>'category' IS NOT NULL
            GROUP BY m.doc->>'category'
            ORDER BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(stats)
    }
}
