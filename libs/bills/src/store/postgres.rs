//! PostgreSQL backend for the storage port

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{BillMatch, BillStore, PageRequest, Totals, UserDirectory};
use crate::models::{Bill, BillId, MonthlyExpense, User, UserId};

const BILL_COLUMNS: &str = "id, title, amount, description, date, due_date, status, category, \
                            users, created_by, revision, created_at, updated_at";

const USER_COLUMNS: &str = "id, name, email, avatar, created_at, updated_at";

/// Store backed by the `users` and `bills` tables
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct BillRow {
    id: Uuid,
    title: String,
    amount: Decimal,
    description: Option<String>,
    date: NaiveDate,
    due_date: NaiveDate,
    status: String,
    category: String,
    users: Vec<Uuid>,
    created_by: Uuid,
    revision: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BillRow> for Bill {
    type Error = anyhow::Error;

    fn try_from(row: BillRow) -> Result<Self> {
        Ok(Bill {
            id: row.id,
            title: row.title,
            amount: row.amount,
            description: row.description,
            date: row.date,
            due_date: row.due_date,
            status: row.status.parse()?,
            category: row.category.parse()?,
            users: row.users,
            created_by: row.created_by,
            revision: row.revision,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    avatar: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: row.email,
            avatar: row.avatar,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Escape `LIKE` metacharacters so the search term matches literally
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Append the WHERE clause equivalent of [`BillMatch::matches`]
fn push_match(qb: &mut QueryBuilder<'_, Postgres>, filter: &BillMatch) {
    qb.push(" WHERE (created_by = ")
        .push_bind(filter.visible_to)
        .push(" OR ")
        .push_bind(filter.visible_to)
        .push(" = ANY(users))");

    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(category) = filter.category {
        qb.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(from) = filter.date_from {
        qb.push(" AND date >= ").push_bind(from);
    }
    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn list_all(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY name ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE name ILIKE $1 OR email ILIKE $1 \
             ORDER BY name ASC, id ASC LIMIT $2"
        ))
        .bind(like_pattern(query))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }
}

#[async_trait]
impl BillStore for PgStore {
    async fn insert(&self, bill: &Bill) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bills (id, title, amount, description, date, due_date, status, category,
                               users, created_by, revision, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(bill.id)
        .bind(&bill.title)
        .bind(bill.amount)
        .bind(&bill.description)
        .bind(bill.date)
        .bind(bill.due_date)
        .bind(bill.status.as_str())
        .bind(bill.category.as_str())
        .bind(&bill.users)
        .bind(bill.created_by)
        .bind(bill.revision)
        .bind(bill.created_at)
        .bind(bill.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert bill")?;

        Ok(())
    }

    async fn find_by_id(&self, id: BillId) -> Result<Option<Bill>> {
        let row = sqlx::query_as::<_, BillRow>(&format!(
            "SELECT {BILL_COLUMNS} FROM bills WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Bill::try_from).transpose()
    }

    async fn find_page(&self, filter: &BillMatch, page: PageRequest) -> Result<(Vec<Bill>, u64)> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {BILL_COLUMNS} FROM bills"));
        push_match(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit as i64)
            .push(" OFFSET ")
            .push_bind(page.offset as i64);

        let rows: Vec<BillRow> = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bills");
        push_match(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let bills = rows
            .into_iter()
            .map(Bill::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((bills, total as u64))
    }

    async fn update(&self, bill: &Bill, expected_revision: Option<i64>) -> Result<Option<Bill>> {
        let row = sqlx::query_as::<_, BillRow>(&format!(
            r#"
            UPDATE bills
            SET title = $2, amount = $3, description = $4, date = $5, due_date = $6,
                status = $7, category = $8, users = $9, updated_at = $10,
                revision = revision + 1
            WHERE id = $1 AND ($11::BIGINT IS NULL OR revision = $11)
            RETURNING {BILL_COLUMNS}
            "#
        ))
        .bind(bill.id)
        .bind(&bill.title)
        .bind(bill.amount)
        .bind(&bill.description)
        .bind(bill.date)
        .bind(bill.due_date)
        .bind(bill.status.as_str())
        .bind(bill.category.as_str())
        .bind(&bill.users)
        .bind(bill.updated_at)
        .bind(expected_revision)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update bill")?;

        row.map(Bill::try_from).transpose()
    }

    async fn delete(&self, id: BillId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bills WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn totals(&self, filter: &BillMatch) -> Result<Totals> {
        let mut qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*), COALESCE(SUM(amount), 0) FROM bills");
        push_match(&mut qb, filter);

        let (count, sum): (i64, Decimal) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(Totals {
            count: count as u64,
            sum,
        })
    }

    async fn monthly_totals(&self, filter: &BillMatch) -> Result<Vec<MonthlyExpense>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT EXTRACT(YEAR FROM date)::INT AS year, EXTRACT(MONTH FROM date)::INT AS month, \
             SUM(amount) AS amount FROM bills",
        );
        push_match(&mut qb, filter);
        qb.push(" GROUP BY 1, 2 ORDER BY 1 ASC, 2 ASC");

        let rows: Vec<(i32, i32, Decimal)> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(year, month, amount)| MonthlyExpense {
                year,
                month: month as u32,
                amount,
            })
            .collect())
    }
}
