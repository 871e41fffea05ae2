use sqlx::{sqlite::SqliteRow, Row};

use protogas_core::domain::customer::{Customer, CustomerId, CustomerUpsert};

use super::{
    encode_timestamp, parse_timestamp, parse_uuid, stored_now, CustomerRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, phone, address, email, created_at, updated_at
             FROM customers
             WHERE phone = ?",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        row.map(customer_from_row).transpose()
    }

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, phone, address, email, created_at, updated_at
             FROM customers
             WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(customer_from_row).transpose()
    }

    async fn upsert(&self, customer: CustomerUpsert) -> Result<Customer, RepositoryError> {
        let now = encode_timestamp(stored_now());

        let row = sqlx::query(
            "INSERT INTO customers (id, name, phone, address, email, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(phone) DO UPDATE SET
                name = excluded.name,
                address = excluded.address,
                email = excluded.email,
                updated_at = excluded.updated_at
             RETURNING id, name, phone, address, email, created_at, updated_at",
        )
        .bind(CustomerId::new().to_string())
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(customer.email.as_deref())
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        customer_from_row(row)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

fn customer_from_row(row: SqliteRow) -> Result<Customer, RepositoryError> {
    Ok(Customer {
        id: CustomerId(parse_uuid("id", row.try_get("id")?)?),
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        email: row.try_get("email")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
