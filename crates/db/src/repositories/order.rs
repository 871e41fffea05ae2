use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use protogas_core::domain::customer::CustomerId;
use protogas_core::domain::order::{CylinderSize, NewOrder, Order, OrderId, OrderStatus};

use super::{
    encode_timestamp, parse_timestamp, parse_u32, parse_uuid, stored_now, OrderRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn insert(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let order = order.into_order(stored_now());

        sqlx::query(
            "INSERT INTO orders (
                id,
                customer_id,
                cylinder_size,
                quantity,
                unit_price,
                total_amount,
                delivery_date,
                notes,
                status,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order.id.to_string())
        .bind(order.customer_id.to_string())
        .bind(order.cylinder_size.as_str())
        .bind(i64::from(order.quantity))
        .bind(order.unit_price.to_string())
        .bind(order.total_amount.to_string())
        .bind(order.delivery_date.as_deref())
        .bind(order.notes.as_deref())
        .bind(order.status.as_str())
        .bind(encode_timestamp(order.created_at))
        .execute(&self.pool)
        .await?;

        Ok(order)
    }

    async fn find_latest_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                customer_id,
                cylinder_size,
                quantity,
                unit_price,
                total_amount,
                delivery_date,
                notes,
                status,
                created_at
             FROM orders
             WHERE customer_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
        )
        .bind(customer_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(order_from_row).transpose()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

fn order_from_row(row: SqliteRow) -> Result<Order, RepositoryError> {
    let cylinder_size: String = row.try_get("cylinder_size")?;
    let cylinder_size = CylinderSize::parse(&cylinder_size).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown cylinder size `{cylinder_size}`"))
    })?;
    let status: String = row.try_get("status")?;

    Ok(Order {
        id: OrderId(parse_uuid("id", row.try_get("id")?)?),
        customer_id: CustomerId(parse_uuid("customer_id", row.try_get("customer_id")?)?),
        cylinder_size,
        quantity: parse_u32("quantity", row.try_get("quantity")?)?,
        unit_price: parse_decimal("unit_price", row.try_get("unit_price")?)?,
        total_amount: parse_decimal("total_amount", row.try_get("total_amount")?)?,
        delivery_date: row.try_get("delivery_date")?,
        notes: row.try_get("notes")?,
        status: OrderStatus::parse(&status),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use protogas_core::domain::customer::{CustomerId, CustomerUpsert};
    use protogas_core::domain::order::{CylinderSize, NewOrder, OrderStatus};

    use super::SqlOrderRepository;
    use crate::repositories::{CustomerRepository, OrderRepository, SqlCustomerRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> Result<(DbPool, CustomerId), Box<dyn std::error::Error>> {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await?;
        migrations::run_pending(&pool).await?;
        let customer = SqlCustomerRepository::new(pool.clone())
            .upsert(CustomerUpsert {
                name: "Asha".to_string(),
                phone: "+254712345678".to_string(),
                address: "Kilimani".to_string(),
                email: None,
            })
            .await?;
        Ok((pool, customer.id))
    }

    fn new_order(customer_id: CustomerId, size: CylinderSize, quantity: u32) -> NewOrder {
        NewOrder {
            customer_id,
            cylinder_size: size,
            quantity,
            unit_price: Decimal::new(1200, 0),
            delivery_date: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn insert_persists_pending_order_with_total() -> Result<(), Box<dyn std::error::Error>> {
        let (pool, customer_id) = setup().await?;
        let repo = SqlOrderRepository::new(pool);

        let order = repo.insert(new_order(customer_id, CylinderSize::Kg6, 2)).await?;
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Decimal::new(2400, 0));

        let latest = repo.find_latest_for_customer(&customer_id).await?.ok_or("order missing")?;
        assert_eq!(latest, order);
        Ok(())
    }

    #[tokio::test]
    async fn latest_order_is_most_recent() -> Result<(), Box<dyn std::error::Error>> {
        let (pool, customer_id) = setup().await?;
        let repo = SqlOrderRepository::new(pool);

        repo.insert(new_order(customer_id, CylinderSize::Kg6, 1)).await?;
        let second = repo.insert(new_order(customer_id, CylinderSize::Kg13, 3)).await?;

        let latest = repo.find_latest_for_customer(&customer_id).await?.ok_or("order missing")?;
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.cylinder_size, CylinderSize::Kg13);
        Ok(())
    }

    #[tokio::test]
    async fn unrecognized_status_is_kept_verbatim() -> Result<(), Box<dyn std::error::Error>> {
        let (pool, customer_id) = setup().await?;
        let repo = SqlOrderRepository::new(pool.clone());
        let order = repo.insert(new_order(customer_id, CylinderSize::Kg6, 1)).await?;

        sqlx::query("UPDATE orders SET status = 'awaiting_driver' WHERE id = ?")
            .bind(order.id.to_string())
            .execute(&pool)
            .await?;

        let latest = repo.find_latest_for_customer(&customer_id).await?.ok_or("order missing")?;
        assert_eq!(latest.status, OrderStatus::Unrecognized("awaiting_driver".to_string()));
        assert_eq!(latest.status.spoken_phrase(), "is in progress");
        Ok(())
    }

    #[tokio::test]
    async fn customer_without_orders_has_none() -> Result<(), Box<dyn std::error::Error>> {
        let (pool, customer_id) = setup().await?;
        let repo = SqlOrderRepository::new(pool);
        assert!(repo.find_latest_for_customer(&customer_id).await?.is_none());
        Ok(())
    }
}
