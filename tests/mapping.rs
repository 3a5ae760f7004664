#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rust_decimal::Decimal;
    use sluice::{Database, FromRow, QueryConfig, QueryErrorKind, Result, RowLabeled, Value};
    use sluice_scripted::{ResultSet, ScriptedDriver, Statement, init_logs};
    use std::str::FromStr;
    use time::{Date, PrimitiveDateTime, macros::date, macros::datetime};
    use uuid::Uuid;

    const ORDERS: &str = indoc! {"
        SELECT id, customer, total, placed_on, shipped_at, notes
        FROM orders
        ORDER BY id
    "};

    #[derive(Debug, PartialEq)]
    struct Order {
        id: Uuid,
        customer: String,
        total: Decimal,
        placed_on: Date,
        shipped_at: Option<PrimitiveDateTime>,
        notes: Option<String>,
    }

    impl FromRow for Order {
        fn from_row(row: RowLabeled) -> Result<Self> {
            Ok(Self {
                id: row.decode_column("id")?,
                customer: row.decode_column("customer")?,
                total: row.decode_column("total")?,
                placed_on: row.decode_column("placed_on")?,
                shipped_at: row.decode_column("shipped_at")?,
                notes: row.decode_column("notes")?,
            })
        }
    }

    fn orders() -> ResultSet {
        ResultSet::new(["id", "customer", "total", "placed_on", "shipped_at", "notes"])
            .row([
                Value::Varchar(Some("67e55044-10b1-426f-9247-bb680e5fe0c8".into())),
                Value::Varchar(Some("ACME".into())),
                Value::Decimal(Some(Decimal::from_str("1250.50").unwrap())),
                Value::Date(Some(date!(2025 - 03 - 14))),
                Value::Timestamp(Some(datetime!(2025-03-15 09:30:00))),
                Value::Varchar(None),
            ])
            .row([
                Value::Uuid(Some(Uuid::nil())),
                Value::Varchar(Some("Initech".into())),
                Value::Int64(Some(80)),
                Value::Timestamp(Some(datetime!(2025-04-01 18:00:00))),
                Value::Timestamp(None),
                Value::Varchar(Some("Leave at the door".into())),
            ])
    }

    fn database() -> Database<ScriptedDriver> {
        init_logs();
        let driver = ScriptedDriver::new()
            .on(ORDERS, Statement::rows(orders()))
            .on("SELECT total FROM orders", Statement::rows(orders()))
            .on(
                "SELECT customer FROM orders WHERE id = ?",
                Statement::rows(
                    ResultSet::new(["customer"]).row([Value::Varchar(Some("ACME".into()))]),
                ),
            )
            .on(
                "SELECT customer FROM orders WHERE id = -1",
                Statement::rows(ResultSet::new(["customer"])),
            );
        Database::new(driver, QueryConfig::default())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn hand_written_decoder() {
        let db = database();
        let orders = db
            .query(ORDERS)
            .fetch_all::<Order>()
            .await
            .expect("Could not fetch the orders");
        assert_eq!(
            orders,
            [
                Order {
                    id: Uuid::from_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap(),
                    customer: "ACME".into(),
                    total: Decimal::from_str("1250.50").unwrap(),
                    placed_on: date!(2025 - 03 - 14),
                    shipped_at: Some(datetime!(2025-03-15 09:30:00)),
                    notes: None,
                },
                Order {
                    id: Uuid::nil(),
                    customer: "Initech".into(),
                    total: Decimal::from(80),
                    placed_on: date!(2025 - 04 - 01),
                    shipped_at: None,
                    notes: Some("Leave at the door".into()),
                },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tuples_and_scalars() {
        let db = database();
        let pairs = db
            .query(ORDERS)
            .fetch_all::<(Uuid, String)>()
            .await
            .expect("Could not fetch the orders");
        assert_eq!(pairs[1], (Uuid::nil(), "Initech".to_string()));
        let total = db
            .query("SELECT total FROM orders")
            .fetch_scalar::<Decimal>()
            .await
            .expect("Could not fetch the total");
        assert_eq!(total, Some(Decimal::from_str("1250.50").unwrap()));
        let customer = db
            .query("SELECT customer FROM orders WHERE id = ?")
            .bind(Uuid::nil())
            .fetch_one::<(String,)>()
            .await
            .expect("Could not fetch the customer");
        assert_eq!(customer.0, "ACME");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn row_counts() {
        let db = database();
        let error = db
            .query(ORDERS)
            .fetch_optional::<Order>()
            .await
            .expect_err("Two rows are not optional");
        assert_eq!(error.kind(), QueryErrorKind::Driver);
        let first = db
            .query(ORDERS)
            .fetch_first::<Order>()
            .await
            .expect("Could not fetch the first order");
        assert_eq!(first.map(|v| v.customer), Some("ACME".to_string()));
        let none = db
            .query("SELECT customer FROM orders WHERE id = -1")
            .fetch_optional::<(String,)>()
            .await
            .expect("No rows is a valid result");
        assert_eq!(none, None);
        let error = db
            .query("SELECT customer FROM orders WHERE id = -1")
            .fetch_one::<(String,)>()
            .await
            .expect_err("One row is required");
        assert!(error.to_string().contains("returned none"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn decoding_errors_pass_through() {
        let db = database();
        let error = db
            .query(ORDERS)
            .fetch_all::<(i32,)>()
            .await
            .expect_err("An uuid is not an integer");
        assert_eq!(error.kind(), QueryErrorKind::Driver);
        assert!(error.to_string().contains("While decoding column 0"));
    }
}
