//! `PostgreSQL` [`BookStore`] backed by a `sqlx` connection pool.

use async_trait::async_trait;
use catalog_core::{BookId, BookPayload, BookRecord};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::traits::BookStore;

const SELECT_COLUMNS: &str = "SELECT id, isbn, title, author, price FROM books";

/// Row shape of the `books` table.
#[derive(Debug, sqlx::FromRow)]
struct BookRow {
    id: i32,
    isbn: String,
    title: String,
    author: String,
    price: f64,
}

impl From<BookRow> for BookRecord {
    fn from(row: BookRow) -> Self {
        Self {
            id: row.id,
            isbn: row.isbn,
            title: row.title,
            author: row.author,
            price: row.price,
        }
    }
}

/// Book records persisted in the `books` table.
///
/// Ids come from the table's `SERIAL` sequence. `find_all` orders by id.
pub struct PostgresBookStore {
    pool: PgPool,
}

impl PostgresBookStore {
    /// Opens a pool against `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or the URL is invalid.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookStore for PostgresBookStore {
    async fn find_by_id(&self, id: BookId) -> anyhow::Result<Option<BookRecord>> {
        let row = sqlx::query_as::<_, BookRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(BookRecord::from))
    }

    async fn find_all(&self) -> anyhow::Result<Vec<BookRecord>> {
        let rows = sqlx::query_as::<_, BookRow>(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(BookRecord::from).collect())
    }

    async fn insert(&self, book: BookPayload) -> anyhow::Result<BookRecord> {
        let row = sqlx::query_as::<_, BookRow>(
            "INSERT INTO books (isbn, title, author, price) VALUES ($1, $2, $3, $4) \
             RETURNING id, isbn, title, author, price",
        )
        .bind(&book.isbn)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.price)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update(&self, book: BookRecord) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE books SET isbn = $2, title = $3, author = $4, price = $5 WHERE id = $1",
        )
        .bind(book.id)
        .bind(&book.isbn)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.price)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: BookId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                id SERIAL PRIMARY KEY,
                isbn TEXT NOT NULL,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                price DOUBLE PRECISION NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("books table ready");
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_converts_to_record() {
        let row = BookRow {
            id: 3,
            isbn: "X".to_string(),
            title: "T1".to_string(),
            author: "a".to_string(),
            price: 9.99,
        };
        let record = BookRecord::from(row);
        assert_eq!(record.id, 3);
        assert_eq!(record.title, "T1");
    }

    /// Requires a reachable database in `CATALOG_TEST_DATABASE_URL`.
    #[tokio::test]
    #[ignore = "needs a PostgreSQL instance"]
    async fn crud_against_live_database() {
        let url = std::env::var("CATALOG_TEST_DATABASE_URL").unwrap();
        let store = PostgresBookStore::connect(&url, 2).await.unwrap();
        store.initialize().await.unwrap();

        let stored = store
            .insert(BookPayload {
                id: None,
                isbn: "X".to_string(),
                title: "T1".to_string(),
                author: "a".to_string(),
                price: 9.99,
            })
            .await
            .unwrap();
        assert_eq!(store.find_by_id(stored.id).await.unwrap(), Some(stored.clone()));
        assert!(store.delete(stored.id).await.unwrap());
        assert!(store.find_by_id(stored.id).await.unwrap().is_none());
        store.close().await.unwrap();
    }
}
