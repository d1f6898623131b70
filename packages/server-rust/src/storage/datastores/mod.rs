//! External [`BookStore`](crate::traits::BookStore) backends.
//!
//! Currently includes [`PostgresBookStore`] behind the `postgres` feature.

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresBookStore;
