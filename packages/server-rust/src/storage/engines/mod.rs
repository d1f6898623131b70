//! In-process [`BookStore`](crate::traits::BookStore) implementations.

mod hashmap;

pub use hashmap::HashMapBookStore;
