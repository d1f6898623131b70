//! Book record persistence.
//!
//! - [`engines`]: in-process stores ([`HashMapBookStore`])
//! - [`datastores`]: external backends (`PostgresBookStore`, feature `postgres`)
//!
//! All stores implement [`BookStore`](crate::traits::BookStore).

pub mod datastores;
pub mod engines;

pub use datastores::*;
pub use engines::*;
