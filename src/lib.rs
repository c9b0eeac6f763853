//! tablecache: process-local cache of `u64`-keyed records organized in named,
//! lock-striped tables, with a background sweeper that ages and expires them.
//!
//! ## Layers
//!
//! ```text
//!   Store<V>            named registry + maintenance thread      (store)
//!     └─ Table<V>       buckets → optional collision pages       (table)
//!          └─ Record<V> value, policy, age, hit count            (table::record)
//!
//!   ComplexKeyAdapter   arbitrary keys → bounded key chain       (complex)
//! ```
//!
//! ## Quick start
//!
//! ```
//! use tablecache::prelude::*;
//!
//! let store: Store<String> = StoreBuilder::new("app").try_build().unwrap();
//! let users = store.table("users");
//!
//! users.put_with(42, "alice".to_string(), &PutPolicy::default().with_max_age(120));
//! assert_eq!(*users.get(42).unwrap().value(), "alice");
//!
//! let adapter = ComplexKeyAdapter::new();
//! adapter.put(&users, &"bob@example.com".to_string(), "bob".to_string());
//! assert!(adapter.get(&users, &"bob@example.com".to_string()).is_some());
//! ```

pub mod builder;
pub mod complex;
pub mod ds;
pub mod error;
pub mod metrics;
pub mod options;
pub mod prelude;
pub mod store;
pub mod table;
pub mod traits;

pub use builder::StoreBuilder;
pub use complex::{ComplexKeyAdapter, HashProjector, KeyProjector, SuffixProjector};
pub use error::{CacheError, ConfigError};
pub use options::{StoreOptions, TableOptions};
pub use store::Store;
pub use table::{PutOutcome, PutPolicy, PutResult, Record, Table};
pub use traits::CacheValue;
