pub mod codec;
pub mod fjall;
pub mod keys;
pub mod mem;
pub mod traits;
pub mod txn;
pub mod types;

pub use keys::Table;
pub use traits::Backend;
pub use txn::{Store, Transaction};
pub use types::WriteSet;
