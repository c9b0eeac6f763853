pub mod prime;
pub mod slot_index;

pub use prime::{is_prime, next_prime};
pub use slot_index::{SlotIndex, SlotIndexer};
