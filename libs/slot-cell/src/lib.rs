pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{LockedSlot, Slot, SlotCellState, SlotError};
pub use services::{intervals_conflict, SlotAllocator, SlotService};
