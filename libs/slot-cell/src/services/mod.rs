pub mod allocator;
pub mod conflict;
pub mod slot;

pub use allocator::SlotAllocator;
pub use conflict::intervals_conflict;
pub use slot::SlotService;
