pub mod booking;
pub mod history;
pub mod lifecycle;
pub mod store;

pub use booking::AppointmentService;
pub use lifecycle::{next_status, ActingCapacity, Transition};
