pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Appointment, AppointmentCellState, AppointmentError, AppointmentPolicy, AppointmentStatus,
    HistoryAction, HistoryEntry,
};
pub use services::AppointmentService;
