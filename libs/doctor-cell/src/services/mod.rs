pub mod doctor;

pub use doctor::{find_doctor, find_doctor_by_user, DoctorService};
