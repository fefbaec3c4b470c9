pub mod directory;
pub mod guard;
