pub mod inspector;
pub mod overview;
