pub mod actions;
pub mod devices;
pub mod doctor;
pub mod onboard;
pub mod run;
