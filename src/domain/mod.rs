pub mod layout;
pub mod local_calendar;
pub mod models;
pub mod range;
pub mod selection;
