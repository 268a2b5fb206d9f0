pub mod controller;
pub mod realtime;
