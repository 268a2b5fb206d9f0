//! Calendar visualization engine for the salon booking backend.
//!
//! Derives visible date ranges in the business timezone, packs overlapping
//! appointments into lanes, and drives selection and navigation state with a
//! latest-request-wins fetch rule. Booking data comes from a `BookingClient`
//! collaborator; push notifications are bridged in by `RealtimeSyncBridge`.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::controller::{CalendarController, CalendarSnapshot, Reconciler};
pub use application::realtime::{ChannelMessage, Notifier, PushSubscription, RealtimeSyncBridge};
pub use domain::layout::{DayLayout, DisplayWindow, LanePosition, LayoutEvent, layout_day, layout_days};
pub use domain::local_calendar::{BUSINESS_TIMEZONE, LocalCalendar};
pub use domain::models::{
    Appointment, AppointmentStatus, AppointmentUpdate, CalendarRange, CalendarView, CancelRequest,
    Category, DayKey, FetchOptions, NavDirection, StaffOption, ViewMode,
};
pub use domain::range::RangeComputer;
pub use domain::selection::{SelectionEvent, SelectionMachine, SelectionState};
pub use infrastructure::booking_client::{BookingClient, ReqwestBookingClient};
pub use infrastructure::config::{EngineConfig, ensure_default_config, load_config};
pub use infrastructure::error::EngineError;
