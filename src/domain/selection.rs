//! Selection, navigation and editing state of one calendar UI instance.
//!
//! `SelectionMachine::apply` is a pure transition function: it consumes the current
//! `SelectionState`, returns the next one, and describes the I/O it wants performed as
//! `Effect`s. Every appointment fetch is stamped with a sequence number and only the
//! completion carrying the latest sequence is committed.

use crate::domain::models::{
    Appointment, AppointmentFilter, CalendarRange, CalendarView, Category, DayKey, FetchOptions,
    NavDirection, StaffOption, ViewMode,
};
use crate::domain::range::RangeComputer;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    /// Range or filters changed: selection and editing are discarded on commit.
    Navigate,
    /// Same range refreshed in the background: selection and editing survive.
    Reload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchTicket {
    pub sequence: u64,
    pub kind: FetchKind,
    pub mode: ViewMode,
    pub range: CalendarRange,
    pub options: FetchOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchAppointments(FetchTicket),
    FetchStaff {
        mode: ViewMode,
        category: Option<Category>,
    },
    HydrateEditorStaff {
        appointment_id: String,
        category: Category,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    pub mode: ViewMode,
    pub view: CalendarView,
    pub today: NaiveDate,
    pub focus_date: NaiveDate,
    pub selected_day: Option<DayKey>,
    pub selected_appointment_id: Option<String>,
    pub editing_appointment_id: Option<String>,
    pub calendar_filter: AppointmentFilter,
    pub list_filter: AppointmentFilter,
    pub staff_options: Vec<StaffOption>,
    pub editor_staff: Vec<StaffOption>,
    pub editor_error: Option<String>,
    pub appointments: Vec<Appointment>,
    pub committed_range: Option<CalendarRange>,
    pub status: LoadStatus,
    pub sequence: u64,
}

impl SelectionState {
    pub fn initial(today: NaiveDate) -> Self {
        Self {
            mode: ViewMode::List,
            view: CalendarView::Month,
            today,
            focus_date: today,
            selected_day: None,
            selected_appointment_id: None,
            editing_appointment_id: None,
            calendar_filter: AppointmentFilter::default(),
            list_filter: AppointmentFilter::default(),
            staff_options: Vec::new(),
            editor_staff: Vec::new(),
            editor_error: None,
            appointments: Vec::new(),
            committed_range: None,
            status: LoadStatus::Idle,
            sequence: 0,
        }
    }

    pub fn active_filter(&self) -> &AppointmentFilter {
        match self.mode {
            ViewMode::Calendar => &self.calendar_filter,
            ViewMode::List => &self.list_filter,
        }
    }

    fn active_filter_mut(&mut self) -> &mut AppointmentFilter {
        match self.mode {
            ViewMode::Calendar => &mut self.calendar_filter,
            ViewMode::List => &mut self.list_filter,
        }
    }

    /// Whether a completion for `ticket` may still be committed.
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.sequence == self.sequence
    }

    pub fn selected_appointment(&self) -> Option<&Appointment> {
        let id = self.selected_appointment_id.as_deref()?;
        self.appointments.iter().find(|appointment| appointment.id == id)
    }
}

#[derive(Debug, Clone)]
pub enum SelectionEvent {
    /// First render: load the active mode.
    Start,
    SwitchMode(ViewMode),
    SwitchView(CalendarView),
    SetCategory(Option<Category>),
    SetStaff(Option<String>),
    Navigate(NavDirection),
    GoToToday(NaiveDate),
    PickDate(NaiveDate),
    SelectDay(DayKey),
    SelectAppointment {
        id: String,
        day: DayKey,
    },
    ToggleEdit {
        id: String,
        category: Category,
    },
    CloseEditor,
    AppointmentsLoaded {
        ticket: FetchTicket,
        appointments: Vec<Appointment>,
    },
    AppointmentsFailed {
        ticket: FetchTicket,
        message: String,
    },
    /// Staff options fetched for `mode` while its category filter was `category`.
    StaffLoaded {
        mode: ViewMode,
        category: Option<Category>,
        options: Vec<StaffOption>,
    },
    EditorStaffLoaded {
        appointment_id: String,
        options: Vec<StaffOption>,
    },
    UpdateSucceeded {
        id: String,
    },
    UpdateFailed {
        id: String,
        message: String,
    },
    CancelSucceeded {
        id: String,
    },
    CancelFailed {
        id: String,
        message: String,
    },
    RealtimeRefresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: SelectionState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(state: SelectionState) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SelectionMachine {
    ranges: RangeComputer,
    list_horizon_days: u32,
}

impl SelectionMachine {
    pub fn new(ranges: RangeComputer, list_horizon_days: u32) -> Self {
        Self {
            ranges,
            list_horizon_days,
        }
    }

    pub fn ranges(&self) -> &RangeComputer {
        &self.ranges
    }

    /// Range the active mode would fetch for the given state.
    pub fn active_range(&self, state: &SelectionState) -> CalendarRange {
        match state.mode {
            ViewMode::Calendar => self.ranges.compute(state.view, state.focus_date),
            ViewMode::List => self.ranges.list_window(state.today, self.list_horizon_days),
        }
    }

    pub fn apply(&self, mut state: SelectionState, event: SelectionEvent) -> Transition {
        let mut effects = Vec::new();
        match event {
            SelectionEvent::Start => {
                effects.push(staff_effect(&state));
                effects.push(self.fetch(&mut state, FetchKind::Navigate));
            }
            SelectionEvent::SwitchMode(mode) => {
                if mode == state.mode {
                    return Transition::unchanged(state);
                }
                state.mode = mode;
                state.staff_options.clear();
                effects.push(staff_effect(&state));
                effects.push(self.fetch(&mut state, FetchKind::Navigate));
            }
            SelectionEvent::SwitchView(view) => {
                state.view = view;
                state.selected_appointment_id = None;
                state.selected_day = Some(DayKey::from_date(state.focus_date));
                if state.mode == ViewMode::Calendar {
                    effects.push(self.fetch(&mut state, FetchKind::Navigate));
                }
            }
            SelectionEvent::SetCategory(category) => {
                let filter = state.active_filter_mut();
                if filter.category != category {
                    filter.category = category;
                    filter.staff_id = None;
                    effects.push(staff_effect(&state));
                }
                state.selected_appointment_id = None;
                effects.push(self.fetch(&mut state, FetchKind::Navigate));
            }
            SelectionEvent::SetStaff(staff_id) => {
                state.active_filter_mut().staff_id = staff_id;
                state.selected_appointment_id = None;
                effects.push(self.fetch(&mut state, FetchKind::Navigate));
            }
            SelectionEvent::Navigate(direction) => {
                let focus = self
                    .ranges
                    .shift_focus(state.view, state.focus_date, direction);
                effects.push(self.refocus(&mut state, focus));
            }
            SelectionEvent::GoToToday(today) => {
                state.today = today;
                effects.push(self.refocus(&mut state, today));
            }
            SelectionEvent::PickDate(date) => {
                effects.push(self.refocus(&mut state, date));
            }
            SelectionEvent::SelectDay(day) => {
                state.selected_day = Some(day);
                state.selected_appointment_id = None;
            }
            SelectionEvent::SelectAppointment { id, day } => {
                state.selected_day = Some(day);
                state.selected_appointment_id = Some(id);
            }
            SelectionEvent::ToggleEdit { id, category } => {
                if state.editing_appointment_id.as_deref() == Some(id.as_str()) {
                    state.editing_appointment_id = None;
                } else {
                    state.editing_appointment_id = Some(id.clone());
                    state.selected_appointment_id = Some(id.clone());
                    state.editor_staff.clear();
                    effects.push(Effect::HydrateEditorStaff {
                        appointment_id: id,
                        category,
                    });
                }
                state.editor_error = None;
            }
            SelectionEvent::CloseEditor => {
                state.editing_appointment_id = None;
                state.editor_error = None;
            }
            SelectionEvent::AppointmentsLoaded {
                ticket,
                appointments,
            } => {
                if !state.is_current(&ticket) {
                    return Transition::unchanged(state);
                }
                self.commit(&mut state, ticket, appointments);
            }
            SelectionEvent::AppointmentsFailed { ticket, message } => {
                if !state.is_current(&ticket) {
                    return Transition::unchanged(state);
                }
                state.status = LoadStatus::Failed(message);
            }
            SelectionEvent::StaffLoaded {
                mode,
                category,
                options,
            } => {
                if mode == state.mode && category == state.active_filter().category {
                    state.staff_options = options;
                }
            }
            SelectionEvent::EditorStaffLoaded {
                appointment_id,
                options,
            } => {
                if state.editing_appointment_id.as_deref() == Some(appointment_id.as_str()) {
                    state.editor_staff = options;
                }
            }
            SelectionEvent::UpdateSucceeded { id } => {
                if state.editing_appointment_id.as_deref() == Some(id.as_str()) {
                    state.editing_appointment_id = None;
                }
                state.editor_error = None;
                effects.push(self.fetch(&mut state, FetchKind::Reload));
            }
            SelectionEvent::CancelSucceeded { id } => {
                if state.editing_appointment_id.as_deref() == Some(id.as_str()) {
                    state.editing_appointment_id = None;
                }
                if state.selected_appointment_id.as_deref() == Some(id.as_str()) {
                    state.selected_appointment_id = None;
                }
                state.editor_error = None;
                effects.push(self.fetch(&mut state, FetchKind::Reload));
            }
            SelectionEvent::UpdateFailed { message, .. }
            | SelectionEvent::CancelFailed { message, .. } => {
                state.editor_error = Some(message);
            }
            SelectionEvent::RealtimeRefresh => {
                effects.push(self.fetch(&mut state, FetchKind::Reload));
            }
        }
        Transition { state, effects }
    }

    fn refocus(&self, state: &mut SelectionState, focus: NaiveDate) -> Effect {
        state.focus_date = focus;
        state.selected_day = Some(DayKey::from_date(focus));
        state.selected_appointment_id = None;
        self.fetch(state, FetchKind::Navigate)
    }

    fn fetch(&self, state: &mut SelectionState, kind: FetchKind) -> Effect {
        state.sequence += 1;
        if kind == FetchKind::Navigate {
            state.appointments.clear();
        }
        state.status = LoadStatus::Loading;

        let filter = state.active_filter();
        Effect::FetchAppointments(FetchTicket {
            sequence: state.sequence,
            kind,
            mode: state.mode,
            range: self.active_range(state),
            options: FetchOptions {
                category: filter.category,
                staff_id: filter.staff_id.clone(),
                include_past: state.mode == ViewMode::Calendar,
            },
        })
    }

    fn commit(&self, state: &mut SelectionState, ticket: FetchTicket, appointments: Vec<Appointment>) {
        let day_in_range = state
            .selected_day
            .is_some_and(|day| self.ranges.contains_day(&ticket.range, day));
        if !day_in_range {
            state.selected_day = Some(DayKey::from_date(state.focus_date));
        }
        let range_changed = state
            .committed_range
            .as_ref()
            .is_none_or(|committed| !committed.same_span(&ticket.range));
        if ticket.kind == FetchKind::Navigate || range_changed {
            state.selected_appointment_id = None;
            state.editing_appointment_id = None;
        }
        state.appointments = appointments;
        state.committed_range = Some(ticket.range);
        state.status = LoadStatus::Ready;
    }
}

fn staff_effect(state: &SelectionState) -> Effect {
    Effect::FetchStaff {
        mode: state.mode,
        category: state.active_filter().category,
    }
}
