use crate::domain::layout::{DayLayout, DisplayWindow, layout_day};
use crate::domain::local_calendar::LocalCalendar;
use crate::domain::models::{
    Appointment, AppointmentUpdate, CalendarRange, CancelRequest, Category, DayKey, StaffOption,
    ViewMode,
};
use crate::domain::range::RangeComputer;
use crate::domain::selection::{
    Effect, FetchTicket, SelectionEvent, SelectionMachine, SelectionState,
};
use crate::infrastructure::booking_client::BookingClient;
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::error::EngineError;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub type TodayProvider = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Re-runs the fetch and layout pipeline of the active view without touching selection.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self) -> Result<(), EngineError>;
}

/// Owns one `SelectionState` and executes the effects its transitions ask for.
pub struct CalendarController<C>
where
    C: BookingClient,
{
    client: Arc<C>,
    machine: SelectionMachine,
    window: DisplayWindow,
    lane_gap_percent: f64,
    state: Mutex<SelectionState>,
    today_provider: TodayProvider,
}

impl<C> CalendarController<C>
where
    C: BookingClient,
{
    pub fn new(client: Arc<C>, config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let calendar = config.calendar()?;
        let today_provider: TodayProvider = Arc::new(move || calendar.local_date(Utc::now()));
        let today = today_provider();

        Ok(Self {
            client,
            machine: SelectionMachine::new(RangeComputer::new(calendar), config.list_horizon_days),
            window: config.display_window,
            lane_gap_percent: config.lane_gap_percent,
            state: Mutex::new(SelectionState::initial(today)),
            today_provider,
        })
    }

    /// Replaces the clock and resets to the initial state for the provided "today".
    pub fn with_today_provider(mut self, today_provider: TodayProvider) -> Self {
        self.state = Mutex::new(SelectionState::initial(today_provider()));
        self.today_provider = today_provider;
        self
    }

    pub fn calendar(&self) -> &LocalCalendar {
        self.machine.ranges().calendar()
    }

    pub fn state(&self) -> Result<SelectionState, EngineError> {
        Ok(self.lock_state()?.clone())
    }

    pub async fn start(&self) -> Result<(), EngineError> {
        self.dispatch(SelectionEvent::Start).await
    }

    pub async fn go_to_today(&self) -> Result<(), EngineError> {
        self.dispatch(SelectionEvent::GoToToday((self.today_provider)()))
            .await
    }

    /// Applies `event`, then runs every effect it produced and feeds the completions back in.
    pub async fn dispatch(&self, event: SelectionEvent) -> Result<(), EngineError> {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for effect in self.transition(event)? {
                if let Some(completion) = self.execute(effect).await {
                    queue.push_back(completion);
                }
            }
        }
        Ok(())
    }

    /// Validates locally, sends the update and records the outcome in the editor state.
    pub async fn submit_update(
        &self,
        appointment_id: &str,
        update: &AppointmentUpdate,
    ) -> Result<(), EngineError> {
        let id = appointment_id.to_string();
        if let Err(message) = update.validate() {
            self.dispatch(SelectionEvent::UpdateFailed {
                id,
                message: message.clone(),
            })
            .await?;
            return Err(EngineError::Validation(message));
        }

        match self.client.update_appointment(appointment_id, update).await {
            Ok(()) => {
                info!(appointment_id, "appointment updated");
                self.dispatch(SelectionEvent::UpdateSucceeded { id }).await
            }
            Err(error) => {
                warn!(appointment_id, %error, "appointment update rejected");
                self.dispatch(SelectionEvent::UpdateFailed {
                    id,
                    message: error.user_message(),
                })
                .await?;
                Err(error)
            }
        }
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: &str,
        request: &CancelRequest,
    ) -> Result<(), EngineError> {
        let id = appointment_id.to_string();
        match self.client.cancel_appointment(appointment_id, request).await {
            Ok(()) => {
                info!(appointment_id, "appointment cancelled");
                self.dispatch(SelectionEvent::CancelSucceeded { id }).await
            }
            Err(error) => {
                warn!(appointment_id, %error, "appointment cancel failed");
                self.dispatch(SelectionEvent::CancelFailed {
                    id,
                    message: error.user_message(),
                })
                .await?;
                Err(error)
            }
        }
    }

    /// Everything the render layer needs for one frame.
    pub fn snapshot(&self) -> Result<CalendarSnapshot, EngineError> {
        let state = self.state()?;
        let range = state
            .committed_range
            .clone()
            .unwrap_or_else(|| self.machine.active_range(&state));
        let grid = match state.mode {
            ViewMode::Calendar => self.machine.ranges().days_in(&range),
            ViewMode::List => Vec::new(),
        };
        Ok(CalendarSnapshot {
            state,
            range,
            grid,
            calendar: *self.calendar(),
            window: self.window,
            lane_gap_percent: self.lane_gap_percent,
        })
    }

    fn transition(&self, event: SelectionEvent) -> Result<Vec<Effect>, EngineError> {
        let mut state = self.lock_state()?;
        if let SelectionEvent::AppointmentsLoaded { ticket, .. }
        | SelectionEvent::AppointmentsFailed { ticket, .. } = &event
        {
            if !state.is_current(ticket) {
                debug!(
                    sequence = ticket.sequence,
                    latest = state.sequence,
                    "discarding stale appointments completion"
                );
            }
        }

        let transition = self.machine.apply(state.clone(), event);
        *state = transition.state;
        Ok(transition.effects)
    }

    async fn execute(&self, effect: Effect) -> Option<SelectionEvent> {
        match effect {
            Effect::FetchAppointments(ticket) => Some(self.fetch_appointments(ticket).await),
            Effect::FetchStaff { mode, category } => {
                let options = self.fetch_staff(category).await?;
                Some(SelectionEvent::StaffLoaded {
                    mode,
                    category,
                    options,
                })
            }
            Effect::HydrateEditorStaff {
                appointment_id,
                category,
            } => {
                let options = self.fetch_staff(Some(category)).await?;
                Some(SelectionEvent::EditorStaffLoaded {
                    appointment_id,
                    options,
                })
            }
        }
    }

    async fn fetch_appointments(&self, ticket: FetchTicket) -> SelectionEvent {
        debug!(
            sequence = ticket.sequence,
            kind = ?ticket.kind,
            start = %ticket.range.start,
            end = %ticket.range.end,
            "fetching appointments"
        );
        match self
            .client
            .fetch_appointments(ticket.range.start, ticket.range.end, &ticket.options)
            .await
        {
            Ok(appointments) => SelectionEvent::AppointmentsLoaded {
                ticket,
                appointments,
            },
            Err(error) => {
                warn!(sequence = ticket.sequence, %error, "appointments fetch failed");
                SelectionEvent::AppointmentsFailed {
                    ticket,
                    message: error.user_message(),
                }
            }
        }
    }

    /// Staff for one category, or both when unfiltered. `None` keeps the previous options.
    async fn fetch_staff(&self, category: Option<Category>) -> Option<Vec<StaffOption>> {
        let categories = match category {
            Some(category) => vec![category],
            None => Category::ALL.to_vec(),
        };
        let mut options = Vec::new();
        for category in categories {
            match self.client.fetch_staff(category).await {
                Ok(staff) => options.extend(staff),
                Err(error) => {
                    warn!(category = category.as_str(), %error, "staff fetch failed");
                    return None;
                }
            }
        }
        options.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Some(options)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, SelectionState>, EngineError> {
        self.state.lock().map_err(|error| {
            EngineError::StatePoisoned(format!("selection state lock poisoned: {error}"))
        })
    }
}

#[async_trait]
impl<C> Reconciler for CalendarController<C>
where
    C: BookingClient,
{
    async fn reconcile(&self) -> Result<(), EngineError> {
        self.dispatch(SelectionEvent::RealtimeRefresh).await
    }
}

#[derive(Debug, Clone)]
pub struct CalendarSnapshot {
    pub state: SelectionState,
    pub range: CalendarRange,
    /// Cells of the visible grid; empty in list mode.
    pub grid: Vec<DayKey>,
    calendar: LocalCalendar,
    window: DisplayWindow,
    lane_gap_percent: f64,
}

impl CalendarSnapshot {
    pub fn lane_gap_percent(&self) -> f64 {
        self.lane_gap_percent
    }

    /// Month chips: appointments bucketed by local day, ordered by start.
    pub fn appointments_by_day(&self) -> BTreeMap<DayKey, Vec<&Appointment>> {
        self.calendar.group_by_day(&self.state.appointments)
    }

    /// Lane layout for every grid day, including empty ones.
    pub fn day_layouts(&self) -> Vec<DayLayout<'_>> {
        let mut by_day = self.appointments_by_day();
        self.grid
            .iter()
            .map(|day| DayLayout {
                day: *day,
                events: layout_day(
                    by_day.remove(day).unwrap_or_default(),
                    self.window,
                    &self.calendar,
                ),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        AppointmentStatus, CalendarView, FetchOptions, NavDirection,
    };
    use crate::domain::selection::LoadStatus;
    use chrono::{DateTime, Duration};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[derive(Debug, Default)]
    struct FakeBookingClient {
        appointments: Mutex<HashMap<DateTime<Utc>, Vec<Appointment>>>,
        holds: Mutex<HashMap<DateTime<Utc>, oneshot::Receiver<()>>>,
        fail_fetches: Mutex<bool>,
        update_result: Mutex<Option<EngineError>>,
        fetch_calls: AtomicUsize,
        staff_calls: AtomicUsize,
        update_calls: AtomicUsize,
        last_options: Mutex<Option<FetchOptions>>,
    }

    impl FakeBookingClient {
        fn serve(&self, range_start: DateTime<Utc>, appointments: Vec<Appointment>) {
            self.appointments
                .lock()
                .expect("appointments mutex poisoned")
                .insert(range_start, appointments);
        }

        fn hold(&self, range_start: DateTime<Utc>, release: oneshot::Receiver<()>) {
            self.holds
                .lock()
                .expect("holds mutex poisoned")
                .insert(range_start, release);
        }
    }

    #[async_trait]
    impl BookingClient for FakeBookingClient {
        async fn fetch_appointments(
            &self,
            start: DateTime<Utc>,
            _end: DateTime<Utc>,
            options: &FetchOptions,
        ) -> Result<Vec<Appointment>, EngineError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_options.lock().expect("options mutex poisoned") = Some(options.clone());

            let hold = self.holds.lock().expect("holds mutex poisoned").remove(&start);
            if let Some(release) = hold {
                let _ = release.await;
            }
            if *self.fail_fetches.lock().expect("fail mutex poisoned") {
                return Err(EngineError::Network("connection reset".to_string()));
            }
            Ok(self
                .appointments
                .lock()
                .expect("appointments mutex poisoned")
                .get(&start)
                .cloned()
                .unwrap_or_default())
        }

        async fn fetch_staff(&self, category: Category) -> Result<Vec<StaffOption>, EngineError> {
            self.staff_calls.fetch_add(1, Ordering::SeqCst);
            let name = match category {
                Category::Men => "Mert",
                Category::Women => "Ece",
            };
            Ok(vec![StaffOption {
                id: format!("stf-{}", category.as_str()),
                full_name: name.to_string(),
                category,
            }])
        }

        async fn update_appointment(
            &self,
            _appointment_id: &str,
            _update: &AppointmentUpdate,
        ) -> Result<(), EngineError> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            match self.update_result.lock().expect("update mutex poisoned").take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        async fn cancel_appointment(
            &self,
            _appointment_id: &str,
            _request: &CancelRequest,
        ) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date")
    }

    // Local month grid starts for March, April and May 2024
    fn march_grid() -> DateTime<Utc> {
        fixed_time("2024-02-25T21:00:00Z")
    }

    fn april_grid() -> DateTime<Utc> {
        fixed_time("2024-03-31T21:00:00Z")
    }

    fn may_grid() -> DateTime<Utc> {
        fixed_time("2024-04-28T21:00:00Z")
    }

    fn appointment(id: &str, starts_at: DateTime<Utc>, minutes: i64) -> Appointment {
        Appointment {
            id: id.to_string(),
            category: Category::Women,
            starts_at,
            ends_at: starts_at + Duration::minutes(minutes),
            status: AppointmentStatus::Booked,
            staff_id: Some("stf-women".to_string()),
            customer_full_name: format!("Customer {id}"),
            customer_phone: None,
            customer_email: None,
            notes: None,
            services: Vec::new(),
        }
    }

    fn controller(client: Arc<FakeBookingClient>) -> CalendarController<FakeBookingClient> {
        CalendarController::new(client, &EngineConfig::default())
            .expect("default config is valid")
            .with_today_provider(Arc::new(today))
    }

    async fn calendar_with_selection(
        client: &Arc<FakeBookingClient>,
    ) -> CalendarController<FakeBookingClient> {
        client.serve(
            march_grid(),
            vec![appointment("apt-1", fixed_time("2024-03-01T06:00:00Z"), 40)],
        );
        let controller = controller(Arc::clone(client));
        controller
            .dispatch(SelectionEvent::SwitchMode(ViewMode::Calendar))
            .await
            .expect("switch to calendar");
        controller
            .dispatch(SelectionEvent::SelectAppointment {
                id: "apt-1".to_string(),
                day: DayKey::from_date(today()),
            })
            .await
            .expect("select appointment");
        controller
            .dispatch(SelectionEvent::ToggleEdit {
                id: "apt-1".to_string(),
                category: Category::Women,
            })
            .await
            .expect("open editor");
        controller
    }

    fn valid_update() -> AppointmentUpdate {
        AppointmentUpdate {
            staff_id: Some("stf-women".to_string()),
            starts_at: fixed_time("2024-03-01T07:00:00Z"),
            ends_at: fixed_time("2024-03-01T07:40:00Z"),
            customer_full_name: "Customer apt-1".to_string(),
            customer_phone: None,
            customer_email: None,
            notes: None,
        }
    }

    #[test]
    fn poisoned_state_lock_is_reported() {
        let controller = controller(Arc::new(FakeBookingClient::default()));
        std::thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = controller.state.lock().expect("first lock");
                    panic!("poison the selection state");
                })
                .join();
        });

        assert!(matches!(
            controller.state(),
            Err(EngineError::StatePoisoned(_))
        ));
    }

    #[tokio::test]
    async fn start_loads_list_window_and_all_staff() {
        let client = Arc::new(FakeBookingClient::default());
        client.serve(
            fixed_time("2024-02-29T21:00:00Z"),
            vec![appointment("upcoming", fixed_time("2024-03-05T08:00:00Z"), 30)],
        );
        let controller = controller(Arc::clone(&client));

        controller.start().await.expect("start");
        let state = controller.state().expect("state");

        assert_eq!(state.status, LoadStatus::Ready);
        assert_eq!(state.appointments.len(), 1);
        assert_eq!(client.staff_calls.load(Ordering::SeqCst), 2);
        let names: Vec<&str> = state
            .staff_options
            .iter()
            .map(|staff| staff.full_name.as_str())
            .collect();
        assert_eq!(names, vec!["Ece", "Mert"]);
        let options = client
            .last_options
            .lock()
            .expect("options mutex poisoned")
            .clone()
            .expect("fetch happened");
        assert!(!options.include_past);
    }

    #[tokio::test]
    async fn latest_navigation_wins_over_slower_earlier_fetch() {
        let client = Arc::new(FakeBookingClient::default());
        client.serve(april_grid(), vec![appointment("april", fixed_time("2024-04-10T08:00:00Z"), 30)]);
        client.serve(may_grid(), vec![appointment("may", fixed_time("2024-05-10T08:00:00Z"), 30)]);
        let controller = controller(Arc::clone(&client));
        controller
            .dispatch(SelectionEvent::SwitchMode(ViewMode::Calendar))
            .await
            .expect("switch to calendar");

        let (release, held) = oneshot::channel();
        client.hold(april_grid(), held);

        let slow = controller.dispatch(SelectionEvent::Navigate(NavDirection::Next));
        let fast = async {
            let result = controller
                .dispatch(SelectionEvent::Navigate(NavDirection::Next))
                .await;
            let _ = release.send(());
            result
        };
        let (slow_result, fast_result) = tokio::join!(slow, fast);
        slow_result.expect("slow navigation");
        fast_result.expect("fast navigation");

        let state = controller.state().expect("state");
        assert_eq!(state.focus_date, NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date"));
        let ids: Vec<&str> = state.appointments.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["may"]);
        assert_eq!(
            state.committed_range.map(|range| range.start),
            Some(may_grid())
        );
    }

    #[tokio::test]
    async fn reconcile_keeps_selection_and_editor_open() {
        let client = Arc::new(FakeBookingClient::default());
        let controller = calendar_with_selection(&client).await;
        client.serve(
            march_grid(),
            vec![
                appointment("apt-1", fixed_time("2024-03-01T06:00:00Z"), 40),
                appointment("apt-2", fixed_time("2024-03-01T06:20:00Z"), 40),
            ],
        );

        controller.reconcile().await.expect("reconcile");
        let state = controller.state().expect("state");
        assert_eq!(state.appointments.len(), 2);
        assert_eq!(state.selected_appointment_id.as_deref(), Some("apt-1"));
        assert_eq!(state.editing_appointment_id.as_deref(), Some("apt-1"));
        assert_eq!(state.editor_staff.len(), 1);
    }

    #[tokio::test]
    async fn conflict_is_shown_verbatim_without_refetch() {
        let client = Arc::new(FakeBookingClient::default());
        let controller = calendar_with_selection(&client).await;
        *client.update_result.lock().expect("update mutex poisoned") = Some(EngineError::Conflict(
            "Ece already has a booking at 10:00".to_string(),
        ));
        let fetches_before = client.fetch_calls.load(Ordering::SeqCst);

        let result = controller.submit_update("apt-1", &valid_update()).await;
        assert!(matches!(result, Err(EngineError::Conflict(_))));

        let state = controller.state().expect("state");
        assert_eq!(
            state.editor_error.as_deref(),
            Some("Ece already has a booking at 10:00")
        );
        assert_eq!(state.editing_appointment_id.as_deref(), Some("apt-1"));
        assert_eq!(client.fetch_calls.load(Ordering::SeqCst), fetches_before);
    }

    #[tokio::test]
    async fn invalid_update_never_reaches_the_backend() {
        let client = Arc::new(FakeBookingClient::default());
        let controller = calendar_with_selection(&client).await;
        let mut update = valid_update();
        update.ends_at = update.starts_at - Duration::minutes(5);

        let result = controller.submit_update("apt-1", &update).await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert_eq!(client.update_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            controller.state().expect("state").editor_error.as_deref(),
            Some("End time must be after start time")
        );
    }

    #[tokio::test]
    async fn successful_update_closes_editor_and_reloads() {
        let client = Arc::new(FakeBookingClient::default());
        let controller = calendar_with_selection(&client).await;
        let fetches_before = client.fetch_calls.load(Ordering::SeqCst);

        controller
            .submit_update("apt-1", &valid_update())
            .await
            .expect("update succeeds");
        let state = controller.state().expect("state");
        assert!(state.editing_appointment_id.is_none());
        assert_eq!(state.selected_appointment_id.as_deref(), Some("apt-1"));
        assert_eq!(client.fetch_calls.load(Ordering::SeqCst), fetches_before + 1);

        controller
            .cancel_appointment("apt-1", &CancelRequest::default())
            .await
            .expect("cancel succeeds");
        assert!(controller
            .state()
            .expect("state")
            .selected_appointment_id
            .is_none());
    }

    #[tokio::test]
    async fn failed_fetch_shows_inline_error() {
        let client = Arc::new(FakeBookingClient::default());
        *client.fail_fetches.lock().expect("fail mutex poisoned") = true;
        let controller = controller(Arc::clone(&client));

        controller
            .dispatch(SelectionEvent::SwitchMode(ViewMode::Calendar))
            .await
            .expect("dispatch does not fail on network errors");
        let state = controller.state().expect("state");
        assert_eq!(
            state.status,
            LoadStatus::Failed("Network error: connection reset".to_string())
        );
        assert!(state.appointments.is_empty());
    }

    #[tokio::test]
    async fn snapshot_lays_out_week_days() {
        let client = Arc::new(FakeBookingClient::default());
        let week_start = march_grid();
        client.serve(
            week_start,
            vec![
                appointment("a", fixed_time("2024-02-26T06:00:00Z"), 40),
                appointment("b", fixed_time("2024-02-26T06:20:00Z"), 40),
                appointment("c", fixed_time("2024-02-28T11:00:00Z"), 60),
            ],
        );
        let controller = controller(Arc::clone(&client));
        controller
            .dispatch(SelectionEvent::SwitchMode(ViewMode::Calendar))
            .await
            .expect("switch to calendar");
        controller
            .dispatch(SelectionEvent::SwitchView(CalendarView::Week))
            .await
            .expect("switch to week");

        let snapshot = controller.snapshot().expect("snapshot");
        assert_eq!(snapshot.range.label, "26 Feb – 3 Mar 2024");
        assert_eq!(snapshot.grid.len(), 7);
        assert_eq!(snapshot.appointments_by_day().len(), 2);

        let layouts = snapshot.day_layouts();
        let monday = &layouts[0];
        assert_eq!(monday.day.to_string(), "2024-02-26");
        let lanes: Vec<(usize, usize)> = monday
            .events
            .iter()
            .map(|event| (event.lane, event.lane_count))
            .collect();
        assert_eq!(lanes, vec![(0, 2), (1, 2)]);
        assert_eq!(layouts[2].events.len(), 1);
        assert!(layouts[1].events.is_empty());
        assert!((snapshot.lane_gap_percent() - 1.0).abs() < f64::EPSILON);
    }
}
