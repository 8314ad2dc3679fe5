use crate::alerts::{self, AlertState, ThresholdConfig};
use crate::error::{AnalyticsError, StoreError};
use crate::reading::Reading;
use crate::series::{MergeOutcome, SeriesBuffer};
use crate::stats::{StatsEngine, StatsOutcome};
use crate::window::{self, RangeToken, WindowSpec};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// No window selected yet.
    Idle,
    Loading,
    Ready,
    /// Last query failed. This is the resting state until the next selection retries; the last
    /// loaded series stays live and keeps merging pushed readings.
    Error,
}

/// A range query the caller must run and report back through `complete_query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTicket {
    pub generation: u64,
    pub window: WindowSpec,
}

#[derive(Debug)]
pub enum QueryResolution {
    Applied { count: usize },
    Failed { error: AnalyticsError },
    /// Result for a superseded window selection; dropped without touching state.
    Stale { generation: u64, current: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOutcome {
    Merged(MergeOutcome),
    /// Held until the in-flight query for the new window lands.
    Deferred,
    /// No window has loaded yet.
    Ignored,
}

/// What the display layer renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsView {
    pub state: ControllerState,
    pub generation: u64,
    pub window: Option<WindowSpec>,
    pub statistics: StatsOutcome,
    pub alerts: Option<AlertState>,
    pub thresholds: ThresholdConfig,
    pub latest: Option<Reading>,
    pub series: Vec<Reading>,
    pub stale: bool,
    pub last_error: Option<String>,
}

/// Owns the buffer, statistics and alerts for one window selection at a time.
#[derive(Debug)]
pub struct AnalyticsController {
    engine: StatsEngine,
    thresholds: ThresholdConfig,
    capacity: usize,
    state: ControllerState,
    generation: u64,
    window: Option<WindowSpec>,
    pending_window: Option<WindowSpec>,
    pending_live: VecDeque<Reading>,
    buffer: SeriesBuffer,
    statistics: StatsOutcome,
    alerts: Option<AlertState>,
    last_error: Option<String>,
}

impl AnalyticsController {
    pub fn new(engine: StatsEngine, thresholds: ThresholdConfig, capacity: usize) -> Self {
        Self {
            engine,
            thresholds,
            capacity,
            state: ControllerState::Idle,
            generation: 0,
            window: None,
            pending_window: None,
            pending_live: VecDeque::new(),
            buffer: SeriesBuffer::new(capacity),
            statistics: StatsOutcome::InsufficientData { count: 0 },
            alerts: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn window(&self) -> Option<WindowSpec> {
        self.window
    }

    pub fn statistics(&self) -> &StatsOutcome {
        &self.statistics
    }

    pub fn alerts(&self) -> Option<AlertState> {
        self.alerts
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    pub fn snapshot(&self) -> Vec<Reading> {
        self.buffer.snapshot()
    }

    /// Start loading a new window. Any query still in flight is superseded.
    pub fn select_window(&mut self, token: RangeToken, now: DateTime<Utc>) -> QueryTicket {
        self.generation += 1;
        let window = window::resolve(token, now);
        self.pending_window = Some(window);
        self.pending_live.clear();
        self.state = ControllerState::Loading;
        tracing::debug!(
            generation = self.generation,
            token = %token,
            from = %window.from,
            to = %window.to,
            "window selected"
        );
        QueryTicket {
            generation: self.generation,
            window,
        }
    }

    /// Re-run the current (or pending) window token against a fresh `now`.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> Option<QueryTicket> {
        let token = self.pending_window.or(self.window)?.token;
        Some(self.select_window(token, now))
    }

    pub fn complete_query(
        &mut self,
        generation: u64,
        result: Result<Vec<Reading>, StoreError>,
    ) -> QueryResolution {
        if generation != self.generation || self.state != ControllerState::Loading {
            return QueryResolution::Stale {
                generation,
                current: self.generation,
            };
        }

        match result {
            Ok(rows) => {
                let mut buffer = SeriesBuffer::new(self.capacity);
                buffer.seed(rows);
                for reading in self.pending_live.drain(..) {
                    buffer.merge(reading);
                }
                self.buffer = buffer;
                self.window = self.pending_window.take();
                self.last_error = None;
                self.state = ControllerState::Ready;
                self.recompute();
                QueryResolution::Applied {
                    count: self.buffer.len(),
                }
            }
            Err(err) => {
                let error = AnalyticsError::QueryFailure(err);
                self.pending_window = None;
                self.pending_live.clear();
                self.last_error = Some(error.to_string());
                self.state = ControllerState::Error;
                QueryResolution::Failed { error }
            }
        }
    }

    pub fn on_live(&mut self, reading: Reading) -> LiveOutcome {
        match self.state {
            ControllerState::Loading => {
                // Only the newest `capacity` readings can survive the replay.
                if self.pending_live.len() >= self.capacity {
                    self.pending_live.pop_front();
                }
                self.pending_live.push_back(reading);
                LiveOutcome::Deferred
            }
            ControllerState::Ready => LiveOutcome::Merged(self.merge_live(reading)),
            ControllerState::Error if self.window.is_some() => {
                LiveOutcome::Merged(self.merge_live(reading))
            }
            ControllerState::Idle | ControllerState::Error => LiveOutcome::Ignored,
        }
    }

    /// Swap in thresholds from the settings side and re-evaluate alerts.
    pub fn replace_thresholds(&mut self, thresholds: ThresholdConfig) {
        self.thresholds = thresholds;
        self.alerts = self
            .buffer
            .latest()
            .map(|latest| alerts::evaluate(latest, &self.thresholds));
    }

    pub fn view(&self) -> AnalyticsView {
        let showing_data = self.window.is_some();
        AnalyticsView {
            state: self.state,
            generation: self.generation,
            window: self.window,
            statistics: self.statistics,
            alerts: self.alerts,
            thresholds: self.thresholds,
            latest: self.buffer.latest().cloned(),
            series: self.buffer.snapshot(),
            stale: showing_data
                && matches!(
                    self.state,
                    ControllerState::Loading | ControllerState::Error
                ),
            last_error: self.last_error.clone(),
        }
    }

    fn merge_live(&mut self, reading: Reading) -> MergeOutcome {
        let outcome = self.buffer.merge(reading);
        if outcome == MergeOutcome::Applied {
            self.recompute();
        }
        outcome
    }

    fn recompute(&mut self) {
        self.statistics = self.engine.compute(&self.buffer.snapshot());
        self.alerts = self
            .buffer
            .latest()
            .map(|latest| alerts::evaluate(latest, &self.thresholds));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::fixtures::{base_time, reading_at};

    fn controller(capacity: usize) -> AnalyticsController {
        AnalyticsController::new(StatsEngine::default(), ThresholdConfig::default(), capacity)
    }

    fn rows(ids: std::ops::Range<i64>, moisture: f64) -> Vec<Reading> {
        ids.map(|id| reading_at(id, id * 60, moisture)).collect()
    }

    fn now() -> DateTime<Utc> {
        base_time() + chrono::Duration::hours(1)
    }

    #[test]
    fn starts_idle_and_ignores_live_events() {
        let mut controller = controller(10);
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(controller.on_live(reading_at(1, 0, 50.0)), LiveOutcome::Ignored);
        let view = controller.view();
        assert!(view.series.is_empty());
        assert!(!view.stale);
        assert_eq!(view.alerts, None);
    }

    #[test]
    fn successful_query_seeds_and_computes() {
        let mut controller = controller(10);
        let ticket = controller.select_window(RangeToken::SixHours, now());
        assert_eq!(controller.state(), ControllerState::Loading);
        assert_eq!(ticket.window.token, RangeToken::SixHours);

        let resolution = controller.complete_query(ticket.generation, Ok(rows(1..4, 25.0)));

        assert!(matches!(resolution, QueryResolution::Applied { count: 3 }));
        assert_eq!(controller.state(), ControllerState::Ready);
        assert_eq!(controller.window(), Some(ticket.window));
        let stats = controller.statistics().statistics().expect("stats");
        assert_eq!(stats.moisture.count, 3);
        assert!(controller.alerts().expect("alerts").low_moisture);
    }

    #[test]
    fn superseded_query_result_is_discarded() {
        let mut controller = controller(10);
        let six_hours = controller.select_window(RangeToken::SixHours, now());
        let one_day = controller.select_window(RangeToken::OneDay, now());

        let applied = controller.complete_query(one_day.generation, Ok(rows(1..6, 60.0)));
        assert!(matches!(applied, QueryResolution::Applied { count: 5 }));

        let stale = controller.complete_query(six_hours.generation, Ok(rows(100..102, 5.0)));
        assert!(matches!(
            stale,
            QueryResolution::Stale {
                generation: 1,
                current: 2
            }
        ));
        assert_eq!(controller.window().map(|w| w.token), Some(RangeToken::OneDay));
        assert_eq!(controller.snapshot(), rows(1..6, 60.0));
    }

    #[test]
    fn stale_failure_does_not_flip_state() {
        let mut controller = controller(10);
        let old = controller.select_window(RangeToken::OneHour, now());
        let _current = controller.select_window(RangeToken::SevenDays, now());

        let resolution = controller.complete_query(
            old.generation,
            Err(StoreError::Unavailable("timeout".to_string())),
        );
        assert!(matches!(resolution, QueryResolution::Stale { .. }));
        assert_eq!(controller.state(), ControllerState::Loading);
    }

    #[test]
    fn failure_keeps_last_ready_data_visible() {
        let mut controller = controller(10);
        let first = controller.select_window(RangeToken::OneHour, now());
        controller.complete_query(first.generation, Ok(rows(1..4, 40.0)));
        let before = controller.view();

        let second = controller.select_window(RangeToken::ThirtyDays, now());
        assert!(controller.view().stale);
        let resolution = controller.complete_query(
            second.generation,
            Err(StoreError::Unavailable("db down".to_string())),
        );

        assert!(matches!(
            resolution,
            QueryResolution::Failed {
                error: AnalyticsError::QueryFailure(_)
            }
        ));
        let view = controller.view();
        assert_eq!(view.state, ControllerState::Error);
        assert!(view.stale);
        assert_eq!(view.series, before.series);
        assert_eq!(view.statistics, before.statistics);
        assert_eq!(view.window, before.window);
        assert!(view.last_error.unwrap().contains("db down"));

        // Error accepts the next selection as a retry.
        let retry = controller.select_window(RangeToken::ThirtyDays, now());
        controller.complete_query(retry.generation, Ok(rows(1..3, 40.0)));
        assert_eq!(controller.state(), ControllerState::Ready);
        assert_eq!(controller.view().last_error, None);
    }

    #[test]
    fn live_readings_keep_flowing_after_a_failed_query() {
        let mut controller = controller(10);
        let first = controller.select_window(RangeToken::OneHour, now());
        controller.complete_query(first.generation, Ok(rows(1..4, 50.0)));
        assert!(!controller.alerts().unwrap().low_moisture);

        let failed = controller.select_window(RangeToken::SixHours, now());
        controller.complete_query(
            failed.generation,
            Err(StoreError::Unavailable("timeout".to_string())),
        );
        assert_eq!(controller.state(), ControllerState::Error);

        let outcome = controller.on_live(reading_at(4, 4 * 60, 5.0));

        assert_eq!(outcome, LiveOutcome::Merged(MergeOutcome::Applied));
        assert_eq!(controller.state(), ControllerState::Error);
        assert_eq!(controller.snapshot().len(), 4);
        assert!(controller.alerts().unwrap().low_moisture);
        assert_eq!(controller.statistics().statistics().unwrap().moisture.min, 5.0);
        assert!(controller.view().stale);
    }

    #[test]
    fn failed_first_query_ignores_live_readings() {
        let mut controller = controller(10);
        let ticket = controller.select_window(RangeToken::OneHour, now());
        controller.complete_query(
            ticket.generation,
            Err(StoreError::Unavailable("timeout".to_string())),
        );
        assert_eq!(controller.on_live(reading_at(1, 0, 5.0)), LiveOutcome::Ignored);
        assert!(controller.snapshot().is_empty());
        assert_eq!(controller.alerts(), None);
    }

    #[test]
    fn deferred_live_readings_are_bounded_by_capacity() {
        let mut controller = controller(10);
        let ticket = controller.select_window(RangeToken::OneDay, now());

        for id in 1..=50_000 {
            assert_eq!(controller.on_live(reading_at(id, id, 40.0)), LiveOutcome::Deferred);
        }
        assert_eq!(controller.pending_live.len(), 10);

        controller.complete_query(ticket.generation, Ok(Vec::new()));
        let ids: Vec<i64> = controller.snapshot().iter().map(|r| r.id.0).collect();
        assert_eq!(ids, (49_991..=50_000).collect::<Vec<_>>());
    }

    #[test]
    fn live_readings_during_loading_are_replayed_after_seed() {
        let mut controller = controller(10);
        let ticket = controller.select_window(RangeToken::OneDay, now());

        let late = reading_at(50, 50 * 60, 70.0);
        let already_queried = reading_at(2, 120, 30.0);
        assert_eq!(controller.on_live(late.clone()), LiveOutcome::Deferred);
        assert_eq!(controller.on_live(already_queried), LiveOutcome::Deferred);

        controller.complete_query(ticket.generation, Ok(rows(1..4, 30.0)));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.last(), Some(&late));
    }

    #[test]
    fn live_merge_recomputes_only_when_applied() {
        let mut controller = controller(3);
        let ticket = controller.select_window(RangeToken::OneHour, now());
        controller.complete_query(ticket.generation, Ok(rows(10..13, 50.0)));

        let outcome = controller.on_live(reading_at(13, 13 * 60, 20.0));
        assert_eq!(outcome, LiveOutcome::Merged(MergeOutcome::Applied));
        assert!(controller.alerts().unwrap().low_moisture);
        assert_eq!(controller.statistics().statistics().unwrap().moisture.min, 20.0);

        let outcome = controller.on_live(reading_at(13, 13 * 60, 20.0));
        assert_eq!(outcome, LiveOutcome::Merged(MergeOutcome::Duplicate));

        let outcome = controller.on_live(reading_at(1, 0, 99.0));
        assert_eq!(outcome, LiveOutcome::Merged(MergeOutcome::OutOfWindow));
        assert_eq!(controller.statistics().statistics().unwrap().moisture.max, 50.0);
    }

    #[test]
    fn switching_windows_does_not_carry_over_data() {
        let mut controller = controller(10);
        let first = controller.select_window(RangeToken::OneHour, now());
        controller.complete_query(first.generation, Ok(rows(1..5, 40.0)));

        let second = controller.select_window(RangeToken::SixHours, now());
        controller.complete_query(second.generation, Ok(Vec::new()));

        let view = controller.view();
        assert!(view.series.is_empty());
        assert_eq!(view.statistics, StatsOutcome::InsufficientData { count: 0 });
        assert_eq!(view.alerts, None);
    }

    #[test]
    fn refresh_reuses_current_token() {
        let mut controller = controller(10);
        assert!(controller.refresh(now()).is_none());

        let first = controller.select_window(RangeToken::SevenDays, now());
        controller.complete_query(first.generation, Ok(rows(1..3, 40.0)));
        let later = now() + chrono::Duration::minutes(5);
        let ticket = controller.refresh(later).expect("ticket");
        assert_eq!(ticket.window.token, RangeToken::SevenDays);
        assert_eq!(ticket.window.to, later);
        assert_eq!(ticket.generation, first.generation + 1);
    }

    #[test]
    fn replacing_thresholds_reevaluates_alerts() {
        let mut controller = controller(10);
        let ticket = controller.select_window(RangeToken::OneHour, now());
        controller.complete_query(ticket.generation, Ok(rows(1..3, 35.0)));
        assert!(!controller.alerts().unwrap().low_moisture);

        controller.replace_thresholds(ThresholdConfig {
            moisture_low: 40.0,
            ..ThresholdConfig::default()
        });
        assert!(controller.alerts().unwrap().low_moisture);
        assert_eq!(controller.thresholds().moisture_low, 40.0);
    }
}
