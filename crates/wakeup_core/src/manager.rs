//! crates/wakeup_core/src/manager.rs
//!
//! The `AlarmManager` owns the alarm collection and runs the per-tick trigger
//! scan. All state sits behind one async mutex so a scan and a concurrent
//! REST or button request never interleave. Each successful mutation is
//! written through the `AlarmStore` port while the lock is still held.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Timelike};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::codec::{decode_alarms, encode_alarms};
use crate::domain::{Alarm, AlarmId, AlarmUpdate, FeedSpec, NewAlarm, TriggerCause};
use crate::error::AlarmError;
use crate::ports::{AlarmStore, PortError};

/// `(hour, minute)` of a tick.
type MinuteKey = (u32, u32);

fn minute_key(now: DateTime<Local>) -> MinuteKey {
    (now.hour(), now.minute())
}

#[derive(Default)]
struct ManagerState {
    alarms: HashMap<AlarmId, Alarm>,
    /// Alarms that fired and whose audio has not been marked complete.
    sounding: HashSet<AlarmId>,
    /// Sounding one-time alarms that were disabled by their own trigger.
    /// A snooze request may re-arm these.
    retired_one_shots: HashSet<AlarmId>,
    last_triggered: HashMap<AlarmId, MinuteKey>,
}

pub struct AlarmManager {
    state: Mutex<ManagerState>,
    store: Arc<dyn AlarmStore>,
}

impl AlarmManager {
    /// Loads the stored collection.
    ///
    /// Never fails: a missing collection starts empty, and an unreadable or
    /// malformed one is logged and also starts empty.
    pub async fn load(store: Arc<dyn AlarmStore>, now: DateTime<Local>) -> Self {
        let mut alarms = HashMap::new();

        match store.load().await {
            Ok(None) => info!("No stored alarms found. Starting with an empty collection."),
            Ok(Some(data)) => match decode_alarms(&data, now) {
                Ok(report) => {
                    if report.is_partial() {
                        warn!(
                            "Loaded {} of {} alarms; {} records were skipped.",
                            report.alarms.len(),
                            report.total,
                            report.skipped.len()
                        );
                    }
                    for alarm in report.alarms {
                        if alarms.contains_key(&alarm.id) {
                            warn!(
                                "Duplicate alarm ID '{}' in storage. Keeping the first.",
                                alarm.id
                            );
                            continue;
                        }
                        alarms.insert(alarm.id.clone(), alarm);
                    }
                }
                Err(e) => error!("{}. Starting with an empty collection.", e),
            },
            Err(e) => error!(
                "Failed to read stored alarms: {}. Starting with an empty collection.",
                e
            ),
        }

        for alarm in alarms.values_mut() {
            alarm.clear_stale_snooze(now);
        }
        info!("Alarm manager ready with {} alarms.", alarms.len());

        Self {
            state: Mutex::new(ManagerState {
                alarms,
                ..Default::default()
            }),
            store,
        }
    }

    async fn persist(&self, state: &ManagerState) -> Result<(), AlarmError> {
        let data = encode_alarms(state.alarms.values())
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.store.save(&data).await?;
        debug!("Saved {} alarms.", state.alarms.len());
        Ok(())
    }

    /// Persists after a mutation. The in-memory change stands either way.
    async fn persist_logged(&self, state: &ManagerState) {
        if let Err(e) = self.persist(state).await {
            error!("Error saving alarms: {}", e);
        }
    }

    /// Writes the collection out and reports failure to the caller.
    pub async fn flush(&self) -> Result<(), AlarmError> {
        let state = self.state.lock().await;
        self.persist(&state).await
    }

    //=====================================================================================
    // Collection operations
    //=====================================================================================

    pub async fn create(&self, new: NewAlarm) -> Result<Alarm, AlarmError> {
        new.feed.validate()?;
        let mut state = self.state.lock().await;
        if let Some(id) = &new.id {
            if state.alarms.contains_key(id) {
                warn!("Alarm with ID '{}' already exists.", id);
                return Err(AlarmError::Conflict(id.clone()));
            }
        }
        let alarm = Alarm::new(new);
        state.alarms.insert(alarm.id.clone(), alarm.clone());
        info!("Alarm '{}' (ID: {}) added.", alarm.label, alarm.id);
        self.persist_logged(&state).await;
        Ok(alarm)
    }

    /// Deletes an alarm along with its trigger bookkeeping.
    pub async fn remove(&self, id: &str) -> Result<Alarm, AlarmError> {
        let mut state = self.state.lock().await;
        let Some(alarm) = state.alarms.remove(id) else {
            warn!("Alarm ID '{}' not found for removal.", id);
            return Err(AlarmError::NotFound(id.to_string()));
        };
        state.last_triggered.remove(id);
        state.sounding.remove(id);
        state.retired_one_shots.remove(id);
        info!("Alarm '{}' (ID: {}) removed.", alarm.label, alarm.id);
        self.persist_logged(&state).await;
        Ok(alarm)
    }

    pub async fn update(&self, id: &str, changes: AlarmUpdate) -> Result<Alarm, AlarmError> {
        let mut state = self.state.lock().await;
        let alarm = Self::alarm_mut(&mut state, id)?;

        if changes.feed_kind.is_some() || changes.feed_options.is_some() {
            FeedSpec::new(
                changes.feed_kind.clone().unwrap_or_else(|| alarm.feed.kind.clone()),
                changes
                    .feed_options
                    .clone()
                    .unwrap_or_else(|| alarm.feed.options.clone()),
            )
            .validate()?;
        }
        alarm.update(changes);
        let updated = alarm.clone();
        self.persist_logged(&state).await;
        Ok(updated)
    }

    pub async fn enable(&self, id: &str) -> Result<Alarm, AlarmError> {
        self.mutate(id, Alarm::enable).await
    }

    pub async fn disable(&self, id: &str) -> Result<Alarm, AlarmError> {
        self.mutate(id, Alarm::disable).await
    }

    /// Disables an enabled alarm and enables a disabled one.
    pub async fn toggle(&self, id: &str) -> Result<Alarm, AlarmError> {
        self.mutate(id, |alarm| {
            if alarm.is_enabled() {
                alarm.disable()
            } else {
                alarm.enable()
            }
        })
        .await
    }

    async fn mutate<F>(&self, id: &str, apply: F) -> Result<Alarm, AlarmError>
    where
        F: FnOnce(&mut Alarm),
    {
        let mut state = self.state.lock().await;
        let alarm = Self::alarm_mut(&mut state, id)?;
        apply(alarm);
        let changed = alarm.clone();
        self.persist_logged(&state).await;
        Ok(changed)
    }

    /// Snoozes one alarm, returning the new deadline.
    pub async fn snooze(
        &self,
        id: &str,
        duration: Duration,
        now: DateTime<Local>,
    ) -> Result<DateTime<Local>, AlarmError> {
        let mut state = self.state.lock().await;
        let until = Self::alarm_mut(&mut state, id)?.snooze(duration, now)?;
        self.persist_logged(&state).await;
        Ok(until)
    }

    pub async fn get(&self, id: &str) -> Result<Alarm, AlarmError> {
        let state = self.state.lock().await;
        state
            .alarms
            .get(id)
            .cloned()
            .ok_or_else(|| AlarmError::NotFound(id.to_string()))
    }

    /// All alarms, in no particular order.
    pub async fn list(&self) -> Vec<Alarm> {
        self.state.lock().await.alarms.values().cloned().collect()
    }

    /// All alarms ordered by time of day, then label.
    pub async fn list_sorted(&self) -> Vec<Alarm> {
        let mut alarms = self.list().await;
        alarms.sort_by(|a, b| {
            a.time_of_day
                .cmp(&b.time_of_day)
                .then_with(|| a.label.cmp(&b.label))
                .then_with(|| a.id.cmp(&b.id))
        });
        alarms
    }

    fn alarm_mut<'a>(state: &'a mut ManagerState, id: &str) -> Result<&'a mut Alarm, AlarmError> {
        state.alarms.get_mut(id).ok_or_else(|| {
            warn!("Alarm ID '{}' not found.", id);
            AlarmError::NotFound(id.to_string())
        })
    }

    //=====================================================================================
    // Trigger scan and sounding alarms
    //=====================================================================================

    /// Evaluates every alarm for the tick at `now` and returns the ones that
    /// fire, in scan order.
    ///
    /// A scheduled trigger fires at most once per minute. An expiring snooze
    /// always fires. A one-time alarm is disabled as it fires unless it is
    /// already sounding.
    pub async fn scan(&self, now: DateTime<Local>) -> Vec<Alarm> {
        let key = minute_key(now);
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut fired = Vec::new();
        let mut changed = false;

        for alarm in state.alarms.values_mut() {
            let Some(cause) = alarm.take_trigger(now) else {
                if state.last_triggered.get(&alarm.id).is_some_and(|k| *k != key) {
                    state.last_triggered.remove(&alarm.id);
                }
                continue;
            };

            if cause == TriggerCause::SnoozeExpired {
                changed = true;
            } else if state.last_triggered.get(&alarm.id) == Some(&key) {
                continue;
            }

            info!(
                "Alarm '{}' (ID: {}) triggered at {}.",
                alarm.label,
                alarm.id,
                now.format("%H:%M:%S")
            );
            let was_sounding = !state.sounding.insert(alarm.id.clone());
            state.last_triggered.insert(alarm.id.clone(), key);

            if alarm.is_one_time() && !alarm.is_snoozing() && !was_sounding {
                alarm.disable();
                state.retired_one_shots.insert(alarm.id.clone());
                info!(
                    "One-time alarm '{}' (ID: {}) disabled after triggering.",
                    alarm.label, alarm.id
                );
                changed = true;
            }
            fired.push(alarm.clone());
        }

        if changed {
            self.persist_logged(state).await;
        }
        fired
    }

    /// Snoozes every alarm that is currently sounding and returns the labels
    /// of the ones snoozed.
    ///
    /// A one-time alarm that disabled itself when it fired is re-armed first.
    /// Ids that no longer resolve to an alarm are dropped.
    pub async fn request_snooze_for_active(
        &self,
        duration: Duration,
        now: DateTime<Local>,
    ) -> Vec<String> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.sounding.is_empty() {
            info!("Snooze requested, but no alarms are sounding.");
            return Vec::new();
        }

        let mut snoozed = Vec::new();
        let mut missing = Vec::new();
        for id in &state.sounding {
            let Some(alarm) = state.alarms.get_mut(id) else {
                warn!("Sounding alarm ID '{}' no longer exists. Dropping it.", id);
                missing.push(id.clone());
                continue;
            };
            if !alarm.is_enabled() && state.retired_one_shots.remove(id) {
                alarm.enable();
            }
            if alarm.snooze(duration, now).is_ok() {
                snoozed.push(alarm.label.clone());
            }
        }
        for id in missing {
            state.sounding.remove(&id);
        }

        if snoozed.is_empty() {
            info!("No sounding alarms could be snoozed.");
        } else {
            info!("Snoozed alarms: {}", snoozed.join(", "));
            self.persist_logged(state).await;
        }
        snoozed
    }

    /// Marks an alarm's audio as handled, whatever the outcome was.
    pub async fn mark_processing_complete(&self, id: &str) {
        let mut state = self.state.lock().await;
        state.retired_one_shots.remove(id);
        if state.sounding.remove(id) {
            debug!("Alarm ID '{}' finished sounding.", id);
        }
    }

    pub async fn is_sounding(&self, id: &str) -> bool {
        self.state.lock().await.sounding.contains(id)
    }

    pub async fn sounding_ids(&self) -> Vec<AlarmId> {
        self.state.lock().await.sounding.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlarmState, FeedKind, FeedOptions, RepeatDays};
    use crate::ports::PortResult;
    use async_trait::async_trait;
    use chrono::{NaiveTime, TimeZone};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        data: std::sync::Mutex<Option<Vec<u8>>>,
        fail_saves: AtomicBool,
        saves: AtomicUsize,
    }

    impl MemoryStore {
        fn with_data(data: &[u8]) -> Self {
            Self {
                data: std::sync::Mutex::new(Some(data.to_vec())),
                ..Default::default()
            }
        }

        fn saves(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AlarmStore for MemoryStore {
        async fn load(&self) -> PortResult<Option<Vec<u8>>> {
            Ok(self.data.lock().unwrap().clone())
        }

        async fn save(&self, data: &[u8]) -> PortResult<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(PortError::Unavailable("disk full".into()));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.data.lock().unwrap() = Some(data.to_vec());
            Ok(())
        }
    }

    // 2025-05-12 is a Monday.
    fn monday(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 5, 12, h, m, s).unwrap()
    }

    fn tuesday(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 5, 13, h, m, s).unwrap()
    }

    fn seven_am(id: &str, days: &[i64]) -> NewAlarm {
        NewAlarm::new(NaiveTime::from_hms_opt(7, 0, 0).unwrap(), "Wake up")
            .with_id(id)
            .repeating(RepeatDays::new(days.iter().copied()).unwrap())
    }

    async fn manager() -> (AlarmManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let manager = AlarmManager::load(store.clone(), monday(6, 0, 0)).await;
        (manager, store)
    }

    fn ids(alarms: &[Alarm]) -> Vec<&str> {
        alarms.iter().map(|a| a.id.as_str()).collect()
    }

    #[tokio::test]
    async fn one_time_alarm_fires_once_and_disables() {
        let (manager, _) = manager().await;
        manager.create(seven_am("a", &[])).await.unwrap();

        let fired = manager.scan(monday(7, 0, 0)).await;
        assert_eq!(ids(&fired), vec!["a"]);
        assert!(!manager.get("a").await.unwrap().is_enabled());

        assert!(manager.scan(monday(7, 0, 30)).await.is_empty());
    }

    #[tokio::test]
    async fn repeating_alarm_respects_weekday() {
        let (manager, _) = manager().await;
        manager.create(seven_am("a", &[0])).await.unwrap();

        assert!(manager.scan(tuesday(7, 0, 0)).await.is_empty());
        let fired = manager.scan(monday(7, 0, 0)).await;
        assert_eq!(ids(&fired), vec!["a"]);
        assert!(manager.get("a").await.unwrap().is_enabled());
    }

    #[tokio::test]
    async fn repeating_alarm_fires_once_per_minute() {
        let (manager, _) = manager().await;
        manager.create(seven_am("a", &[0, 1])).await.unwrap();

        assert_eq!(manager.scan(monday(7, 0, 0)).await.len(), 1);
        assert!(manager.scan(monday(7, 0, 1)).await.is_empty());
        assert!(manager.scan(monday(7, 0, 59)).await.is_empty());

        // The cache entry is evicted once the minute has passed.
        assert!(manager.scan(monday(7, 1, 0)).await.is_empty());
        assert_eq!(manager.scan(tuesday(7, 0, 0)).await.len(), 1);
    }

    #[tokio::test]
    async fn snoozed_alarm_fires_when_deadline_passes() {
        let (manager, _) = manager().await;
        manager.create(seven_am("a", &[0, 1, 2, 3, 4, 5, 6])).await.unwrap();

        let t = monday(8, 0, 0);
        let d = Duration::minutes(9);
        manager.snooze("a", d, t).await.unwrap();

        assert!(manager.scan(t + Duration::minutes(1)).await.is_empty());
        assert!(manager.scan(t + d / 2).await.is_empty());

        let fired = manager.scan(t + d).await;
        assert_eq!(ids(&fired), vec!["a"]);
        assert!(!fired[0].is_snoozing());
        assert!(!manager.get("a").await.unwrap().is_snoozing());
    }

    #[tokio::test]
    async fn snooze_expiry_is_not_suppressed_by_same_minute_fire() {
        let (manager, _) = manager().await;
        manager.create(seven_am("a", &[0])).await.unwrap();

        assert_eq!(manager.scan(monday(7, 0, 0)).await.len(), 1);
        let snoozed = manager
            .request_snooze_for_active(Duration::seconds(30), monday(7, 0, 5))
            .await;
        assert_eq!(snoozed, vec!["Wake up".to_string()]);
        manager.mark_processing_complete("a").await;

        assert!(manager.scan(monday(7, 0, 20)).await.is_empty());
        assert_eq!(ids(&manager.scan(monday(7, 0, 40)).await), vec!["a"]);
        assert!(manager.scan(monday(7, 0, 45)).await.is_empty());
    }

    #[tokio::test]
    async fn snooze_request_with_nothing_sounding_is_empty() {
        let (manager, _) = manager().await;
        manager.create(seven_am("a", &[])).await.unwrap();
        let labels = manager
            .request_snooze_for_active(Duration::minutes(9), monday(7, 0, 0))
            .await;
        assert!(labels.is_empty());
    }

    #[tokio::test]
    async fn sounding_one_time_alarm_can_be_snoozed_and_fires_again() {
        let (manager, _) = manager().await;
        manager.create(seven_am("a", &[])).await.unwrap();

        manager.scan(monday(7, 0, 0)).await;
        assert!(manager.is_sounding("a").await);

        let labels = manager
            .request_snooze_for_active(Duration::minutes(9), monday(7, 0, 10))
            .await;
        assert_eq!(labels, vec!["Wake up".to_string()]);
        let alarm = manager.get("a").await.unwrap();
        assert!(alarm.is_enabled());
        assert!(alarm.is_snoozing());

        manager.mark_processing_complete("a").await;
        assert!(!manager.is_sounding("a").await);

        let fired = manager.scan(monday(7, 9, 10)).await;
        assert_eq!(ids(&fired), vec!["a"]);
        assert_eq!(manager.get("a").await.unwrap().state(), AlarmState::Disabled);
    }

    #[tokio::test]
    async fn one_time_alarm_still_sounding_when_snooze_expires_stays_enabled() {
        let (manager, _) = manager().await;
        manager.create(seven_am("a", &[])).await.unwrap();

        manager.scan(monday(7, 0, 0)).await;
        manager
            .request_snooze_for_active(Duration::minutes(9), monday(7, 0, 10))
            .await;
        assert!(manager.is_sounding("a").await);

        let fired = manager.scan(monday(7, 9, 10)).await;
        assert_eq!(ids(&fired), vec!["a"]);
        let alarm = manager.get("a").await.unwrap();
        assert!(alarm.is_enabled());
        assert_eq!(alarm.state(), AlarmState::Armed);
        assert!(manager.is_sounding("a").await);

        manager.mark_processing_complete("a").await;
        assert!(!manager.is_sounding("a").await);
        assert!(manager.get("a").await.unwrap().is_enabled());
    }

    #[tokio::test]
    async fn manually_disabled_sounding_alarm_is_not_snoozed() {
        let (manager, _) = manager().await;
        manager.create(seven_am("a", &[0])).await.unwrap();
        manager.scan(monday(7, 0, 0)).await;
        manager.disable("a").await.unwrap();

        let labels = manager
            .request_snooze_for_active(Duration::minutes(9), monday(7, 0, 10))
            .await;
        assert!(labels.is_empty());
        assert!(!manager.get("a").await.unwrap().is_enabled());
    }

    #[tokio::test]
    async fn remove_purges_trigger_bookkeeping() {
        let (manager, _) = manager().await;
        manager.create(seven_am("a", &[0])).await.unwrap();
        manager.scan(monday(7, 0, 0)).await;

        manager.remove("a").await.unwrap();
        assert!(manager.sounding_ids().await.is_empty());
        assert!(matches!(
            manager.remove("a").await,
            Err(AlarmError::NotFound(_))
        ));

        // A new alarm reusing the id fires within the same minute.
        manager.create(seven_am("a", &[0])).await.unwrap();
        assert_eq!(manager.scan(monday(7, 0, 30)).await.len(), 1);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let (manager, store) = manager().await;
        manager.create(seven_am("a", &[])).await.unwrap();
        let saves = store.saves();

        let err = manager.create(seven_am("a", &[1])).await.unwrap_err();
        assert!(matches!(err, AlarmError::Conflict(id) if id == "a"));
        assert!(manager.get("a").await.unwrap().is_one_time());
        assert_eq!(store.saves(), saves);
    }

    #[tokio::test]
    async fn create_generates_id_and_validates_feed() {
        let (manager, _) = manager().await;
        let alarm = manager
            .create(NewAlarm::new(NaiveTime::from_hms_opt(6, 30, 0).unwrap(), "News"))
            .await
            .unwrap();
        assert!(!alarm.id.is_empty());

        let bad = NewAlarm::new(NaiveTime::from_hms_opt(6, 30, 0).unwrap(), "Facts")
            .with_feed(FeedSpec::new(FeedKind::TopicFacts, FeedOptions::new()));
        assert!(matches!(
            manager.create(bad).await,
            Err(AlarmError::InvalidFeed(_))
        ));
        assert_eq!(manager.list().await.len(), 1);
    }

    #[tokio::test]
    async fn update_validates_merged_feed() {
        let (manager, _) = manager().await;
        manager.create(seven_am("a", &[])).await.unwrap();

        let err = manager
            .update(
                "a",
                AlarmUpdate {
                    feed_kind: Some(FeedKind::CustomPrompt),
                    label: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(manager.get("a").await.unwrap().label, "Wake up");

        let updated = manager
            .update(
                "a",
                AlarmUpdate {
                    time_of_day: Some(NaiveTime::from_hms_opt(6, 15, 0).unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.time_of_day, NaiveTime::from_hms_opt(6, 15, 0).unwrap());
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let (manager, _) = manager().await;
        assert!(matches!(manager.get("x").await, Err(AlarmError::NotFound(_))));
        assert!(matches!(manager.enable("x").await, Err(AlarmError::NotFound(_))));
        assert!(matches!(
            manager.update("x", AlarmUpdate::default()).await,
            Err(AlarmError::NotFound(_))
        ));
        assert!(matches!(
            manager.snooze("x", Duration::minutes(9), monday(7, 0, 0)).await,
            Err(AlarmError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn snooze_on_disabled_alarm_is_invalid_state() {
        let (manager, _) = manager().await;
        manager.create(seven_am("a", &[]).enabled(false)).await.unwrap();
        assert!(matches!(
            manager.snooze("a", Duration::minutes(9), monday(7, 0, 0)).await,
            Err(AlarmError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn toggle_flips_enabled() {
        let (manager, _) = manager().await;
        manager.create(seven_am("a", &[])).await.unwrap();
        assert!(!manager.toggle("a").await.unwrap().is_enabled());
        assert!(manager.toggle("a").await.unwrap().is_enabled());
    }

    #[tokio::test]
    async fn list_sorted_orders_by_time() {
        let (manager, _) = manager().await;
        for (id, h, m) in [("late", 9, 0), ("early", 5, 45), ("mid", 7, 30)] {
            manager
                .create(NewAlarm::new(NaiveTime::from_hms_opt(h, m, 0).unwrap(), id).with_id(id))
                .await
                .unwrap();
        }
        assert_eq!(ids(&manager.list_sorted().await), vec!["early", "mid", "late"]);
    }

    #[tokio::test]
    async fn mutations_survive_reload() {
        let (manager, store) = manager().await;
        manager.create(seven_am("a", &[0, 2])).await.unwrap();
        manager.snooze("a", Duration::minutes(9), monday(6, 0, 0)).await.unwrap();

        let reloaded = AlarmManager::load(store.clone(), monday(6, 1, 0)).await;
        let alarm = reloaded.get("a").await.unwrap();
        assert_eq!(alarm.repeat_days.to_vec(), vec![0, 2]);
        assert!(alarm.is_snoozing());

        let later = AlarmManager::load(store, monday(6, 30, 0)).await;
        assert!(!later.get("a").await.unwrap().is_snoozing());
    }

    #[tokio::test]
    async fn scan_persists_one_time_disable() {
        let (manager, store) = manager().await;
        manager.create(seven_am("a", &[])).await.unwrap();
        let saves = store.saves();

        manager.scan(monday(7, 0, 0)).await;
        assert_eq!(store.saves(), saves + 1);

        let reloaded = AlarmManager::load(store, monday(7, 5, 0)).await;
        assert!(!reloaded.get("a").await.unwrap().is_enabled());
    }

    #[tokio::test]
    async fn save_failure_keeps_in_memory_change() {
        let (manager, store) = manager().await;
        store.fail_saves.store(true, Ordering::SeqCst);

        manager.create(seven_am("a", &[])).await.unwrap();
        assert!(manager.get("a").await.is_ok());
        assert!(matches!(
            manager.flush().await,
            Err(AlarmError::Persistence(PortError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn malformed_store_loads_empty() {
        let store = Arc::new(MemoryStore::with_data(b"{ this is not json"));
        let manager = AlarmManager::load(store, monday(6, 0, 0)).await;
        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_stored_ids_keep_first() {
        let data = serde_json::json!([
            { "alarm_id": "a", "alarm_time": "07:00:00", "label": "First", "enabled": true },
            { "alarm_id": "a", "alarm_time": "08:00:00", "label": "Second", "enabled": true }
        ]);
        let store = Arc::new(MemoryStore::with_data(data.to_string().as_bytes()));
        let manager = AlarmManager::load(store, monday(6, 0, 0)).await;
        assert_eq!(manager.list().await.len(), 1);
        assert_eq!(manager.get("a").await.unwrap().label, "First");
    }
}
