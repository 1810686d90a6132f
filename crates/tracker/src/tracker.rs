#![forbid(unsafe_code)]

use crate::accounting::reset_tool_state;
use crate::clock::{Clock, epoch_seconds, log_timestamp};
use crate::domain::{
    NozzleMap, PrintLogEntry, ProfileMap, ReplacementLogEntry, ToolId, ToolState, ToolStateMap,
    extract_tool_id_from_command,
};
use crate::error::Error;
use crate::payload::StatusPayload;
use crate::persistence::{SettingsStore, keys};
use crate::repair::{NormalizedSettings, ensure_settings, load_nozzles, load_print_log};
use crate::scheduler::PersistPolicy;
use crate::session::{Effect, Flush, PrintEvent, Session, SessionEvent, Transition, transition};
use chrono::{DateTime, Utc};
use config::Config;
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) struct TrackerInner {
    pub(crate) config: Config,
    pub(crate) store: Box<dyn SettingsStore>,
    pub(crate) clock: Arc<dyn Clock>,
    policy: PersistPolicy,
    pub(crate) settings: NormalizedSettings,
    pub(crate) session: Session,
    pub(crate) nozzles: NozzleMap,
    pub(crate) current_nozzle: Option<String>,
    pub(crate) print_log: Vec<PrintLogEntry>,
    /// Epoch seconds at which the current print segment started.
    print_started_at: Option<f64>,
}

impl TrackerInner {
    fn new(config: Config, store: Box<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        let now = epoch_seconds(clock.now());
        let active_tool = ToolId::parse(&config.defaults.initial_tool).unwrap_or_default();
        let mut inner = Self {
            policy: PersistPolicy::new(config.persistence.flush_interval),
            config,
            store,
            clock,
            settings: NormalizedSettings::default(),
            session: Session::new(active_tool, now),
            nozzles: NozzleMap::new(),
            current_nozzle: None,
            print_log: Vec::new(),
            print_started_at: None,
        };
        inner.load();
        inner
    }

    /// Read every key from the store and repair the wear settings.
    /// Returns whether the repair changed anything.
    fn load(&mut self) -> bool {
        let get = |key: &str| self.store.get(&[key]).unwrap_or(Value::Null);
        let raw_profiles = get(keys::NOZZLE_PROFILES);
        let raw_tools = get(keys::TOOL_STATE);
        let raw_log = get(keys::REPLACEMENT_LOG);

        self.nozzles = load_nozzles(&get(keys::NOZZLES));
        self.current_nozzle = get(keys::DEFAULT_NOZZLE_ID).as_str().map(str::to_owned);
        self.print_log = load_print_log(&get(keys::PRINT_LOG));

        self.settings = ensure_settings(&raw_profiles, &raw_tools, &raw_log, &self.config.defaults);
        let (profiles, tools, log) = self.settings.to_values();
        let repaired = profiles != raw_profiles || tools != raw_tools || log != raw_log;
        if repaired {
            debug!("wear settings were repaired on load");
        }
        repaired
    }

    fn write_wear_settings(&mut self) {
        let (profiles, tools, log) = self.settings.to_values();
        self.store.set(&[keys::NOZZLE_PROFILES], profiles);
        self.store.set(&[keys::TOOL_STATE], tools);
        self.store.set(&[keys::REPLACEMENT_LOG], log);
    }

    fn write_nozzle_settings(&mut self) {
        let nozzles = serde_json::to_value(&self.nozzles).unwrap_or_default();
        let log = serde_json::to_value(&self.print_log).unwrap_or_default();
        self.store.set(&[keys::NOZZLES], nozzles);
        self.store.set(&[keys::PRINT_LOG], log);
    }

    /// Write and save the wear settings if `flush` says so.
    fn persist(&mut self, flush: Flush, now: f64) -> Result<bool, Error> {
        if !self.policy.should_flush(&self.session, now, flush) {
            return Ok(false);
        }
        self.write_wear_settings();
        self.store.save()?;
        self.session.mark_persisted(now);
        debug!(?flush, "tool state flushed");
        Ok(true)
    }

    /// Like [`Self::persist`], but a failed save is only logged. The state
    /// stays dirty and the next due flush retries it.
    fn persist_or_warn(&mut self, flush: Flush, now: f64) {
        if let Err(err) = self.persist(flush, now) {
            warn!(%err, ?flush, "failed to persist tool state");
        }
    }

    /// Run one session event and carry out its effects.
    fn apply(&mut self, event: SessionEvent, now: f64) -> u64 {
        let Transition {
            session,
            tools,
            elapsed,
            effects,
        } = transition(
            &self.session,
            &self.settings.tool_state,
            &event,
            now,
            &self.config.defaults.profile_id,
        );
        let tools = match tools {
            Cow::Owned(tools) => Some(tools),
            Cow::Borrowed(_) => None,
        };
        if let Some(tools) = tools {
            self.settings.tool_state = tools;
        }
        self.session = session;
        if elapsed > 0 {
            debug!(tool = %self.session.active_tool, elapsed, "charged print time");
        }

        for effect in effects {
            match effect {
                Effect::Persist(flush) => self.persist_or_warn(flush, now),
            }
        }
        elapsed
    }

    fn handle_print_event(&mut self, event: PrintEvent, payload: &Value) {
        let span = tracing::debug_span!("print_event", %event);
        let _enter = span.enter();

        let at = self.clock.now();
        let now = epoch_seconds(at);
        if event.ends_segment() {
            self.charge_nozzle(payload, at);
            self.print_started_at = None;
        } else {
            self.print_started_at = Some(now);
        }
        self.apply(SessionEvent::Print(event), now);
        info!(tool = %self.session.active_tool, phase = ?self.session.phase, "print event handled");
    }

    /// Add the finished segment to the selected inventory nozzle and the
    /// print log. The following forced flush saves it.
    fn charge_nozzle(&mut self, payload: &Value, at: DateTime<Utc>) {
        let (Some(started), Some(nozzle_id)) = (self.print_started_at, self.current_nozzle.clone())
        else {
            return;
        };
        let Some(nozzle) = self.nozzles.get_mut(&nozzle_id) else {
            return;
        };

        let hours = (epoch_seconds(at) - started).max(0.0) / 3600.0;
        nozzle.runtime += hours;
        let nozzle_name = if nozzle.name.is_empty() {
            nozzle_id.clone()
        } else {
            nozzle.name.clone()
        };
        let file = payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_owned();

        debug!(%nozzle_id, hours, %file, "charged nozzle runtime");
        self.print_log.push(PrintLogEntry {
            timestamp: log_timestamp(at),
            nozzle_id,
            nozzle_name,
            file,
            duration: hours,
        });
        self.write_nozzle_settings();
    }
}

/// Shared handle to the tracker state. Every operation holds the one lock
/// for its whole event-to-persist sequence.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<Mutex<TrackerInner>>,
    clock: Arc<dyn Clock>,
}

impl Tracker {
    /// Build a tracker over `store`. The store is read and repaired in
    /// memory; nothing is written until [`Tracker::startup`] or the first
    /// flush.
    pub fn new(config: Config, store: Box<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        let inner = TrackerInner::new(config, store, clock.clone());
        Self {
            inner: Arc::new(Mutex::new(inner)),
            clock,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Reload, repair and save all settings.
    pub fn startup(&self) -> Result<(), Error> {
        let mut inner = self.lock();
        if inner.load() {
            warn!("repaired malformed wear settings");
        }
        let now = epoch_seconds(inner.clock.now());
        inner.persist(Flush::Forced, now)?;
        info!(
            profiles = inner.settings.profiles.len(),
            tools = inner.settings.tool_state.len(),
            nozzles = inner.nozzles.len(),
            "nozzle tracker started"
        );
        Ok(())
    }

    /// Host lifecycle callback. Unknown event names are ignored.
    pub fn on_event(&self, event_name: &str, payload: &Value) {
        match event_name.parse::<PrintEvent>() {
            Ok(event) => self.lock().handle_print_event(event, payload),
            Err(_) => debug!(event = event_name, "ignoring host event"),
        }
    }

    /// Outgoing G-code hook. Returns the tool switched to, if `cmd` is a
    /// tool-change directive.
    pub fn on_gcode_sent(&self, cmd: &str) -> Option<ToolId> {
        let tool_id = extract_tool_id_from_command(cmd)?;
        let mut inner = self.lock();
        let now = epoch_seconds(inner.clock.now());
        inner.apply(SessionEvent::ToolChange(tool_id.clone()), now);
        debug!(tool = %tool_id, "tool change");
        Some(tool_id)
    }

    /// Background wake-up: charge the active tool and flush if due.
    /// Returns the seconds charged.
    pub fn tick(&self) -> u64 {
        let mut inner = self.lock();
        let now = epoch_seconds(inner.clock.now());
        inner.apply(SessionEvent::Tick, now)
    }

    /// Flush tool state now (`force`) or only if due.
    pub fn flush(&self, force: bool) -> Result<bool, Error> {
        let mut inner = self.lock();
        let now = epoch_seconds(inner.clock.now());
        let flush = if force { Flush::Forced } else { Flush::IfDue };
        inner.persist(flush, now)
    }

    pub fn get_profiles(&self) -> ProfileMap {
        self.lock().settings.profiles.clone()
    }

    pub fn get_tool_state(&self) -> ToolStateMap {
        self.lock().settings.tool_state.clone()
    }

    pub fn replacement_log(&self) -> Vec<ReplacementLogEntry> {
        self.lock().settings.replacement_log.clone()
    }

    pub fn session(&self) -> Session {
        self.lock().session.clone()
    }

    /// Assign `profile_id` to an existing tool and save immediately. The
    /// assignment holds even if the save fails.
    pub fn set_tool_profile(&self, tool_id: &str, profile_id: &str) -> Result<ToolState, Error> {
        let tool_id: ToolId = tool_id.parse()?;
        let mut inner = self.lock();

        if !inner.settings.profiles.contains_key(profile_id) {
            return Err(Error::InvalidReference(format!(
                "profile {profile_id:?} not found"
            )));
        }
        let Some(state) = inner.settings.tool_state.get_mut(&tool_id) else {
            return Err(Error::InvalidReference(format!("tool {tool_id} not found")));
        };
        state.profile_id = profile_id.to_owned();
        let state = state.clone();

        inner.session.dirty = true;
        let now = epoch_seconds(inner.clock.now());
        inner.persist_or_warn(Flush::Forced, now);
        info!(tool = %tool_id, profile = profile_id, "tool profile assigned");
        Ok(state)
    }

    /// Zero a tool's counter, log the replacement and save immediately.
    /// A failed save leaves the reset in place for the next flush.
    pub fn reset_tool(&self, tool_id: &str) -> Result<ToolState, Error> {
        let tool_id: ToolId = tool_id.parse()?;
        let mut inner = self.lock();
        let at = inner.clock.now();

        let (tools, log) = reset_tool_state(
            &inner.settings.tool_state,
            &inner.settings.replacement_log,
            tool_id.as_str(),
            &log_timestamp(at),
            None,
            &inner.config.defaults.profile_id,
        )?;
        let state = tools
            .get(&tool_id)
            .cloned()
            .ok_or_else(|| Error::InvalidReference(format!("tool {tool_id} not found")))?;
        let seconds_at_reset = log.last().map_or(0, |entry| entry.accumulated_seconds_at_reset);
        inner.settings.tool_state = tools;
        inner.settings.replacement_log = log;
        inner.session.dirty = true;

        inner.persist_or_warn(Flush::Forced, epoch_seconds(at));
        info!(tool = %tool_id, seconds_at_reset, "tool reset");
        Ok(state)
    }

    /// Wear summary with `generated_at` passed through.
    pub fn status_payload(&self, generated_at: Value) -> StatusPayload {
        let inner = self.lock();
        StatusPayload::from_settings(&inner.settings, generated_at, &inner.config.defaults)
    }

    /// Merge host-edited settings into the store, then reload, repair and
    /// save everything. Live counters are written first so the reload
    /// cannot roll them back.
    pub fn save_settings(&self, patch: Value) -> Result<(), Error> {
        let mut inner = self.lock();
        inner.write_wear_settings();
        inner.store.merge(patch);
        inner.load();
        inner.write_wear_settings();
        inner.store.save()?;
        let now = epoch_seconds(inner.clock.now());
        inner.session.mark_persisted(now);
        info!("settings saved");
        Ok(())
    }
}
