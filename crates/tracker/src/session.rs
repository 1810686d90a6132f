#![forbid(unsafe_code)]

//! Print-session state machine.
//!
//! [`transition`] is pure: it takes the current session and tool state and
//! returns the next ones plus the persistence effects the caller must carry
//! out. Nothing in here touches the settings store.

use crate::accounting::{accumulate, compute_elapsed_seconds, ensure_tool};
use crate::domain::{ToolId, ToolStateMap};
use crate::error::Error;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Printing,
}

/// Print lifecycle notifications delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrintEvent {
    Started,
    Resumed,
    Paused,
    Done,
    Cancelled,
    Failed,
}

impl PrintEvent {
    pub const ALL: [Self; 6] = [
        Self::Started,
        Self::Resumed,
        Self::Paused,
        Self::Done,
        Self::Cancelled,
        Self::Failed,
    ];

    /// Event name as the host spells it.
    pub fn name(self) -> &'static str {
        match self {
            Self::Started => "PrintStarted",
            Self::Resumed => "PrintResumed",
            Self::Paused => "PrintPaused",
            Self::Done => "PrintDone",
            Self::Cancelled => "PrintCancelled",
            Self::Failed => "PrintFailed",
        }
    }

    /// Whether the event stops the clock for the active tool.
    pub fn ends_segment(self) -> bool {
        !matches!(self, Self::Started | Self::Resumed)
    }
}

impl FromStr for PrintEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.name() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown print event: {s:?}")))
    }
}

impl fmt::Display for PrintEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime state of the current print session. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub phase: Phase,
    pub active_tool: ToolId,
    /// Epoch seconds of the last accounting step while printing.
    pub last_tick_ts: Option<f64>,
    /// Tool state has changes the settings store has not seen.
    pub dirty: bool,
    /// Epoch seconds of the last successful flush.
    pub last_persist_ts: f64,
}

impl Session {
    pub fn new(active_tool: ToolId, now: f64) -> Self {
        Self {
            phase: Phase::Idle,
            active_tool,
            last_tick_ts: None,
            dirty: false,
            last_persist_ts: now,
        }
    }

    pub fn is_printing(&self) -> bool {
        self.phase == Phase::Printing
    }

    pub fn mark_persisted(&mut self, now: f64) {
        self.dirty = false;
        self.last_persist_ts = now;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Print(PrintEvent),
    ToolChange(ToolId),
    /// Periodic wake-up of the background scheduler.
    Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Write only if dirty and the flush interval has passed.
    IfDue,
    /// Write now.
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Persist(Flush),
}

#[derive(Debug)]
pub struct Transition<'a> {
    pub session: Session,
    /// Borrowed when the event left tool state untouched.
    pub tools: Cow<'a, ToolStateMap>,
    /// Seconds charged to tools by this event.
    pub elapsed: u64,
    pub effects: Vec<Effect>,
}

struct Step<'a, 'p> {
    session: Session,
    tools: Cow<'a, ToolStateMap>,
    elapsed: u64,
    effects: Vec<Effect>,
    default_profile_id: &'p str,
}

impl Step<'_, '_> {
    /// Charge the time since the last tick to the active tool.
    fn tick(&mut self, now: f64) {
        if !self.session.is_printing() {
            return;
        }
        let elapsed = compute_elapsed_seconds(self.session.last_tick_ts, Some(now));
        self.session.last_tick_ts = Some(now);
        if elapsed == 0 {
            return;
        }

        let delta = i64::try_from(elapsed).unwrap_or(i64::MAX);
        let (updated, changed) = accumulate(
            &self.tools,
            self.session.active_tool.as_str(),
            delta,
            self.default_profile_id,
        );
        if changed {
            let updated = updated.into_owned();
            self.tools = Cow::Owned(updated);
            self.session.dirty = true;
            self.elapsed += elapsed;
        }
    }

    fn ensure_active_tool(&mut self) {
        let created = match ensure_tool(
            &self.tools,
            &self.session.active_tool,
            self.default_profile_id,
        ) {
            Cow::Owned(tools) => Some(tools),
            Cow::Borrowed(_) => None,
        };
        if let Some(tools) = created {
            self.tools = Cow::Owned(tools);
            self.session.dirty = true;
        }
    }
}

/// Apply one event at time `now` (epoch seconds).
pub fn transition<'a>(
    session: &Session,
    tools: &'a ToolStateMap,
    event: &SessionEvent,
    now: f64,
    default_profile_id: &str,
) -> Transition<'a> {
    let mut step = Step {
        session: session.clone(),
        tools: Cow::Borrowed(tools),
        elapsed: 0,
        effects: Vec::new(),
        default_profile_id,
    };

    match event {
        SessionEvent::Print(print) if !print.ends_segment() => {
            step.tick(now);
            step.ensure_active_tool();
            step.session.phase = Phase::Printing;
            step.session.last_tick_ts = Some(now);
        }
        SessionEvent::Print(_) => {
            step.tick(now);
            step.session.phase = Phase::Idle;
            step.session.last_tick_ts = None;
            step.effects.push(Effect::Persist(Flush::Forced));
        }
        SessionEvent::ToolChange(tool_id) if step.session.is_printing() => {
            step.tick(now);
            step.session.active_tool = tool_id.clone();
            step.ensure_active_tool();
            step.session.last_tick_ts = Some(now);
            step.effects.push(Effect::Persist(Flush::IfDue));
        }
        SessionEvent::ToolChange(tool_id) => {
            step.session.active_tool = tool_id.clone();
            step.ensure_active_tool();
        }
        SessionEvent::Tick => {
            step.tick(now);
            step.effects.push(Effect::Persist(Flush::IfDue));
        }
    }

    Transition {
        session: step.session,
        tools: step.tools,
        elapsed: step.elapsed,
        effects: step.effects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ToolState;
    use pretty_assertions::assert_eq;

    const PROFILE: &str = "p";

    fn id(text: &str) -> ToolId {
        ToolId::parse(text).unwrap()
    }

    fn seconds(tools: &ToolStateMap, tool: &str) -> u64 {
        tools.get(&id(tool)).map_or(0, |s| s.accumulated_seconds)
    }

    /// Feed `events` through the machine, returning the final state and all
    /// effects in order.
    fn run(events: &[(f64, SessionEvent)]) -> (Session, ToolStateMap, Vec<Effect>) {
        let mut session = Session::new(ToolId::zero(), 0.0);
        let mut tools =
            ToolStateMap::from([(ToolId::zero(), ToolState::new(ToolId::zero(), PROFILE))]);
        let mut effects = Vec::new();
        for (now, event) in events {
            let next = transition(&session, &tools, event, *now, PROFILE);
            session = next.session;
            effects.extend(next.effects);
            tools = next.tools.into_owned();
        }
        (session, tools, effects)
    }

    #[test]
    fn parses_host_event_names() {
        for event in PrintEvent::ALL {
            assert_eq!(event.name().parse::<PrintEvent>().unwrap(), event);
        }
        assert!("Connected".parse::<PrintEvent>().is_err());
    }

    #[test]
    fn start_then_done_charges_active_tool() {
        let (session, tools, effects) = run(&[
            (100.0, SessionEvent::Print(PrintEvent::Started)),
            (160.5, SessionEvent::Print(PrintEvent::Done)),
        ]);

        assert_eq!(seconds(&tools, "T0"), 60);
        assert_eq!(session.phase, Phase::Idle);
        assert_eq!(session.last_tick_ts, None);
        assert!(session.dirty);
        assert_eq!(effects, vec![Effect::Persist(Flush::Forced)]);
    }

    #[test]
    fn tool_changes_split_time_between_tools() {
        let (session, tools, effects) = run(&[
            (0.0, SessionEvent::Print(PrintEvent::Started)),
            (30.0, SessionEvent::ToolChange(id("T1"))),
            (50.0, SessionEvent::ToolChange(id("T0"))),
            (55.0, SessionEvent::Print(PrintEvent::Paused)),
        ]);

        assert_eq!(seconds(&tools, "T0"), 35);
        assert_eq!(seconds(&tools, "T1"), 20);
        assert_eq!(tools[&id("T1")].profile_id, PROFILE);
        assert_eq!(session.active_tool, id("T0"));
        assert_eq!(
            effects,
            vec![
                Effect::Persist(Flush::IfDue),
                Effect::Persist(Flush::IfDue),
                Effect::Persist(Flush::Forced),
            ]
        );
    }

    #[test]
    fn idle_tool_change_only_switches() {
        let (session, tools, effects) = run(&[(10.0, SessionEvent::ToolChange(id("T2")))]);

        assert_eq!(session.active_tool, id("T2"));
        assert_eq!(session.phase, Phase::Idle);
        assert_eq!(seconds(&tools, "T2"), 0);
        assert!(tools.contains_key(&id("T2")));
        assert!(session.dirty);
        assert!(effects.is_empty());
    }

    #[test]
    fn idle_tool_change_to_known_tool_borrows() {
        let session = Session::new(ToolId::zero(), 0.0);
        let tools =
            ToolStateMap::from([(ToolId::zero(), ToolState::new(ToolId::zero(), PROFILE))]);
        let event = SessionEvent::ToolChange(ToolId::zero());
        let next = transition(&session, &tools, &event, 1.0, PROFILE);
        assert!(matches!(next.tools, Cow::Borrowed(_)));
        assert!(!next.session.dirty);
    }

    #[test]
    fn restart_while_printing_flushes_first() {
        let (session, tools, effects) = run(&[
            (0.0, SessionEvent::Print(PrintEvent::Started)),
            (40.0, SessionEvent::Print(PrintEvent::Started)),
            (45.0, SessionEvent::Print(PrintEvent::Done)),
        ]);
        assert_eq!(seconds(&tools, "T0"), 45);
        assert_eq!(session.phase, Phase::Idle);
        assert_eq!(effects, vec![Effect::Persist(Flush::Forced)]);
    }

    #[test]
    fn pause_and_resume_skip_paused_time() {
        let (_, tools, _) = run(&[
            (0.0, SessionEvent::Print(PrintEvent::Started)),
            (10.0, SessionEvent::Print(PrintEvent::Paused)),
            (500.0, SessionEvent::Print(PrintEvent::Resumed)),
            (520.0, SessionEvent::Print(PrintEvent::Cancelled)),
        ]);
        assert_eq!(seconds(&tools, "T0"), 30);
    }

    #[test]
    fn every_tick_requests_due_check() {
        let (session, tools, effects) = run(&[
            (0.0, SessionEvent::Print(PrintEvent::Started)),
            (0.5, SessionEvent::Tick),
            (61.0, SessionEvent::Tick),
        ]);
        assert_eq!(seconds(&tools, "T0"), 60);
        assert!(session.dirty);
        assert_eq!(effects, vec![Effect::Persist(Flush::IfDue); 2]);
    }

    #[test]
    fn tick_while_idle_is_a_noop() {
        let session = Session::new(ToolId::zero(), 0.0);
        let tools = ToolStateMap::new();
        let next = transition(&session, &tools, &SessionEvent::Tick, 99.0, PROFILE);
        assert_eq!(next.elapsed, 0);
        assert_eq!(next.session, session);
        assert_eq!(next.effects, vec![Effect::Persist(Flush::IfDue)]);
        assert!(matches!(next.tools, Cow::Borrowed(_)));
    }

    #[test]
    fn clock_regression_charges_nothing() {
        let (session, tools, _) = run(&[
            (100.0, SessionEvent::Print(PrintEvent::Started)),
            (90.0, SessionEvent::Tick),
            (95.0, SessionEvent::Tick),
        ]);
        assert_eq!(seconds(&tools, "T0"), 5);
        assert_eq!(session.last_tick_ts, Some(95.0));
    }

    #[test]
    fn stop_while_idle_still_forces_flush() {
        let (_, _, effects) = run(&[(5.0, SessionEvent::Print(PrintEvent::Failed))]);
        assert_eq!(effects, vec![Effect::Persist(Flush::Forced)]);
    }
}
