use chrono::{DateTime, Duration, Utc};

/// Coarse status reported to telemetry and the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AlertStatus {
    Normal,
    Alert,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Normal => write!(f, "Normal"),
            AlertStatus::Alert => write!(f, "Alert"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Idle,
    Suspect,
    Confirmed,
}

/// A contiguous run of target detections. At most one is active; it is
/// discarded without trace unless it crosses the debounce threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub start_time: DateTime<Utc>,
    pub confirmed: bool,
    pub snapshot_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub total_confirmed: u64,
}

/// Side effects requested by a tick. The caller owns the actuator, the
/// event store and the telemetry channel; the machine only decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertCommand {
    AlarmOn,
    AlarmOff,
    ConfirmEpisode,
}

/// Debounce core: turns the per-frame "target present" signal into
/// confirmed episodes.
///
/// A detection run only becomes an episode after `threshold` of
/// uninterrupted presence; a single absent frame resets to `Idle`
/// immediately (no negative-edge debounce — kept exactly as the original
/// behaves). `ConfirmEpisode` is emitted once per episode, on the
/// `Suspect` → `Confirmed` edge.
#[derive(Debug)]
pub struct AlertStateMachine {
    threshold: Duration,
    state: AlertState,
    episode: Option<Episode>,
    counters: Counters,
}

impl AlertStateMachine {
    pub fn new(threshold: std::time::Duration) -> Self {
        Self {
            threshold: Duration::from_std(threshold).unwrap_or(Duration::seconds(3)),
            state: AlertState::Idle,
            episode: None,
            counters: Counters::default(),
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn episode(&self) -> Option<&Episode> {
        self.episode.as_ref()
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn status(&self) -> AlertStatus {
        match self.state {
            AlertState::Idle => AlertStatus::Normal,
            AlertState::Suspect | AlertState::Confirmed => AlertStatus::Alert,
        }
    }

    /// Advances the machine by one frame observation.
    pub fn tick(&mut self, present: bool, now: DateTime<Utc>) -> Vec<AlertCommand> {
        match (self.state, present) {
            (AlertState::Idle, true) => {
                self.episode = Some(Episode {
                    start_time: now,
                    confirmed: false,
                    snapshot_path: None,
                });
                self.state = AlertState::Suspect;
                vec![AlertCommand::AlarmOn]
            }
            (AlertState::Idle, false) => vec![],
            (AlertState::Suspect, true) => {
                let start_time = self
                    .episode
                    .as_ref()
                    .map(|episode| episode.start_time)
                    .unwrap_or(now);
                if now.signed_duration_since(start_time) >= self.threshold {
                    if let Some(episode) = self.episode.as_mut() {
                        episode.confirmed = true;
                    }
                    self.state = AlertState::Confirmed;
                    self.counters.total_confirmed += 1;
                    vec![AlertCommand::ConfirmEpisode]
                } else {
                    vec![]
                }
            }
            (AlertState::Confirmed, true) => vec![],
            (AlertState::Suspect | AlertState::Confirmed, false) => {
                // Unconfirmed episodes vanish without a trace.
                self.episode = None;
                self.state = AlertState::Idle;
                vec![AlertCommand::AlarmOff]
            }
        }
    }

    /// Records where the confirmed episode's snapshot landed. First write
    /// wins; the episode is otherwise immutable after confirmation.
    pub fn note_snapshot(&mut self, path: String) {
        if let Some(episode) = self.episode.as_mut() {
            if episode.confirmed && episode.snapshot_path.is_none() {
                episode.snapshot_path = Some(path);
            }
        }
    }

    /// Counter reset for the clear-history operation. Unconditional, as in
    /// the original.
    pub fn reset_counters(&mut self) {
        self.counters = Counters::default();
    }
}
