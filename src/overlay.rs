use chrono::{DateTime, Days, Duration, Local};
use clap::ValueEnum;
use rand::Rng;
use serde::Serialize;

/// Alarm intensity ramp per 10 Hz alarm tick while active.
const ALARM_RAMP: f32 = 0.1;
/// Intensity decay per tick once the alarm deactivates without a dismiss.
const ALARM_DECAY: f32 = 0.15;
/// Wave offset advances 5 per tick, cycling within 0..200.
const WAVE_STEP: u32 = 5;
const WAVE_PERIOD: u32 = 200;
/// A deadline tick flash survives this many animation sub-ticks.
const TICK_FLASH_TICKS: u8 = 2;

pub const DEADLINE_REACHED_MESSAGE: &str = "DEADLINE REACHED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Current local time.
    Clock,
    /// Count down a fixed duration.
    Countdown,
    /// Count down to the end of the day (23:59:59).
    Midnight,
    /// Countdown with escalating horror styling and an alarm at zero.
    Deadline,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Mode::Clock => "clock",
            Mode::Countdown => "countdown",
            Mode::Midnight => "midnight",
            Mode::Deadline => "deadline",
        };
        write!(f, "{name}")
    }
}

/// Forbidden-alarm overlay state, orthogonal to the mode. Auto-triggered by
/// Deadline hitting zero, or externally over IPC from any mode.
#[derive(Debug, Clone, Default)]
pub struct Alarm {
    pub active: bool,
    pub message: String,
    pub window_class: String,
    pub window_title: String,
    /// Ramped/decayed scalar in [0, 1] driving visual strength.
    pub intensity: f32,
    pub wave_offset: u32,
    pub shake_offset: (i32, i32),
}

#[derive(Debug, Clone)]
pub struct DeadlineAnim {
    pub pulse_frame: u64,
    pub tick_state: bool,
    tick_age: u8,
    pub last_second: i64,
}

impl Default for DeadlineAnim {
    fn default() -> Self {
        Self {
            pulse_frame: 0,
            tick_state: false,
            tick_age: 0,
            last_second: -1,
        }
    }
}

/// One overlay's display/animation state machine. Kept free of any
/// windowing types so every transition is unit-testable; the pane wrapper in
/// `app` pairs it with a surface and canvas.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub mode: Mode,
    /// Present iff `mode != Clock`; computed once at construction and only
    /// dropped by a deadline reset.
    pub end_time: Option<DateTime<Local>>,
    pub is_flashing: bool,
    pub flash_state: bool,
    pub animation_frame: u64,
    pub alarm: Alarm,
    pub deadline: DeadlineAnim,
    alarm_timer_requested: bool,
}

impl Overlay {
    pub fn new(mode: Mode, duration_seconds: Option<u64>, now: DateTime<Local>) -> Self {
        let end_time = match mode {
            Mode::Clock => None,
            Mode::Countdown | Mode::Deadline => {
                let secs = duration_seconds.unwrap_or(0);
                Some(now + Duration::seconds(secs as i64))
            }
            Mode::Midnight => Some(next_midnight(now)),
        };

        Self {
            mode,
            end_time,
            is_flashing: false,
            flash_state: false,
            animation_frame: 0,
            alarm: Alarm::default(),
            deadline: DeadlineAnim::default(),
            alarm_timer_requested: false,
        }
    }

    /// Whole seconds remaining, never negative. Zero for Clock mode.
    pub fn remaining_seconds(&self, now: DateTime<Local>) -> i64 {
        self.end_time
            .map(|end| (end - now).num_seconds().max(0))
            .unwrap_or(0)
    }

    /// The HH:MM:SS string for this frame, advancing countdown transitions
    /// as a side effect: reaching zero pins the text to "00:00:00" and
    /// either starts flashing or, in Deadline mode, raises the alarm.
    pub fn display_text(&mut self, now: DateTime<Local>) -> String {
        match self.mode {
            Mode::Clock => now.format("%H:%M:%S").to_string(),
            Mode::Countdown | Mode::Midnight | Mode::Deadline => {
                let Some(end) = self.end_time else {
                    return "ERROR".to_string();
                };
                let remaining = (end - now).num_seconds();
                if remaining <= 0 {
                    if self.mode == Mode::Deadline {
                        if !self.alarm.active {
                            self.trigger_alarm("", "", DEADLINE_REACHED_MESSAGE);
                        }
                    } else {
                        self.is_flashing = true;
                    }
                    "00:00:00".to_string()
                } else {
                    format!(
                        "{:02}:{:02}:{:02}",
                        remaining / 3600,
                        (remaining % 3600) / 60,
                        remaining % 60
                    )
                }
            }
        }
    }

    /// 1 Hz tick: toggles the flash phase while flashing.
    pub fn tick_second(&mut self) {
        if self.is_flashing {
            self.flash_state = !self.flash_state;
        }
    }

    /// Animation tick (20 Hz lightbulb / 3 Hz deadline): advances the phase
    /// counter, and in Deadline mode the pulse frame and the bounded
    /// tick-flash window.
    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);

        if self.mode == Mode::Deadline {
            self.deadline.pulse_frame = self.deadline.pulse_frame.wrapping_add(1);
            if self.deadline.tick_state {
                self.deadline.tick_age += 1;
                if self.deadline.tick_age >= TICK_FLASH_TICKS {
                    self.deadline.tick_state = false;
                    self.deadline.tick_age = 0;
                }
            }
        }
    }

    /// 10 Hz alarm tick. Ramps intensity while active, decays it while
    /// inactive, and returns whether the timer should keep running; `false`
    /// means fully decayed and inactive, so the caller drops the timer.
    pub fn tick_alarm(&mut self, rng: &mut impl Rng) -> bool {
        if self.alarm.active {
            self.alarm.intensity = (self.alarm.intensity + ALARM_RAMP).min(1.0);
            self.alarm.wave_offset = (self.alarm.wave_offset + WAVE_STEP) % WAVE_PERIOD;

            let magnitude = (3.0 * self.alarm.intensity) as i32;
            self.alarm.shake_offset = if magnitude > 0 {
                (
                    rng.gen_range(-magnitude..=magnitude),
                    rng.gen_range(-magnitude..=magnitude),
                )
            } else {
                (0, 0)
            };
            true
        } else if self.alarm.intensity > 0.0 {
            self.alarm.intensity = (self.alarm.intensity - ALARM_DECAY).max(0.0);
            true
        } else {
            false
        }
    }

    /// Activate the forbidden alarm. Intensity restarts at zero and ramps up
    /// over the following alarm ticks.
    pub fn trigger_alarm(&mut self, window_class: &str, window_title: &str, message: &str) {
        self.alarm.active = true;
        self.alarm.window_class = window_class.to_string();
        self.alarm.window_title = window_title.to_string();
        self.alarm.message = message.to_string();
        self.alarm.intensity = 0.0;
        self.alarm_timer_requested = true;
    }

    /// Immediate clear, deliberately skipping the decay ramp; the alarm
    /// timer observes zero intensity on its next firing and stops.
    pub fn dismiss_alarm(&mut self) {
        self.alarm.active = false;
        self.alarm.intensity = 0.0;
        self.alarm.message.clear();
    }

    /// Drop back from Deadline mode (or an active alarm) to a plain clock.
    /// Returns false when neither applies, leaving all state untouched.
    pub fn reset_deadline(&mut self) -> bool {
        if self.mode != Mode::Deadline && !self.alarm.active {
            return false;
        }

        self.mode = Mode::Clock;
        self.end_time = None;
        self.is_flashing = false;
        self.flash_state = false;
        self.alarm = Alarm::default();
        self.deadline = DeadlineAnim::default();
        true
    }

    /// Record a change of the displayed second for the deadline tick flash.
    pub fn note_deadline_second(&mut self, remaining_seconds: i64) {
        let current = remaining_seconds % 60;
        if current != self.deadline.last_second {
            self.deadline.last_second = current;
            self.deadline.tick_state = true;
            self.deadline.tick_age = 0;
        }
    }

    /// Consume the one-shot request to start the alarm animation timer.
    pub fn take_alarm_timer_request(&mut self) -> bool {
        std::mem::take(&mut self.alarm_timer_requested)
    }
}

/// 23:59:59 today, i.e. next local midnight minus one second. Falls back to
/// now + 24h − 1s across DST gaps where the wall-clock midnight is ambiguous.
pub fn next_midnight(now: DateTime<Local>) -> DateTime<Local> {
    now.date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .map(|midnight| midnight - Duration::seconds(1))
        .unwrap_or_else(|| now + Duration::seconds(86_399))
}
