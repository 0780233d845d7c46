//! Outbound media watchdog.
//!
//! Some networks complete ICE but never carry our RTP: the connection reports
//! `connected` while the outbound byte counters stay at zero. The watchdog
//! samples those counters and asks for a renegotiation once the counters have
//! been stuck for a few consecutive samples.

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Time between two stats samples.
    pub interval: Duration,
    /// Consecutive zero-outbound samples that trigger a renegotiation.
    pub zero_threshold: u32,
    /// Samples taken per session before the watchdog stops.
    pub max_samples: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            zero_threshold: 3,
            max_samples: 10,
        }
    }
}

/// RTP byte counters of one stats sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboundSample {
    pub audio_bytes_out: u64,
    pub video_bytes_out: u64,
    pub audio_bytes_in: u64,
    pub video_bytes_in: u64,
}

impl OutboundSample {
    pub fn bytes_out(&self) -> u64 {
        self.audio_bytes_out + self.video_bytes_out
    }

    pub fn bytes_in(&self) -> u64 {
        self.audio_bytes_in + self.video_bytes_in
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    /// Keep sampling.
    Continue,
    /// Outbound media is stuck; renegotiate the existing connection.
    Renegotiate,
    /// Sampling budget exhausted.
    Stop,
}

/// Per-session watchdog state. Triggers at most once until outbound media
/// recovers.
#[derive(Debug, Clone)]
pub struct OutboundMediaWatchdog {
    config: WatchdogConfig,
    samples: u32,
    zero_streak: u32,
    triggered: bool,
}

impl OutboundMediaWatchdog {
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            samples: 0,
            zero_streak: 0,
            triggered: false,
        }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Feed one sample. `media_connected` is the ICE-level connectivity at
    /// sampling time; samples taken before media connects never count as
    /// stuck.
    pub fn observe(&mut self, sample: &OutboundSample, media_connected: bool) -> WatchdogAction {
        if self.samples >= self.config.max_samples {
            return WatchdogAction::Stop;
        }
        self.samples += 1;

        if sample.bytes_out() > 0 {
            self.zero_streak = 0;
            self.triggered = false;
            return WatchdogAction::Continue;
        }
        if !media_connected {
            self.zero_streak = 0;
            return WatchdogAction::Continue;
        }

        self.zero_streak += 1;
        if self.zero_streak >= self.config.zero_threshold && !self.triggered {
            self.triggered = true;
            return WatchdogAction::Renegotiate;
        }
        WatchdogAction::Continue
    }
}

impl Default for OutboundMediaWatchdog {
    fn default() -> Self {
        Self::new(WatchdogConfig::default())
    }
}
