//! Replay a slideshow cadence against a node channel
//!
//! One cycle is:
//!
//! 1. `u` with the current [ImageSet], flush, wait
//! 2. `d` with the next [ImageSet], flush, wait
//! 3. `l` [Cadence::step_count] times back to back, one flush, wait
//! 4. `o`, flush, wait
//! 5. `i`, flush, wait
//!
//! Nothing is retried. The first failing write or flush ends the cycle and is
//! returned to the caller.

use std::{convert::Infallible, thread, time::Duration};

use log::debug;
use serde::Deserialize;

use crate::{client::Channel, commands, config::Config, proto::{self, Command, ImageSet}};

/// Delays between the steps of a cycle
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Cadence {
    /// Wait after the update command
    #[serde(rename = "announce_secs", deserialize_with = "crate::config::secs")]
    pub announce: Duration,
    /// Wait after the declare-next command
    #[serde(rename = "preannounce_secs", deserialize_with = "crate::config::secs")]
    pub preannounce: Duration,
    /// Number of step commands sent in a burst
    pub step_count: usize,
    /// Wait after the burst of step commands
    #[serde(rename = "step_secs", deserialize_with = "crate::config::secs")]
    pub step: Duration,
    /// Wait after the `o` command
    #[serde(rename = "out_secs", deserialize_with = "crate::config::secs")]
    pub out: Duration,
    /// Wait after the `i` command
    #[serde(rename = "in_secs", deserialize_with = "crate::config::secs")]
    pub r#in: Duration,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            announce: Duration::from_millis(4000),
            preannounce: Duration::from_millis(500),
            step_count: 5,
            step: Duration::from_millis(5000),
            out: Duration::from_millis(2000),
            r#in: Duration::from_millis(2000),
        }
    }
}

impl Cadence {
    /// Total time spent waiting during one cycle
    pub fn cycle_wait(&self) -> Duration {
        self.announce + self.preannounce + self.step + self.out + self.r#in
    }
}

/// Decides how time passes between commands
pub trait Pacer {
    /// Block for `duration`
    fn pause(&mut self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Emits the slideshow commands, one cycle at a time
pub struct CommandEmitter<P: Pacer = ThreadPacer> {
    current: ImageSet,
    next: ImageSet,
    cadence: Cadence,
    ascii_json: bool,
    pacer: P,
    cycles: u64,
}

impl CommandEmitter<ThreadPacer> {
    /// Create an emitter pacing with real sleeps
    pub fn new(current: ImageSet, next: ImageSet) -> Self {
        Self::with_pacer(current, next, ThreadPacer)
    }

    /// Create an emitter from the image sets and cadence of a configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.current.clone(), config.next.clone())
            .cadence(config.cadence.clone())
            .ascii_json(config.ascii_json)
    }
}

impl<P: Pacer> CommandEmitter<P> {
    /// Create an emitter with a custom pacer
    pub fn with_pacer(current: ImageSet, next: ImageSet, pacer: P) -> Self {
        Self { current, next, cadence: Cadence::default(), ascii_json: false, pacer, cycles: 0 }
    }

    /// Replace the cadence
    pub fn cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    /// Escape non-ASCII characters of image set payloads as `\uXXXX`
    pub fn ascii_json(mut self, ascii_json: bool) -> Self {
        self.ascii_json = ascii_json;
        self
    }

    /// Pacer in use
    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Number of cycles completed so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one full cycle against `channel`
    pub fn run_cycle<C: Channel + ?Sized>(&mut self, channel: &mut C) -> Result<(), crate::Error> {
        debug!("Starting cycle {}", self.cycles + 1);

        let update = self.image_set_command(commands::UPDATE, &self.current)?;
        let declare = self.image_set_command(commands::DECLARE_NEXT, &self.next)?;
        let step = Command::new(commands::STEP)?;
        let out = Command::new(commands::OUT)?;
        let r#in = Command::new(commands::IN)?;

        channel.send(&update)?;
        channel.flush()?;
        self.pacer.pause(self.cadence.announce);

        channel.send(&declare)?;
        channel.flush()?;
        self.pacer.pause(self.cadence.preannounce);

        for _ in 0..self.cadence.step_count {
            channel.send(&step)?;
        }
        channel.flush()?;
        self.pacer.pause(self.cadence.step);

        channel.send(&out)?;
        channel.flush()?;
        self.pacer.pause(self.cadence.out);

        channel.send(&r#in)?;
        channel.flush()?;
        self.pacer.pause(self.cadence.r#in);

        self.cycles += 1;
        Ok(())
    }

    fn image_set_command(&self, opcode: u8, set: &ImageSet) -> Result<Command, proto::Error> {
        if self.ascii_json {
            Command::with_ascii_json(opcode, set)
        } else {
            Command::with_json(opcode, set)
        }
    }

    /// Run cycles until a write or flush fails
    pub fn run<C: Channel + ?Sized>(&mut self, channel: &mut C) -> Result<Infallible, crate::Error> {
        loop {
            self.run_cycle(channel)?;
        }
    }
}
