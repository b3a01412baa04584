//! Drip-rate actuator.
//!
//! The valve understands two single-byte commands over a serial line:
//! `1` to let resin drip and `0` to stop it. The player's control decision
//! is noisy, so [`DripGovernor`] drops a command identical to the last one
//! unless `repeat_interval` has passed since it was sent.

use std::io::Write;
use std::time::{Duration, Instant};

use crate::error::Result;

/// Two idempotent commands plus a release hook.
pub trait DripActuator {
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<A: DripActuator + ?Sized> DripActuator for Box<A> {
    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DripCommand {
    Start,
    Stop,
}

impl DripCommand {
    fn byte(self) -> &'static [u8] {
        match self {
            DripCommand::Start => b"1",
            DripCommand::Stop => b"0",
        }
    }
}

/// Debounced writer of drip commands.
pub struct DripGovernor<W: Write> {
    out: W,
    repeat_interval: Duration,
    last: Option<(DripCommand, Instant)>,
    commands_sent: u64,
}

impl<W: Write> DripGovernor<W> {
    pub fn new(out: W, repeat_interval: Duration) -> Self {
        Self {
            out,
            repeat_interval,
            last: None,
            commands_sent: 0,
        }
    }

    /// Last command actually written.
    pub fn last_command(&self) -> Option<DripCommand> {
        self.last.map(|(command, _)| command)
    }

    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Write `command` unless it repeats the last one too soon.
    pub fn send(&mut self, command: DripCommand) -> Result<bool> {
        let now = Instant::now();
        if let Some((last, at)) = self.last {
            if last == command && now.duration_since(at) < self.repeat_interval {
                return Ok(false);
            }
        }
        self.out.write_all(command.byte())?;
        self.out.flush()?;
        self.last = Some((command, now));
        self.commands_sent += 1;
        tracing::debug!(?command, "drip actuator");
        Ok(true)
    }
}

impl DripGovernor<Box<dyn serialport::SerialPort>> {
    /// Open the actuator's serial port.
    pub fn open_serial(port: &str, baud_rate: u32, repeat_interval: Duration) -> Result<Self> {
        let serial = serialport::new(port, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| {
                tracing::warn!("failed to open drip actuator on {port}: {e}");
                e
            })?;
        tracing::info!(port, baud_rate, "drip actuator connected");
        Ok(Self::new(serial, repeat_interval))
    }
}

impl<W: Write> DripActuator for DripGovernor<W> {
    fn start(&mut self) -> Result<()> {
        self.send(DripCommand::Start).map(|_| ())
    }

    fn stop(&mut self) -> Result<()> {
        self.send(DripCommand::Stop).map(|_| ())
    }

    fn close(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
