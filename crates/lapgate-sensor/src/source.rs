//! Edge transition sources.
//!
//! [`EdgeSource`] is the seam between the watcher and the hardware: the
//! production implementation reads a Linux GPIO character device, tests
//! script transitions through a channel-backed double.

use async_trait::async_trait;
use futures::StreamExt;
use gpio_cdev::{AsyncLineEventHandle, Chip, EventRequestFlags, EventType, LineRequestFlags};
use lapgate_core::SensorError;

/// Consumer label reported to the kernel for requested lines.
const CONSUMER: &str = "lapgate";

/// Direction of a level change on an input line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    /// Low → high.
    Rising,
    /// High → low.
    Falling,
}

/// One observed level change on a monitored channel.
///
/// The edge direction is carried for logging only — a beam being broken and
/// a beam being re-made are both evidence of a crossing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Line offset the change was observed on.
    pub channel: u32,
    /// Direction of the change.
    pub edge: Edge,
}

/// An asynchronous stream of edge transitions from one input channel.
#[async_trait]
pub trait EdgeSource: Send {
    /// Line offset this source watches.
    fn channel(&self) -> u32;

    /// Wait for the next transition.
    ///
    /// `None` means the source is permanently exhausted. `Some(Err(..))`
    /// reports a hardware read failure; the source is retired afterwards.
    async fn next_transition(&mut self) -> Option<Result<Transition, SensorError>>;
}

impl std::fmt::Debug for dyn EdgeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeSource")
            .field("channel", &self.channel())
            .finish()
    }
}

/// [`EdgeSource`] backed by a Linux GPIO character device line.
///
/// The line is requested with both-edges event notification; acquisition
/// failure (missing chip, line held by another process) is fatal at startup
/// by contract.
pub struct GpioEdgeSource {
    channel: u32,
    events: AsyncLineEventHandle,
}

impl GpioEdgeSource {
    /// Request both-edge events for one line of an already-open chip.
    pub fn from_chip(chip: &mut Chip, channel: u32) -> Result<Self, SensorError> {
        let line = chip
            .get_line(channel)
            .map_err(|e| SensorError::new("line unavailable").with_channel(channel).with_source(e))?;
        let handle = line
            .events(
                LineRequestFlags::INPUT,
                EventRequestFlags::BOTH_EDGES,
                CONSUMER,
            )
            .map_err(|e| {
                SensorError::new("edge events rejected for line")
                    .with_channel(channel)
                    .with_source(e)
            })?;
        let events = AsyncLineEventHandle::new(handle).map_err(|e| {
            SensorError::new("async event handle failed")
                .with_channel(channel)
                .with_source(e)
        })?;
        Ok(Self { channel, events })
    }

    /// Open `chip_path` and request every configured channel.
    ///
    /// Any single failure aborts the whole acquisition — running with a
    /// partial sensor set would be a silent degradation.
    pub fn open_all(
        chip_path: &str,
        channels: &[u32],
    ) -> Result<Vec<Box<dyn EdgeSource>>, SensorError> {
        let mut chip = Chip::new(chip_path)
            .map_err(|e| SensorError::new(format!("cannot open GPIO chip {chip_path}")).with_source(e))?;
        let mut sources: Vec<Box<dyn EdgeSource>> = Vec::with_capacity(channels.len());
        for &channel in channels {
            sources.push(Box::new(Self::from_chip(&mut chip, channel)?));
        }
        Ok(sources)
    }
}

#[async_trait]
impl EdgeSource for GpioEdgeSource {
    fn channel(&self) -> u32 {
        self.channel
    }

    async fn next_transition(&mut self) -> Option<Result<Transition, SensorError>> {
        let event = self.events.next().await?;
        Some(match event {
            Ok(ev) => {
                let edge = match ev.event_type() {
                    EventType::RisingEdge => Edge::Rising,
                    EventType::FallingEdge => Edge::Falling,
                };
                Ok(Transition {
                    channel: self.channel,
                    edge,
                })
            }
            Err(e) => Err(SensorError::new("line event read failed")
                .with_channel(self.channel)
                .with_source(e)),
        })
    }
}
