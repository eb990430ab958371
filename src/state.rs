use crate::protocol::{InboundFrame, SourceReport, VolumeReport};
use crate::types::{ConnectionState, DeviceSnapshot, Power, Source};

/// Outcome of applying one decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Applied {
    /// A `state` event should be emitted
    pub dirty: bool,
    /// The speaker is powering on; state must be re-read once it settles
    pub needs_settle_recheck: bool,
}

/// Last known speaker state
///
/// Fields stay `None` until the matching query has been answered on the
/// current connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DeviceState {
    volume: Option<u8>,
    muted: Option<bool>,
    source: Option<Source>,
    power: Option<Power>,
    emit_unchanged: bool,
}

impl DeviceState {
    pub fn new(emit_unchanged: bool) -> Self {
        Self {
            emit_unchanged,
            ..Self::default()
        }
    }

    pub fn volume(&self) -> Option<u8> {
        self.volume
    }

    pub fn muted(&self) -> Option<bool> {
        self.muted
    }

    /// Forget everything learned on a previous connection
    pub fn reset(&mut self) {
        self.volume = None;
        self.muted = None;
        self.source = None;
        self.power = None;
    }

    /// Apply a decoded frame. Acks carry no state and are never dirty.
    pub fn apply(&mut self, frame: &InboundFrame) -> Applied {
        match frame {
            InboundFrame::Ack => Applied::default(),
            InboundFrame::Volume(report) => self.apply_volume(*report),
            InboundFrame::Source(report) => self.apply_source(*report),
        }
    }

    fn apply_volume(&mut self, report: VolumeReport) -> Applied {
        let previous = (self.volume, self.muted);
        self.volume = Some(report.volume);
        self.muted = Some(report.muted);
        Applied {
            dirty: self.emit_unchanged || previous != (self.volume, self.muted),
            needs_settle_recheck: false,
        }
    }

    fn apply_source(&mut self, report: SourceReport) -> Applied {
        let previous = (self.source, self.power);
        let mut needs_settle_recheck = false;
        match report {
            // last_input names the standby input, not an active one
            SourceReport::Off { .. } => {
                self.power = Some(Power::Off);
                self.source = None;
            }
            SourceReport::Transitioning => {
                self.power = Some(Power::On);
                self.source = None;
                needs_settle_recheck = true;
            }
            SourceReport::On(source) => {
                self.power = Some(Power::On);
                self.source = Some(source);
            }
        }
        Applied {
            dirty: self.emit_unchanged || previous != (self.source, self.power),
            needs_settle_recheck,
        }
    }

    pub fn snapshot(&self, connection_state: ConnectionState) -> DeviceSnapshot {
        DeviceSnapshot {
            volume: self.volume,
            muted: self.muted,
            source: self.source,
            connection_state,
            power: self.power,
        }
    }
}
