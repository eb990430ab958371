use crate::error::{FrameError, KefError, Result};
use crate::types::Source;

/// First byte of every frame the speaker sends
pub const RESPONSE_HEADER: u8 = 0x52;

const TYPE_ACK: u8 = 0x11;
const TYPE_VOLUME: u8 = 0x25;
const TYPE_SOURCE: u8 = 0x30;

/// Offset of the payload byte in volume and source responses
const PAYLOAD_OFFSET: usize = 3;

/// Length of a volume or source response
pub const FRAME_LEN: usize = 5;

/// Raw payload values at or above this mark mean "muted"
pub const MUTE_FLAG: u8 = 128;

const WIFI: [u8; 5] = [0x53, 0x30, 0x81, 0x12, 0x82];
const BT: [u8; 5] = [0x53, 0x30, 0x81, 0x19, 0xAD];
const AUX: [u8; 5] = [0x53, 0x30, 0x81, 0x1A, 0x9B];
const OPT: [u8; 5] = [0x53, 0x30, 0x81, 0x1B, 0x00];
const USB: [u8; 5] = [0x53, 0x30, 0x81, 0x1C, 0xF7];
const VOL_GET: [u8; 4] = [0x47, 0x25, 0x80, 0x6C];
const SRC_GET: [u8; 4] = [0x47, 0x30, 0x80, 0xD9];
const OFF: [u8; 5] = [0x53, 0x30, 0x81, 0x9B, 0x0B];

/// Command frame sent to the speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Power on (if off) and switch to an input
    Select(Source),
    Off,
    GetVolume,
    GetSource,
    /// Pre-validated volume payload, see [`set_volume`]
    SetVolume(u8),
}

impl Command {
    /// Wire bytes of the command
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Select(source) => match source {
                Source::Wifi => WIFI.to_vec(),
                Source::Bluetooth => BT.to_vec(),
                Source::Aux => AUX.to_vec(),
                Source::Optical => OPT.to_vec(),
                Source::Usb => USB.to_vec(),
            },
            Command::Off => OFF.to_vec(),
            Command::GetVolume => VOL_GET.to_vec(),
            Command::GetSource => SRC_GET.to_vec(),
            Command::SetVolume(payload) => vec![0x53, 0x25, 0x81, *payload, 0x1A],
        }
    }
}

/// Build a volume-set command
///
/// `value` in `0..=max_volume` sets an unmuted level; `value >= 128` sets
/// "muted at `value - 128`", capped at `128 + max_volume`. Anything else is
/// rejected rather than clamped into the muted range.
pub fn set_volume(value: i32, max_volume: u8) -> Result<Command> {
    let max = i32::from(max_volume);
    let muted_ceiling = i32::from(MUTE_FLAG) + max;
    if value < 0 || (value < i32::from(MUTE_FLAG) && value > max) {
        return Err(KefError::VolumeOutOfRange { value, max_volume });
    }
    let payload = value.min(muted_ceiling) as u8;
    Ok(Command::SetVolume(payload))
}

/// Decoded volume payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeReport {
    pub volume: u8,
    pub muted: bool,
}

impl VolumeReport {
    /// Split a raw payload byte into level and mute flag
    pub fn from_payload(payload: u8) -> Self {
        if payload >= MUTE_FLAG {
            Self {
                volume: payload - MUTE_FLAG,
                muted: true,
            }
        } else {
            Self {
                volume: payload,
                muted: false,
            }
        }
    }
}

/// Decoded source/power payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceReport {
    /// Speaker is on and playing from `Source`
    On(Source),
    /// Speaker is in standby; `last_input` names the input it was switched off on
    Off { last_input: Source },
    /// Speaker is powering on and has not settled on an input yet
    Transitioning,
}

impl SourceReport {
    /// Look a payload byte up in the on, off and transition tables
    pub fn from_payload(payload: u8) -> std::result::Result<Self, FrameError> {
        let report = match payload {
            0x12 => SourceReport::On(Source::Wifi),
            0x1A => SourceReport::On(Source::Aux),
            0x1F => SourceReport::On(Source::Bluetooth),
            0x1C => SourceReport::On(Source::Usb),
            0x1B => SourceReport::On(Source::Optical),
            0x92 => SourceReport::Off { last_input: Source::Wifi },
            0x9A => SourceReport::Off { last_input: Source::Aux },
            0x9F => SourceReport::Off { last_input: Source::Bluetooth },
            0x9C => SourceReport::Off { last_input: Source::Usb },
            0x9B => SourceReport::Off { last_input: Source::Optical },
            0x90 => SourceReport::Transitioning,
            other => return Err(FrameError::UnknownSource(other)),
        };
        Ok(report)
    }
}

/// Frame received from the speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundFrame {
    /// The speaker received a command; state should be re-read
    Ack,
    Volume(VolumeReport),
    Source(SourceReport),
}

/// Decode one received buffer
pub fn decode(data: &[u8]) -> std::result::Result<InboundFrame, FrameError> {
    let (&header, rest) = data.split_first().ok_or(FrameError::Truncated(0))?;
    if header != RESPONSE_HEADER {
        return Err(FrameError::NotAResponse(header));
    }
    let &frame_type = rest.first().ok_or(FrameError::Truncated(data.len()))?;

    match frame_type {
        TYPE_ACK => Ok(InboundFrame::Ack),
        TYPE_VOLUME => {
            let payload = payload(data)?;
            Ok(InboundFrame::Volume(VolumeReport::from_payload(payload)))
        }
        TYPE_SOURCE => {
            let payload = payload(data)?;
            Ok(InboundFrame::Source(SourceReport::from_payload(payload)?))
        }
        other => Err(FrameError::UnknownType(other)),
    }
}

/// Split a received buffer into the frames it carries
///
/// A buffer made up of whole responses, each starting with the header byte,
/// is several frames that arrived together. Anything else is handed back
/// whole and decoded as one frame.
pub fn split_frames(data: &[u8]) -> Vec<&[u8]> {
    let coalesced = data.len() > FRAME_LEN
        && data.len() % FRAME_LEN == 0
        && data
            .chunks(FRAME_LEN)
            .all(|chunk| chunk[0] == RESPONSE_HEADER);

    if coalesced {
        data.chunks(FRAME_LEN).collect()
    } else {
        vec![data]
    }
}

fn payload(data: &[u8]) -> std::result::Result<u8, FrameError> {
    data.get(PAYLOAD_OFFSET)
        .copied()
        .ok_or(FrameError::Truncated(data.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_commands_match_wire_table() {
        assert_eq!(Command::Select(Source::Wifi).encode(), [0x53, 0x30, 0x81, 0x12, 0x82]);
        assert_eq!(Command::Select(Source::Bluetooth).encode(), [0x53, 0x30, 0x81, 0x19, 0xAD]);
        assert_eq!(Command::Select(Source::Aux).encode(), [0x53, 0x30, 0x81, 0x1A, 0x9B]);
        assert_eq!(Command::Select(Source::Optical).encode(), [0x53, 0x30, 0x81, 0x1B, 0x00]);
        assert_eq!(Command::Select(Source::Usb).encode(), [0x53, 0x30, 0x81, 0x1C, 0xF7]);
        assert_eq!(Command::GetVolume.encode(), [0x47, 0x25, 0x80, 0x6C]);
        assert_eq!(Command::GetSource.encode(), [0x47, 0x30, 0x80, 0xD9]);
        assert_eq!(Command::Off.encode(), [0x53, 0x30, 0x81, 0x9B, 0x0B]);
    }

    #[test]
    fn set_volume_frame_layout() {
        let command = set_volume(30, 50).unwrap();
        assert_eq!(command.encode(), [0x53, 0x25, 0x81, 30, 0x1A]);
    }

    #[test]
    fn unmuted_levels_decode_back_to_themselves() {
        for value in 0..=100u8 {
            let Command::SetVolume(payload) = set_volume(i32::from(value), 100).unwrap() else {
                panic!("expected volume command");
            };
            let report = VolumeReport::from_payload(payload);
            assert_eq!(report, VolumeReport { volume: value, muted: false });
        }
    }

    #[test]
    fn muted_levels_decode_back_to_themselves() {
        for value in 0..=100u8 {
            let Command::SetVolume(payload) = set_volume(i32::from(value) + 128, 100).unwrap() else {
                panic!("expected volume command");
            };
            let report = VolumeReport::from_payload(payload);
            assert_eq!(report, VolumeReport { volume: value, muted: true });
        }
    }

    #[test]
    fn muted_values_are_capped_at_max_volume() {
        assert_eq!(set_volume(250, 50).unwrap(), Command::SetVolume(178));
        assert_eq!(set_volume(128 + 50, 50).unwrap(), Command::SetVolume(178));
    }

    #[test]
    fn values_above_max_volume_are_rejected_not_clamped() {
        for value in [51, 100, 127] {
            let err = set_volume(value, 50).unwrap_err();
            assert!(matches!(
                err,
                KefError::VolumeOutOfRange { value: v, max_volume: 50 } if v == value
            ));
        }
        assert!(set_volume(-1, 50).is_err());
        assert!(set_volume(50, 50).is_ok());
    }

    #[test]
    fn decode_ack() {
        assert_eq!(decode(&[0x52, 0x11, 0xFF]).unwrap(), InboundFrame::Ack);
        assert_eq!(decode(&[0x52, 0x11]).unwrap(), InboundFrame::Ack);
    }

    #[test]
    fn decode_volume() {
        assert_eq!(
            decode(&[0x52, 0x25, 0x81, 0x1E, 0x00]).unwrap(),
            InboundFrame::Volume(VolumeReport { volume: 30, muted: false })
        );
        assert_eq!(
            decode(&[0x52, 0x25, 0x81, 0x9E, 0x00]).unwrap(),
            InboundFrame::Volume(VolumeReport { volume: 30, muted: true })
        );
    }

    #[test]
    fn decode_source_tables() {
        assert_eq!(
            decode(&[0x52, 0x30, 0x81, 0x1A, 0x00]).unwrap(),
            InboundFrame::Source(SourceReport::On(Source::Aux))
        );
        assert_eq!(
            decode(&[0x52, 0x30, 0x81, 0x9A, 0x00]).unwrap(),
            InboundFrame::Source(SourceReport::Off { last_input: Source::Aux })
        );
        assert_eq!(
            decode(&[0x52, 0x30, 0x81, 0x90, 0x00]).unwrap(),
            InboundFrame::Source(SourceReport::Transitioning)
        );
    }

    #[test]
    fn on_and_off_tables_are_disjoint() {
        let on = [0x12, 0x1A, 0x1F, 0x1C, 0x1B];
        for byte in on {
            assert!(matches!(SourceReport::from_payload(byte), Ok(SourceReport::On(_))));
            assert!(matches!(
                SourceReport::from_payload(byte | 0x80),
                Ok(SourceReport::Off { .. })
            ));
        }
    }

    #[test]
    fn decode_rejects_anomalies() {
        assert_eq!(decode(&[]), Err(FrameError::Truncated(0)));
        assert_eq!(decode(&[0x53, 0x25, 0x81, 0x10]), Err(FrameError::NotAResponse(0x53)));
        assert_eq!(decode(&[0x52]), Err(FrameError::Truncated(1)));
        assert_eq!(decode(&[0x52, 0x25, 0x81]), Err(FrameError::Truncated(3)));
        assert_eq!(decode(&[0x52, 0x40, 0x81, 0x00]), Err(FrameError::UnknownType(0x40)));
        assert_eq!(
            decode(&[0x52, 0x30, 0x81, 0x55, 0x00]),
            Err(FrameError::UnknownSource(0x55))
        );
    }

    #[test]
    fn split_frames_separates_coalesced_responses() {
        let both = [0x52, 0x25, 0x81, 30, 0x00, 0x52, 0x30, 0x81, 0x1A, 0x00];
        let frames = split_frames(&both);
        assert_eq!(frames, vec![&both[..5], &both[5..]]);
        assert_eq!(
            decode(frames[1]),
            Ok(InboundFrame::Source(SourceReport::On(Source::Aux)))
        );

        // single frames and odd-sized buffers stay whole
        assert_eq!(split_frames(&both[..5]), vec![&both[..5]]);
        assert_eq!(split_frames(&[0x52, 0x11]), vec![&[0x52, 0x11][..]]);
        let ragged = [0x52, 0x25, 0x81, 30, 0x00, 0x10, 0x20, 0x30, 0x40, 0x50];
        assert_eq!(split_frames(&ragged), vec![&ragged[..]]);
    }
}
