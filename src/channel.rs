use core::fmt;

use serde::{Deserialize, Serialize};

pub const VOLTAGE_CHANNELS_PER_BOARD: usize = 2;
pub const CURRENT_CHANNELS_PER_BOARD: usize = 6;

/// add-on boards stack on top of the main board
pub const MAX_ADDON_BOARDS: usize = 6;
pub const MAX_BOARDS: usize = 1 + MAX_ADDON_BOARDS;

pub const MAX_VOLTAGE_CHANNELS: usize = MAX_BOARDS * VOLTAGE_CHANNELS_PER_BOARD;
pub const MAX_CURRENT_CHANNELS: usize = MAX_BOARDS * CURRENT_CHANNELS_PER_BOARD;
pub const MAX_CHANNELS: usize = MAX_VOLTAGE_CHANNELS + MAX_CURRENT_CHANNELS;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Voltage,
    Current,
}

/// A measurement channel. Ids are global across boards: voltage channel ids are
/// `board * 2 + index`, current channel ids `board * 6 + index`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Voltage(u8),
    Current(u8),
}

impl Channel {
    pub fn new(kind: ChannelKind, board: u8, index: u8) -> Option<Self> {
        let board = board as usize;
        let index = index as usize;
        if board >= MAX_BOARDS {
            return None;
        }
        match kind {
            ChannelKind::Voltage if index < VOLTAGE_CHANNELS_PER_BOARD => {
                Some(Channel::Voltage((board * VOLTAGE_CHANNELS_PER_BOARD + index) as u8))
            }
            ChannelKind::Current if index < CURRENT_CHANNELS_PER_BOARD => {
                Some(Channel::Current((board * CURRENT_CHANNELS_PER_BOARD + index) as u8))
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            Channel::Voltage(_) => ChannelKind::Voltage,
            Channel::Current(_) => ChannelKind::Current,
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Channel::Voltage(id) | Channel::Current(id) => *id,
        }
    }

    pub fn board(&self) -> u8 {
        match self {
            Channel::Voltage(id) => id / VOLTAGE_CHANNELS_PER_BOARD as u8,
            Channel::Current(id) => id / CURRENT_CHANNELS_PER_BOARD as u8,
        }
    }

    /// position on the board, 0-based (CT1 is 0)
    pub fn index(&self) -> u8 {
        match self {
            Channel::Voltage(id) => id % VOLTAGE_CHANNELS_PER_BOARD as u8,
            Channel::Current(id) => id % CURRENT_CHANNELS_PER_BOARD as u8,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Voltage(_) => write!(f, "board {} V{}", self.board(), self.index() + 1),
            Channel::Current(_) => write!(f, "board {} CT{}", self.board(), self.index() + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_ids_are_unique_per_class() {
        let a = Channel::new(ChannelKind::Current, 1, 2).unwrap();
        assert_eq!(a, Channel::Current(8));
        assert_eq!(a.board(), 1);
        assert_eq!(a.index(), 2);

        let v = Channel::new(ChannelKind::Voltage, 3, 1).unwrap();
        assert_eq!(v, Channel::Voltage(7));
        assert_eq!(v.board(), 3);
        assert_eq!(v.index(), 1);
    }

    #[test]
    fn out_of_range_channels_are_rejected() {
        assert_eq!(Channel::new(ChannelKind::Voltage, 0, 2), None);
        assert_eq!(Channel::new(ChannelKind::Current, 0, 6), None);
        assert_eq!(Channel::new(ChannelKind::Current, MAX_BOARDS as u8, 0), None);
    }
}
