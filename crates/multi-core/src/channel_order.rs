//! Stick channel order table.
//!
//! The v2 firmware signature stores the channel order as a 5-bit index into
//! a fixed table of the 24 permutations of the four stick channels.

use std::fmt;

/// A stick channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Aileron,
    Elevator,
    Throttle,
    Rudder,
}

impl Channel {
    pub fn letter(self) -> char {
        match self {
            Channel::Aileron => 'A',
            Channel::Elevator => 'E',
            Channel::Throttle => 'T',
            Channel::Rudder => 'R',
        }
    }
}

use Channel::{Aileron as A, Elevator as E, Rudder as R, Throttle as T};

/// Permutations in firmware index order.
const CHANNEL_ORDERS: [[Channel; 4]; 24] = [
    [A, E, T, R],
    [A, E, R, T],
    [A, R, E, T],
    [A, R, T, E],
    [A, T, R, E],
    [A, T, E, R],
    [E, A, T, R],
    [E, A, R, T],
    [E, R, A, T],
    [E, R, T, A],
    [E, T, R, A],
    [E, T, A, R],
    [T, E, A, R],
    [T, E, R, A],
    [T, R, E, A],
    [T, R, A, E],
    [T, A, R, E],
    [T, A, E, R],
    [R, E, T, A],
    [R, E, A, T],
    [R, A, E, T],
    [R, A, T, E],
    [R, T, A, E],
    [R, T, E, A],
];

/// One of the 24 channel orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelOrder {
    index: u8,
}

impl ChannelOrder {
    /// Number of defined channel orders.
    pub const COUNT: usize = CHANNEL_ORDERS.len();

    /// Look up a channel order. Indices past the table yield `None`.
    pub fn from_index(index: usize) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self { index: index as u8 })
        } else {
            None
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn channels(self) -> [Channel; 4] {
        CHANNEL_ORDERS[self.index as usize]
    }
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ch in self.channels() {
            write!(f, "{}", ch.letter())?;
        }
        Ok(())
    }
}
