use serde::{Deserialize, Serialize};

/// A player's fixed seat in a game. Serialized as a bare `1` or `2` on the
/// wire, matching the `turn` / `youAre` / `winner` fields clients consume.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PlayerSlot {
    One = 1,
    Two = 2,
}

impl PlayerSlot {
    /// The opposing seat. Turn passing is always `slot.other()`.
    pub fn other(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Both seats, in slot order.
    pub fn both() -> [Self; 2] {
        [Self::One, Self::Two]
    }
}

impl From<PlayerSlot> for u8 {
    fn from(slot: PlayerSlot) -> Self {
        slot as u8
    }
}

impl TryFrom<u8> for PlayerSlot {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("invalid player slot: {other}")),
        }
    }
}

impl std::fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}
