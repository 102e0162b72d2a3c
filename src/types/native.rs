//! Wire-format temporal struct used by the binary protocol.

/// Which fields of a [`NativeTime`] are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeKind {
    #[default]
    None,
    Date,
    DateTime,
    Time,
}

/// Broken-down temporal value as exchanged with the server.
///
/// `second_part` is in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u32,
    pub minute: u8,
    pub second: u8,
    pub second_part: u32,
    pub neg: bool,
    pub kind: TimeKind,
}

impl NativeTime {
    pub fn millisecond(&self) -> u32 {
        self.second_part / 1000
    }

    /// All fields zero, as sent for `0000-00-00` or `00:00:00`.
    pub fn is_zero(&self) -> bool {
        self.year == 0
            && self.month == 0
            && self.day == 0
            && self.hour == 0
            && self.minute == 0
            && self.second == 0
            && self.second_part == 0
    }
}
