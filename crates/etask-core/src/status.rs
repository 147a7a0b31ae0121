//! Well-known task status codes carried in the packet's status byte.

use std::fmt;

/// Classification of the raw status byte. The wire value stays a plain `u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Success. Also reported when a task finishes.
    Ok,
    TaskAborted,
    TaskNotExisting,
    TaskNotRegistered,
    TaskAlreadyRunning,
    TaskAlreadyPaused,
    TaskAlreadyResumed,
    /// 7..=54, not assigned.
    Reserved(u8),
    /// Application-defined, starting at [`StatusCode::CUSTOM_START`].
    Custom(u8),
}

impl StatusCode {
    pub const TASK_FINISHED: StatusCode = StatusCode::Ok;
    pub const CUSTOM_START: u8 = 55;

    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::TaskAborted,
            2 => Self::TaskNotExisting,
            3 => Self::TaskNotRegistered,
            4 => Self::TaskAlreadyRunning,
            5 => Self::TaskAlreadyPaused,
            6 => Self::TaskAlreadyResumed,
            c if c >= Self::CUSTOM_START => Self::Custom(c),
            c => Self::Reserved(c),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::TaskAborted => 1,
            Self::TaskNotExisting => 2,
            Self::TaskNotRegistered => 3,
            Self::TaskAlreadyRunning => 4,
            Self::TaskAlreadyPaused => 5,
            Self::TaskAlreadyResumed => 6,
            Self::Reserved(c) | Self::Custom(c) => *c,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<u8> for StatusCode {
    fn from(code: u8) -> Self {
        Self::from_u8(code)
    }
}

impl From<StatusCode> for u8 {
    fn from(code: StatusCode) -> u8 {
        code.as_u8()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::TaskAborted => f.write_str("task aborted"),
            Self::TaskNotExisting => f.write_str("task not existing"),
            Self::TaskNotRegistered => f.write_str("task not registered"),
            Self::TaskAlreadyRunning => f.write_str("task already running"),
            Self::TaskAlreadyPaused => f.write_str("task already paused"),
            Self::TaskAlreadyResumed => f.write_str("task already resumed"),
            Self::Reserved(c) => write!(f, "reserved ({c})"),
            Self::Custom(c) => write!(f, "custom ({c})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_byte_round_trips() {
        for code in 0..=u8::MAX {
            assert_eq!(StatusCode::from_u8(code).as_u8(), code);
        }
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(StatusCode::TASK_FINISHED.as_u8(), 0);
        assert_eq!(StatusCode::from_u8(6), StatusCode::TaskAlreadyResumed);
        assert_eq!(StatusCode::from_u8(54), StatusCode::Reserved(54));
        assert_eq!(StatusCode::from_u8(55), StatusCode::Custom(55));
        assert!(StatusCode::from_u8(0).is_ok());
    }
}
