//! i1d3 command definitions

use std::fmt;

use crate::error::{Error, Result};

/// Protocol command codes
///
/// A code is `major << 8 | minor`. Only the multi-function major command
/// `0x00` uses the minor byte; every other command has a minor of zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    // Multi-function queries (major 0x00)
    GetInfo = 0x0000,
    GetStatus = 0x0001,
    GetProductName = 0x0010,
    GetProductType = 0x0011,
    GetFirmwareVersion = 0x0012,
    GetFirmwareDate = 0x0013,
    GetLocked = 0x0020,
    
    // Measurement
    MeasureFrequency = 0x0100,
    MeasurePeriod = 0x0200,
    
    // Memory
    ReadInternalEeprom = 0x0800,
    ReadExternalEeprom = 0x1200,
    
    // Indicator
    SetLed = 0x2100,
    
    // Unlock handshake
    LockChallenge = 0x9900,
    LockResponse = 0x9a00,
}

impl Command {
    /// Major command byte sent at request offset 0
    pub fn major(self) -> u8 {
        ((self as u16) >> 8) as u8
    }
    
    /// Minor command byte, meaningful only for the multi-function major
    pub fn minor(self) -> u8 {
        (self as u16 & 0xFF) as u8
    }
    
    /// Check if this command is dispatched through the multi-function major
    pub fn is_multi_function(self) -> bool {
        self.major() == 0x00
    }
    
    /// Offset of the first payload byte in the request frame
    pub fn payload_offset(self) -> usize {
        if self.is_multi_function() { 2 } else { 1 }
    }
    
    /// Byte 1 the response must carry
    ///
    /// The device echoes the major command, except in the unlock response
    /// where it always answers zero padding.
    pub fn expected_echo(self) -> u8 {
        match self {
            Self::LockResponse => 0x00,
            _ => self.major(),
        }
    }
    
    /// Check if this command needs the instrument unlocked first
    pub fn is_restricted(self) -> bool {
        matches!(
            self,
            Self::MeasureFrequency
                | Self::MeasurePeriod
                | Self::ReadExternalEeprom
                | Self::SetLed
        )
    }
    
    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::GetInfo => "GET_INFO",
            Self::GetStatus => "GET_STATUS",
            Self::GetProductName => "GET_PRODNAME",
            Self::GetProductType => "GET_PRODTYPE",
            Self::GetFirmwareVersion => "GET_FIRMVER",
            Self::GetFirmwareDate => "GET_FIRMDATE",
            Self::GetLocked => "GET_LOCKED",
            Self::MeasureFrequency => "MEASURE_FREQ",
            Self::MeasurePeriod => "MEASURE_PERIOD",
            Self::ReadInternalEeprom => "READ_INT_EE",
            Self::ReadExternalEeprom => "READ_EXT_EE",
            Self::SetLed => "SET_LED",
            Self::LockChallenge => "LOCK_CHALLENGE",
            Self::LockResponse => "LOCK_RESPONSE",
        }
    }
}

impl From<Command> for u16 {
    fn from(cmd: Command) -> u16 {
        cmd as u16
    }
}

impl TryFrom<u16> for Command {
    type Error = Error;
    
    fn try_from(value: u16) -> Result<Self> {
        match value {
            0x0000 => Ok(Self::GetInfo),
            0x0001 => Ok(Self::GetStatus),
            0x0010 => Ok(Self::GetProductName),
            0x0011 => Ok(Self::GetProductType),
            0x0012 => Ok(Self::GetFirmwareVersion),
            0x0013 => Ok(Self::GetFirmwareDate),
            0x0020 => Ok(Self::GetLocked),
            0x0100 => Ok(Self::MeasureFrequency),
            0x0200 => Ok(Self::MeasurePeriod),
            0x0800 => Ok(Self::ReadInternalEeprom),
            0x1200 => Ok(Self::ReadExternalEeprom),
            0x2100 => Ok(Self::SetLed),
            0x9900 => Ok(Self::LockChallenge),
            0x9a00 => Ok(Self::LockResponse),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:04X})", self.name(), *self as u16)
    }
}
