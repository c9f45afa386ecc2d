//! Raw 40-bit frame: four data bytes followed by a checksum byte.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChecksumMismatch {
    /// Low byte of the sum of the data bytes.
    pub expected: u8,
    /// Checksum byte sent by the sensor.
    pub actual: u8,
}

/// Bytes of one transfer, most significant first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    bytes: [u8; 5],
}

impl Packet {
    pub const fn new(bytes: [u8; 5]) -> Self {
        Packet { bytes }
    }

    /// Splits the low 40 bits of a capture register into bytes.
    ///
    /// Bits above 39 hold the presence pulse edges and are discarded.
    pub const fn from_register(data: u64) -> Self {
        Packet {
            bytes: [
                (data >> 32) as u8,
                (data >> 24) as u8,
                (data >> 16) as u8,
                (data >> 8) as u8,
                data as u8,
            ],
        }
    }

    pub fn data(&self) -> [u8; 4] {
        [self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]]
    }

    pub fn checksum(&self) -> u8 {
        self.bytes[4]
    }

    pub fn computed_checksum(&self) -> u8 {
        self.bytes[..4]
            .iter()
            .fold(0u8, |sum, byte| sum.wrapping_add(*byte))
    }

    /// Returns the data bytes if the checksum matches.
    pub fn validate(&self) -> Result<[u8; 4], ChecksumMismatch> {
        let expected = self.computed_checksum();
        let actual = self.checksum();
        if expected == actual {
            Ok(self.data())
        } else {
            Err(ChecksumMismatch { expected, actual })
        }
    }
}
