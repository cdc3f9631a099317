//! # Telemetry records
//!
//! Each sensor type has a fixed-layout binary record of little-endian IEEE-754
//! f32 values, pushed over its own stream at the sensor's native cadence. The
//! battery voltage beacon is not a binary record, it is a UTF-8 decimal string
//! carried over the beacon channel.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// IMU telemetry: gyro rates (rad/s) and accelerations (m/s^2) on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuTm {
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub gyro_z: f32,
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,
}

/// External pressure/depth telemetry from the water-side sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtPressureTm {
    pub depth_m: f32,
    pub pressure_mbar: f32,
    pub pressure_psi: f32,
    pub temp_c: f32,
    pub temp_f: f32,
}

/// Internal hull health telemetry: temperature, pressure and humidity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IntHealthTm {
    pub temp_c: f32,
    pub pressure_hpa: f32,
    pub humidity_pct: f32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible decode errors for a telemetry record.
#[derive(Debug, Error)]
pub enum TmDecodeError {
    #[error("Expected a {expected} byte record, found {found} bytes")]
    WrongLength { expected: usize, found: usize },
}

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

/// Implement the fixed-layout encode/decode pair for a telemetry record made
/// of consecutive little-endian f32 fields.
macro_rules! impl_tm_record {
    ($type:ident, $($field:ident),+) => {
        impl $type {
            /// Size of the encoded record in bytes.
            pub const SIZE: usize = [$(stringify!($field)),+].len() * 4;

            /// Encode this record into its wire layout.
            pub fn encode(&self) -> Vec<u8> {
                let mut buf = vec![0u8; Self::SIZE];
                let mut i = 0;
                $(
                    LittleEndian::write_f32(&mut buf[i..i + 4], self.$field);
                    #[allow(unused_assignments)]
                    { i += 4; }
                )+
                buf
            }

            /// Decode a record from its wire layout.
            ///
            /// Records of the wrong length are rejected, the caller is
            /// expected to discard them and keep the channel open.
            pub fn decode(buf: &[u8]) -> Result<Self, TmDecodeError> {
                if buf.len() != Self::SIZE {
                    return Err(TmDecodeError::WrongLength {
                        expected: Self::SIZE,
                        found: buf.len(),
                    });
                }

                let mut i = 0;
                $(
                    let $field = LittleEndian::read_f32(&buf[i..i + 4]);
                    #[allow(unused_assignments)]
                    { i += 4; }
                )+

                Ok(Self { $($field),+ })
            }
        }
    };
}

impl_tm_record!(ImuTm, gyro_x, gyro_y, gyro_z, accel_x, accel_y, accel_z);
impl_tm_record!(ExtPressureTm, depth_m, pressure_mbar, pressure_psi, temp_c, temp_f);
impl_tm_record!(IntHealthTm, temp_c, pressure_hpa, humidity_pct);

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_sizes() {
        assert_eq!(ImuTm::SIZE, 24);
        assert_eq!(ExtPressureTm::SIZE, 20);
        assert_eq!(IntHealthTm::SIZE, 12);
    }

    #[test]
    fn test_imu_roundtrip() {
        let tm = ImuTm {
            gyro_x: -1.5,
            gyro_y: 0.25,
            gyro_z: 12.0,
            accel_x: 0.0,
            accel_y: -0.98,
            accel_z: 1.02,
        };

        let buf = tm.encode();
        assert_eq!(buf.len(), ImuTm::SIZE);
        assert_eq!(ImuTm::decode(&buf).unwrap(), tm);
    }

    #[test]
    fn test_short_record_rejected() {
        // A truncated 10 byte IMU record must be rejected, not misread
        let err = ImuTm::decode(&[0u8; 10]).unwrap_err();
        match err {
            TmDecodeError::WrongLength { expected, found } => {
                assert_eq!(expected, 24);
                assert_eq!(found, 10);
            }
        }
    }

    #[test]
    fn test_int_health_layout() {
        // Field order on the wire is temp, pressure, humidity
        let tm = IntHealthTm {
            temp_c: 21.5,
            pressure_hpa: 1012.0,
            humidity_pct: 35.0,
        };
        let buf = tm.encode();
        assert_eq!(LittleEndian::read_f32(&buf[0..4]), 21.5);
        assert_eq!(LittleEndian::read_f32(&buf[4..8]), 1012.0);
        assert_eq!(LittleEndian::read_f32(&buf[8..12]), 35.0);
    }
}
