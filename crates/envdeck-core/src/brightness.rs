//! Ambient-light brightness regulation.
//!
//! A TSL2561 light sensor on I2C is sampled once per tick. The illuminance
//! is smoothed with an exponential moving average and mapped onto a
//! backlight value on a log scale:
//!
//! ```text
//! lux        = (1 - w) * lux + w * sample
//! brightness = clamp(round(300 * log10(lux + 1.5)), min, max)
//! ```
//!
//! The backlight is only written when the value changes.

use embedded_hal::i2c::I2c;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::BrightnessConfig;
use crate::error::SensorError;
use crate::state::{BrightnessState, StateHandle};

/// Default I2C address of the TSL2561 (ADDR pin floating).
pub const TSL2561_ADDRESS: u8 = 0x39;

const CMD_CONTROL: u8 = 0x80;
const POWER_ON: u8 = 0x03;
const CMD_DATA0_LOW: u8 = 0x8C;
const CMD_DATA0_HIGH: u8 = 0x8D;
const CMD_DATA1_LOW: u8 = 0x8E;
const CMD_DATA1_HIGH: u8 = 0x8F;

/// Source of raw (ambient, infrared) channel counts.
pub trait LightSensor {
    fn read_channels(&mut self) -> Result<(u16, u16), SensorError>;
}

/// Destination of the computed backlight value.
pub trait BrightnessSink {
    fn write(&mut self, brightness: u16) -> Result<(), SensorError>;
}

/// TSL2561 luminosity sensor on any `embedded-hal` I2C bus.
pub struct Tsl2561<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Tsl2561<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_register(&mut self, command: u8) -> Result<u8, SensorError> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[command], &mut buf)
            .map_err(bus_error)?;
        Ok(buf[0])
    }

    fn read_word(&mut self, low: u8, high: u8) -> Result<u16, SensorError> {
        let lo = self.read_register(low)?;
        let hi = self.read_register(high)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }
}

impl<I2C: I2c> LightSensor for Tsl2561<I2C> {
    fn read_channels(&mut self) -> Result<(u16, u16), SensorError> {
        self.i2c
            .write(self.address, &[CMD_CONTROL, POWER_ON])
            .map_err(bus_error)?;
        let ambient = self.read_word(CMD_DATA0_LOW, CMD_DATA0_HIGH)?;
        let infrared = self.read_word(CMD_DATA1_LOW, CMD_DATA1_HIGH)?;
        Ok((ambient, infrared))
    }
}

fn bus_error<E: embedded_hal::i2c::Error>(e: E) -> SensorError {
    SensorError::Bus(format!("{:?}: {e:?}", e.kind()))
}

/// Backlight driven through a sysfs brightness file.
#[derive(Debug, Clone)]
pub struct SysfsBacklight {
    path: PathBuf,
}

impl SysfsBacklight {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BrightnessSink for SysfsBacklight {
    fn write(&mut self, brightness: u16) -> Result<(), SensorError> {
        std::fs::write(&self.path, brightness.to_string()).map_err(|source| SensorError::Sink {
            path: self.path.clone(),
            source,
        })
    }
}

/// Illuminance from the two channel counts (TSL2561 datasheet, T package).
///
/// `None` when the ambient channel is zero and the ratio is undefined.
pub fn lux_from_channels(ambient: u16, infrared: u16) -> Option<f64> {
    if ambient == 0 {
        return None;
    }
    let ch0 = f64::from(ambient);
    let ch1 = f64::from(infrared);
    let ratio = ch1 / ch0;

    let lux = if ratio > 0.0 && ratio <= 0.50 {
        0.0304 * ch0 - 0.062 * ch0 * ratio.powf(1.4)
    } else if ratio > 0.50 && ratio <= 0.61 {
        0.0224 * ch0 - 0.031 * ch1
    } else if ratio > 0.61 && ratio <= 0.80 {
        0.0128 * ch0 - 0.0153 * ch1
    } else if ratio > 0.80 && ratio <= 1.3 {
        0.00146 * ch0 - 0.00112 * ch1
    } else {
        0.0
    };
    Some(lux)
}

/// Exponential moving average; `weight` is the share of the new sample.
pub fn smooth(previous: f64, sample: f64, weight: f64) -> f64 {
    (1.0 - weight) * previous + weight * sample
}

/// Backlight value for a smoothed illuminance, clamped to `[min, max]`.
pub fn brightness_for_lux(lux: f64, min: u16, max: u16) -> u16 {
    let raw = (300.0 * (lux + 1.5).log10()).round();
    if !raw.is_finite() {
        return min;
    }
    raw.min(f64::from(max)).max(f64::from(min)) as u16
}

/// The feedback loop: sensor in, smoothed lux, backlight out.
pub struct BrightnessController {
    sensor: Box<dyn LightSensor + Send>,
    sink: Box<dyn BrightnessSink + Send>,
    state: StateHandle,
    lux: f64,
    /// Last value successfully written to the sink.
    brightness: u16,
    min_brightness: u16,
    max_brightness: u16,
    weight: f64,
}

impl BrightnessController {
    pub fn new(
        sensor: Box<dyn LightSensor + Send>,
        sink: Box<dyn BrightnessSink + Send>,
        state: StateHandle,
        config: &BrightnessConfig,
    ) -> Self {
        Self {
            sensor,
            sink,
            state,
            lux: config.initial_lux,
            brightness: config.initial_brightness,
            min_brightness: config.min_brightness,
            max_brightness: config.max_brightness,
            weight: config.weight,
        }
    }

    pub fn lux(&self) -> f64 {
        self.lux
    }

    pub fn brightness(&self) -> u16 {
        self.brightness
    }

    /// Scheduled entry point. Sensor and sink errors are logged.
    pub fn refresh(&mut self) {
        if let Err(e) = self.update() {
            warn!(error = %e, "brightness update failed");
        }
    }

    /// One sample. Returns the value written, if any.
    pub fn update(&mut self) -> Result<Option<u16>, SensorError> {
        let (ambient, infrared) = self.sensor.read_channels()?;

        let Some(sample) = lux_from_channels(ambient, infrared) else {
            debug!(ambient, infrared, "no ambient light, skipping sample");
            return Ok(None);
        };

        self.lux = smooth(self.lux, sample, self.weight);
        let target = brightness_for_lux(self.lux, self.min_brightness, self.max_brightness);

        let written = if target != self.brightness {
            debug!(
                brightness = target,
                lux = format_args!("{:.2}", self.lux),
                sample = format_args!("{:.2}", sample),
                "setting backlight"
            );
            match self.sink.write(target) {
                Ok(()) => {
                    self.brightness = target;
                    Some(target)
                }
                Err(e) => {
                    self.publish(ambient, infrared);
                    return Err(e);
                }
            }
        } else {
            None
        };

        self.publish(ambient, infrared);
        Ok(written)
    }

    fn publish(&self, ambient: u16, infrared: u16) {
        self.state.publish_brightness(BrightnessState {
            ambient,
            infrared,
            lux: self.lux,
            brightness: self.brightness,
            min_brightness: self.min_brightness,
            max_brightness: self.max_brightness,
            weight: self.weight,
        });
    }
}

#[cfg(target_os = "linux")]
pub use linux::{open_tsl2561, LinuxI2c, LinuxI2cError};

#[cfg(target_os = "linux")]
mod linux {
    use embedded_hal::i2c::{
        ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation, SevenBitAddress,
    };
    use std::fs::{File, OpenOptions};
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;

    use super::Tsl2561;
    use crate::error::SensorError;

    /// `ioctl` request selecting the target address on an i2c-dev handle.
    const I2C_SLAVE: libc::c_ulong = 0x0703;

    #[derive(Debug, thiserror::Error)]
    #[error("i2c-dev: {0}")]
    pub struct LinuxI2cError(#[from] std::io::Error);

    impl embedded_hal::i2c::Error for LinuxI2cError {
        fn kind(&self) -> ErrorKind {
            match self.0.raw_os_error() {
                Some(libc::ENXIO | libc::EREMOTEIO) => {
                    ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
                }
                _ => ErrorKind::Other,
            }
        }
    }

    /// `/dev/i2c-N` character device.
    pub struct LinuxI2c {
        file: File,
        address: Option<u8>,
    }

    impl LinuxI2c {
        pub fn open(bus: u8) -> std::io::Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(format!("/dev/i2c-{bus}"))?;
            Ok(Self {
                file,
                address: None,
            })
        }

        fn select(&mut self, address: u8) -> std::io::Result<()> {
            if self.address == Some(address) {
                return Ok(());
            }
            // SAFETY: the descriptor is owned by `self.file` and I2C_SLAVE
            // takes the address by value.
            let rc = unsafe {
                libc::ioctl(
                    self.file.as_raw_fd(),
                    I2C_SLAVE as _,
                    libc::c_ulong::from(address),
                )
            };
            if rc < 0 {
                return Err(std::io::Error::last_os_error());
            }
            self.address = Some(address);
            Ok(())
        }
    }

    impl ErrorType for LinuxI2c {
        type Error = LinuxI2cError;
    }

    impl I2c<SevenBitAddress> for LinuxI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            self.select(address).map_err(LinuxI2cError)?;
            for op in operations {
                let result = match op {
                    Operation::Write(bytes) => self.file.write_all(bytes),
                    Operation::Read(buf) => self.file.read_exact(buf),
                };
                result.map_err(LinuxI2cError)?;
            }
            Ok(())
        }
    }

    /// Open the sensor on `/dev/i2c-<bus>`.
    pub fn open_tsl2561(bus: u8, address: u8) -> Result<Tsl2561<LinuxI2c>, SensorError> {
        let i2c = LinuxI2c::open(bus)
            .map_err(|e| SensorError::Bus(format!("/dev/i2c-{bus}: {e}")))?;
        Ok(Tsl2561::new(i2c, address))
    }
}
