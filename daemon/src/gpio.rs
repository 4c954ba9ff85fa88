//! GPIO pin access through the Linux sysfs interface.
//!
//! The rest of the daemon only ever sees the [`OutputPin`] and [`InputPin`]
//! traits; the sysfs types below are the hardware-facing implementation and
//! tests substitute their own fakes. Pin setup failures are fatal at
//! startup, so the constructors return `Result` while the write path on an
//! already-open output pin is left to the caller to log.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Logic level of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

pub trait OutputPin: Send {
    fn set_high(&mut self) -> Result<()>;
    fn set_low(&mut self) -> Result<()>;
}

pub trait InputPin: Send {
    fn read(&mut self) -> Result<Level>;
}

/// An exported sysfs pin configured as an output.
pub struct SysfsOutputPin {
    value_path: PathBuf,
}

impl SysfsOutputPin {
    pub fn open(pin: u8) -> Result<Self> {
        Self::open_at(Path::new(SYSFS_GPIO_ROOT), pin)
    }

    fn open_at(root: &Path, pin: u8) -> Result<Self> {
        let pin_dir = export(root, pin)?;
        std::fs::write(pin_dir.join("direction"), "out")
            .with_context(|| format!("failed to set gpio{pin} as output"))?;
        Ok(Self {
            value_path: pin_dir.join("value"),
        })
    }
}

impl OutputPin for SysfsOutputPin {
    fn set_high(&mut self) -> Result<()> {
        std::fs::write(&self.value_path, "1")
            .with_context(|| format!("failed to write {}", self.value_path.display()))
    }

    fn set_low(&mut self) -> Result<()> {
        std::fs::write(&self.value_path, "0")
            .with_context(|| format!("failed to write {}", self.value_path.display()))
    }
}

/// An exported sysfs pin configured as an input.
pub struct SysfsInputPin {
    value_path: PathBuf,
}

impl SysfsInputPin {
    pub fn open(pin: u8) -> Result<Self> {
        Self::open_at(Path::new(SYSFS_GPIO_ROOT), pin)
    }

    fn open_at(root: &Path, pin: u8) -> Result<Self> {
        let pin_dir = export(root, pin)?;
        std::fs::write(pin_dir.join("direction"), "in")
            .with_context(|| format!("failed to set gpio{pin} as input"))?;
        Ok(Self {
            value_path: pin_dir.join("value"),
        })
    }
}

impl InputPin for SysfsInputPin {
    fn read(&mut self) -> Result<Level> {
        let raw = std::fs::read_to_string(&self.value_path)
            .with_context(|| format!("failed to read {}", self.value_path.display()))?;
        match raw.trim() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => bail!("unexpected pin value {other:?}"),
        }
    }
}

/// Exports `pin` if the kernel has not already materialised its directory.
fn export(root: &Path, pin: u8) -> Result<PathBuf> {
    let pin_dir = root.join(format!("gpio{pin}"));
    if !pin_dir.exists() {
        std::fs::write(root.join("export"), pin.to_string())
            .with_context(|| format!("failed to export gpio{pin}"))?;
    }
    Ok(pin_dir)
}
