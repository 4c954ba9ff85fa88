use tracing::{error, info};

use crate::gpio::OutputPin;

/// The recording LED.
///
/// A stateless pass-through to the underlying pin: calling either method
/// twice in a row leaves the signal where a single call would have. Write
/// failures on an already-open pin are logged rather than propagated — a
/// flaky LED must never take the recorder down with it.
pub struct Indicator {
    pin: Box<dyn OutputPin>,
}

impl Indicator {
    pub fn new(pin: Box<dyn OutputPin>) -> Self {
        Self { pin }
    }

    pub fn illuminate(&mut self) {
        info!("indicator illuminating");
        if let Err(e) = self.pin.set_high() {
            error!(error = %e, "failed to illuminate indicator");
        }
    }

    pub fn extinguish(&mut self) {
        info!("indicator extinguishing");
        if let Err(e) = self.pin.set_low() {
            error!(error = %e, "failed to extinguish indicator");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakePin {
        levels: Arc<Mutex<Vec<bool>>>,
    }

    impl OutputPin for FakePin {
        fn set_high(&mut self) -> Result<()> {
            self.levels.lock().unwrap().push(true);
            Ok(())
        }

        fn set_low(&mut self) -> Result<()> {
            self.levels.lock().unwrap().push(false);
            Ok(())
        }
    }

    #[test]
    fn illuminate_drives_pin_high() {
        let pin = FakePin::default();
        let mut indicator = Indicator::new(Box::new(pin.clone()));
        indicator.illuminate();
        assert_eq!(*pin.levels.lock().unwrap(), vec![true]);
    }

    #[test]
    fn extinguish_drives_pin_low() {
        let pin = FakePin::default();
        let mut indicator = Indicator::new(Box::new(pin.clone()));
        indicator.extinguish();
        assert_eq!(*pin.levels.lock().unwrap(), vec![false]);
    }

    #[test]
    fn repeated_calls_are_idempotent_at_the_pin() {
        let pin = FakePin::default();
        let mut indicator = Indicator::new(Box::new(pin.clone()));
        indicator.illuminate();
        indicator.illuminate();
        indicator.extinguish();
        indicator.extinguish();
        // Same final level as calling each once.
        assert_eq!(*pin.levels.lock().unwrap(), vec![true, true, false, false]);
        assert_eq!(pin.levels.lock().unwrap().last(), Some(&false));
    }
}
