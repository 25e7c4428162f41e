//! I2C peripheral as a HAL device
//!
//! [`I2cDevice`] binds a controller to one peripheral address and exposes
//! it through the [`Driver`] contract, so it can be operated through a
//! [`hal::Device`] like any other peripheral.

use hal::{DeviceType, Driver, HalError, HalResult, IoctlCommand, RegisterIo};
use log::debug;

use crate::controller::{I2cController, PeripheralAddress};

/// Driver for a single peripheral on an I2C bus
pub struct I2cDevice<R> {
    controller: I2cController<R>,
    target: PeripheralAddress,
}

impl<R: RegisterIo> I2cDevice<R> {
    /// Binds `controller` to the peripheral at `address`
    pub fn new(controller: I2cController<R>, address: u8) -> HalResult<Self> {
        Ok(Self {
            controller,
            target: PeripheralAddress::new(address)?,
        })
    }

    /// Returns the peripheral address
    pub fn target(&self) -> PeripheralAddress {
        self.target
    }

    /// Returns the controller
    pub fn controller(&self) -> &I2cController<R> {
        &self.controller
    }

    /// Returns the controller mutably
    pub fn controller_mut(&mut self) -> &mut I2cController<R> {
        &mut self.controller
    }
}

impl<R: RegisterIo> Driver for I2cDevice<R> {
    fn device_type(&self) -> DeviceType {
        DeviceType::I2c
    }

    fn init(&mut self) -> HalResult<()> {
        self.controller.init()
    }

    fn deinit(&mut self) -> HalResult<()> {
        self.controller.deinit()
    }

    fn read(&mut self, buffer: &mut [u8]) -> HalResult<usize> {
        let retries = self.controller.config().max_retries;
        self.controller
            .receive_with_retries(self.target.get(), buffer, retries)?;
        Ok(buffer.len())
    }

    fn write(&mut self, buffer: &[u8]) -> HalResult<usize> {
        let retries = self.controller.config().max_retries;
        self.controller
            .send_with_retries(self.target.get(), buffer, retries)?;
        Ok(buffer.len())
    }

    fn ioctl(&mut self, command: IoctlCommand, argument: u32) -> HalResult<u32> {
        match command {
            IoctlCommand::Reset => {
                debug!("i2c {:#04x}: reset", self.target.get());
                self.controller.init()?;
                Ok(0)
            }
            IoctlCommand::SetSpeed => {
                self.controller.set_speed(argument);
                Ok(0)
            }
            IoctlCommand::EnableIrq | IoctlCommand::DisableIrq => Err(HalError::Unsupported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::I2cConfig;
    use crate::regs::DEFAULT_BASE;
    use crate::sim::SimulatedController;
    use hal::{Device, DeviceStatus};

    fn eeprom_device(sim: &SimulatedController) -> Device<SimulatedController> {
        let config = I2cConfig::default().with_timeout_budget(100);
        let controller = I2cController::new(sim.clone(), config);
        let driver = I2cDevice::new(controller, 0x50).unwrap();
        Device::new(DEFAULT_BASE, sim.clone(), Box::new(driver))
    }

    #[test]
    fn test_rejects_wide_address() {
        let sim = SimulatedController::new(DEFAULT_BASE);
        let controller = I2cController::new(sim, I2cConfig::default());
        assert!(matches!(
            I2cDevice::new(controller, 0x90),
            Err(HalError::OutOfRange(0x90))
        ));
    }

    #[test]
    fn test_write_then_read_through_device() {
        let sim = SimulatedController::new(DEFAULT_BASE);
        sim.attach(0x50);
        let mut device = eeprom_device(&sim);

        device.init().unwrap();
        assert_eq!(device.device_type(), DeviceType::I2c);
        assert_eq!(sim.clock(), 100_000);

        assert_eq!(device.write(&[0x20, 0xDE, 0xAD]), Ok(3));
        assert_eq!(device.write(&[0x20]), Ok(1));

        let mut buffer = [0u8; 2];
        assert_eq!(device.read(&mut buffer), Ok(2));
        assert_eq!(buffer, [0xDE, 0xAD]);
        assert_eq!(device.status(), DeviceStatus::Idle);
    }

    #[test]
    fn test_missing_peripheral_fails_device() {
        let sim = SimulatedController::new(DEFAULT_BASE);
        let mut device = eeprom_device(&sim);
        device.init().unwrap();

        assert_eq!(device.write(&[1]), Err(HalError::Failed));
        assert_eq!(device.status(), DeviceStatus::Error);
        assert_eq!(sim.starts(), 3);
        assert_eq!(sim.stops(), 3);

        // Still attempted while in error.
        assert_eq!(device.write(&[1]), Err(HalError::Failed));
        assert_eq!(sim.starts(), 6);

        // Sticky until reset.
        sim.attach(0x50);
        assert_eq!(device.write(&[1]), Ok(1));
        assert_eq!(device.status(), DeviceStatus::Error);
        assert_eq!(device.ioctl(IoctlCommand::Reset.code(), 0), Ok(0));
        assert_eq!(device.status(), DeviceStatus::Idle);
        assert_eq!(device.write(&[1]), Ok(1));
        assert_eq!(device.status(), DeviceStatus::Idle);
    }

    #[test]
    fn test_ioctl_speed_and_irq() {
        let sim = SimulatedController::new(DEFAULT_BASE);
        let mut device = eeprom_device(&sim);

        assert_eq!(device.ioctl(IoctlCommand::SetSpeed.code(), 400_000), Ok(0));
        assert_eq!(sim.clock(), 400_000);
        assert_eq!(
            device.ioctl(IoctlCommand::EnableIrq.code(), 0),
            Err(HalError::Unsupported)
        );
        assert_eq!(device.status(), DeviceStatus::Idle);
    }

    #[test]
    fn test_deinit_clears_ack() {
        let sim = SimulatedController::new(DEFAULT_BASE);
        let mut device = eeprom_device(&sim);
        device.init().unwrap();
        assert!(sim.ack_enabled());

        device.deinit().unwrap();
        assert!(!sim.ack_enabled());
    }
}
