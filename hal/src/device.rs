//! # Device Abstraction Layer
//!
//! A uniform handle through which any peripheral driver is operated.
//!
//! ## Philosophy
//!
//! **The core never knows what a device is.**
//!
//! Concrete drivers implement [`Driver`]; the core holds a `Box<dyn Driver>`
//! and only adds what is common to every device: the Idle/Busy/Error state
//! machine, the IRQ-vector register, and ioctl command decoding.
//!
//! ## State Machine
//!
//! ```text
//! Idle --(operation invoked)--> Busy --(ok)--> Idle
//!                                    \--(err)--> Error   (sticky until init/Reset)
//! ```
//!
//! ## Not For
//!
//! - Timeouts: `wait_for_ready` polls without a budget. Timeout policy
//!   belongs to the concrete driver's operations.
//! - Arbitration: one operation in flight per device, by convention

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::error::{HalError, HalResult};
use crate::poll::Relax;
use crate::registers::RegisterIo;

/// Offset of the IRQ-vector register from a device's base address
pub const IRQ_VECTOR_OFFSET: usize = 0x10;

/// Device state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceStatus {
    /// Ready for an operation
    Idle = 0,
    /// An operation is in flight
    Busy = 1,
    /// The last operation failed
    Error = 2,
}

impl DeviceStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Busy,
            _ => Self::Error,
        }
    }
}

/// Device status shared between the owning driver and its interrupt handler
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    /// Creates a cell holding `status`
    pub fn new(status: DeviceStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    /// Returns the current status
    pub fn get(&self) -> DeviceStatus {
        DeviceStatus::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Stores a new status
    pub fn set(&self, status: DeviceStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}

/// Kind of peripheral behind a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Unknown,
    I2c,
    Uart,
    Spi,
    Gpio,
    Timer,
    /// A device with its own IRQ-vector register
    InterruptCapable,
}

/// Generic ioctl commands
///
/// Concrete meaning is device-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlCommand {
    /// Reset the device
    Reset,
    /// Set the device speed (baud rate, bus clock, ...)
    SetSpeed,
    /// Enable the device's interrupt
    EnableIrq,
    /// Disable the device's interrupt
    DisableIrq,
}

impl IoctlCommand {
    /// Returns the wire code of this command
    pub const fn code(self) -> u32 {
        match self {
            Self::Reset => 0x01,
            Self::SetSpeed => 0x02,
            Self::EnableIrq => 0x03,
            Self::DisableIrq => 0x04,
        }
    }
}

impl TryFrom<u32> for IoctlCommand {
    type Error = HalError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0x01 => Ok(Self::Reset),
            0x02 => Ok(Self::SetSpeed),
            0x03 => Ok(Self::EnableIrq),
            0x04 => Ok(Self::DisableIrq),
            _ => Err(HalError::Unsupported),
        }
    }
}

/// Capabilities a concrete driver provides
///
/// Every capability has a default. An absent `init`/`deinit` succeeds
/// trivially; an absent `read`/`write`/`ioctl` reports
/// [`HalError::Unsupported`].
pub trait Driver {
    /// Returns the kind of peripheral this driver operates
    fn device_type(&self) -> DeviceType;

    /// Brings the hardware to a known state
    fn init(&mut self) -> HalResult<()> {
        Ok(())
    }

    /// Releases the hardware
    fn deinit(&mut self) -> HalResult<()> {
        Ok(())
    }

    /// Reads into `buffer`, returning the number of bytes read
    fn read(&mut self, _buffer: &mut [u8]) -> HalResult<usize> {
        Err(HalError::Unsupported)
    }

    /// Writes `buffer`, returning the number of bytes written
    fn write(&mut self, _buffer: &[u8]) -> HalResult<usize> {
        Err(HalError::Unsupported)
    }

    /// Executes a control command
    fn ioctl(&mut self, _command: IoctlCommand, _argument: u32) -> HalResult<u32> {
        Err(HalError::Unsupported)
    }
}

/// A device handle
///
/// Created by a concrete driver at initialization time and owned by it.
/// `R` gives access to the device's own register window (control word and
/// IRQ vector); everything else goes through the driver.
pub struct Device<R> {
    base_address: usize,
    status: Arc<StatusCell>,
    control_word: u32,
    irq_line: Option<u32>,
    registers: R,
    driver: Box<dyn Driver>,
}

impl<R: RegisterIo> Device<R> {
    /// Creates an idle device around `driver`
    pub fn new(base_address: usize, registers: R, driver: Box<dyn Driver>) -> Self {
        Self {
            base_address,
            status: Arc::new(StatusCell::new(DeviceStatus::Idle)),
            control_word: 0,
            irq_line: None,
            registers,
            driver,
        }
    }

    /// Returns the base address of the device's registers
    pub fn base_address(&self) -> usize {
        self.base_address
    }

    /// Returns the driver's device type
    pub fn device_type(&self) -> DeviceType {
        self.driver.device_type()
    }

    /// Returns the current status
    pub fn status(&self) -> DeviceStatus {
        self.status.get()
    }

    /// Returns a handle to the status for interrupt handlers
    ///
    /// A handler that completes an asynchronous operation stores `Idle` (or
    /// `Error`) through this handle, releasing [`Device::wait_for_ready`].
    pub fn status_cell(&self) -> Arc<StatusCell> {
        Arc::clone(&self.status)
    }

    /// Returns the IRQ line set by [`Device::set_irq`]
    pub fn irq_line(&self) -> Option<u32> {
        self.irq_line
    }

    /// Returns the cached control word
    pub fn control_word(&self) -> u32 {
        self.control_word
    }

    /// Updates the cached control word
    pub fn set_control_word(&mut self, control_word: u32) {
        self.control_word = control_word;
    }

    /// Initializes the device
    ///
    /// Clears a sticky `Error` on success.
    pub fn init(&mut self) -> HalResult<()> {
        let prior = self.begin()?;
        let result = self.driver.init();
        self.finish(prior, &result, true);
        result
    }

    /// De-initializes the device
    pub fn deinit(&mut self) -> HalResult<()> {
        self.ensure_not_busy()?;
        self.driver.deinit()
    }

    /// Reads from the device
    ///
    /// Callers are expected to have called [`Device::wait_for_ready`]. A
    /// device in `Error` still delegates to the driver but stays in `Error`.
    pub fn read(&mut self, buffer: &mut [u8]) -> HalResult<usize> {
        let prior = self.begin()?;
        let result = self.driver.read(buffer);
        self.finish(prior, &result, false);
        result
    }

    /// Writes to the device
    ///
    /// Callers are expected to have called [`Device::wait_for_ready`].
    pub fn write(&mut self, buffer: &[u8]) -> HalResult<usize> {
        let prior = self.begin()?;
        let result = self.driver.write(buffer);
        self.finish(prior, &result, false);
        result
    }

    /// Executes a raw ioctl command code
    pub fn ioctl(&mut self, code: u32, argument: u32) -> HalResult<u32> {
        let command = IoctlCommand::try_from(code).inspect_err(|_| {
            warn!(
                "device {:#x}: unrecognized ioctl {:#x}",
                self.base_address, code
            );
        })?;

        let prior = self.begin()?;
        let result = self.driver.ioctl(command, argument);
        self.finish(prior, &result, command == IoctlCommand::Reset);
        result
    }

    /// Busy-polls until no operation is in flight
    ///
    /// Returns immediately, without calling `relax`, when the device is not
    /// busy. There is no timeout at this layer.
    pub fn wait_for_ready<H: Relax + ?Sized>(&self, relax: &mut H) -> HalResult<()> {
        while self.status.get() == DeviceStatus::Busy {
            relax.relax();
        }
        Ok(())
    }

    /// Assigns an interrupt line to an interrupt-capable device
    ///
    /// Writes the line to the IRQ-vector register. Routing the line's events
    /// to this device through the interrupt table is the driver's job.
    pub fn set_irq(&mut self, line: u32) -> HalResult<()> {
        if self.device_type() != DeviceType::InterruptCapable {
            return Err(HalError::Unsupported);
        }
        self.irq_line = Some(line);
        self.registers
            .write32(self.base_address + IRQ_VECTOR_OFFSET, line);
        debug!(
            "device {:#x}: irq vector set to {}",
            self.base_address, line
        );
        Ok(())
    }

    fn ensure_not_busy(&self) -> HalResult<()> {
        if self.status.get() == DeviceStatus::Busy {
            return Err(HalError::Busy);
        }
        Ok(())
    }

    /// Enters Busy, returning the status it replaced
    fn begin(&mut self) -> HalResult<DeviceStatus> {
        let prior = self.status.get();
        self.ensure_not_busy()?;
        self.status.set(DeviceStatus::Busy);
        Ok(prior)
    }

    /// Leaves Busy. Success returns to `prior` unless the operation
    /// `recovers` the device, in which case it goes Idle. An absent
    /// capability returns to `prior`, anything else is an error.
    fn finish<T>(&mut self, prior: DeviceStatus, result: &HalResult<T>, recovers: bool) {
        let next = match result {
            Ok(_) if recovers => DeviceStatus::Idle,
            Ok(_) => prior,
            Err(HalError::Unsupported) => prior,
            Err(err) => {
                warn!("device {:#x}: operation failed: {}", self.base_address, err);
                DeviceStatus::Error
            }
        };
        self.status.set(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::FakeRegisterFile;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Driver double that records the status it observed during each call
    struct ProbeDriver {
        kind: DeviceType,
        status: Option<Arc<StatusCell>>,
        observed: Observed,
        fail_with: Option<HalError>,
    }

    impl ProbeDriver {
        fn new(kind: DeviceType) -> Self {
            Self {
                kind,
                status: None,
                observed: Rc::new(RefCell::new(Vec::new())),
                fail_with: None,
            }
        }

        fn observe(&self) -> HalResult<()> {
            if let Some(status) = &self.status {
                self.observed.borrow_mut().push(status.get());
            }
            match self.fail_with {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    impl Driver for ProbeDriver {
        fn device_type(&self) -> DeviceType {
            self.kind
        }

        fn init(&mut self) -> HalResult<()> {
            self.observe()
        }

        fn read(&mut self, buffer: &mut [u8]) -> HalResult<usize> {
            self.observe()?;
            buffer.fill(0xA5);
            Ok(buffer.len())
        }

        fn write(&mut self, buffer: &[u8]) -> HalResult<usize> {
            self.observe()?;
            Ok(buffer.len())
        }

        fn ioctl(&mut self, command: IoctlCommand, argument: u32) -> HalResult<u32> {
            self.observe()?;
            Ok(command.code() + argument)
        }
    }

    /// Driver with no capabilities beyond its type
    struct BareDriver;

    impl Driver for BareDriver {
        fn device_type(&self) -> DeviceType {
            DeviceType::Gpio
        }
    }

    type Observed = Rc<RefCell<Vec<DeviceStatus>>>;

    fn probe_device(driver: ProbeDriver) -> (Device<FakeRegisterFile>, Observed) {
        let observed = Rc::clone(&driver.observed);
        let device = Device::new(0x1000, FakeRegisterFile::new(), Box::new(driver));
        (device, observed)
    }

    fn wired_probe(
        kind: DeviceType,
        fail_with: Option<HalError>,
    ) -> (Device<FakeRegisterFile>, Observed) {
        // Share one status cell between the device and the probe.
        let mut driver = ProbeDriver::new(kind);
        driver.fail_with = fail_with;
        let status = Arc::new(StatusCell::new(DeviceStatus::Idle));
        driver.status = Some(Arc::clone(&status));
        let (mut device, observed) = probe_device(driver);
        device.status = status;
        (device, observed)
    }

    #[test]
    fn test_bare_driver_defaults() {
        let mut device = Device::new(0x2000, FakeRegisterFile::new(), Box::new(BareDriver));
        assert_eq!(device.init(), Ok(()));
        assert_eq!(device.status(), DeviceStatus::Idle);

        let mut buf = [0u8; 4];
        assert_eq!(device.read(&mut buf), Err(HalError::Unsupported));
        assert_eq!(device.write(&buf), Err(HalError::Unsupported));
        assert_eq!(
            device.ioctl(IoctlCommand::Reset.code(), 0),
            Err(HalError::Unsupported)
        );
        assert_eq!(device.status(), DeviceStatus::Idle);
        assert_eq!(device.deinit(), Ok(()));
    }

    #[test]
    fn test_operations_run_while_busy() {
        let (mut device, observed) = wired_probe(DeviceType::Uart, None);

        device.init().unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(device.read(&mut buf), Ok(3));
        assert_eq!(buf, [0xA5; 3]);
        assert_eq!(device.write(&[1, 2]), Ok(2));

        assert_eq!(
            *observed.borrow(),
            vec![DeviceStatus::Busy, DeviceStatus::Busy, DeviceStatus::Busy]
        );
        assert_eq!(device.status(), DeviceStatus::Idle);
    }

    #[test]
    fn test_failure_passes_through_busy_to_error() {
        let (mut device, observed) = wired_probe(DeviceType::Spi, Some(HalError::Timeout));

        assert_eq!(device.write(&[0xFF]), Err(HalError::Timeout));
        assert_eq!(*observed.borrow(), vec![DeviceStatus::Busy]);
        assert_eq!(device.status(), DeviceStatus::Error);
    }

    #[test]
    fn test_error_is_sticky_until_init() {
        let (mut device, observed) = wired_probe(DeviceType::Spi, Some(HalError::Timeout));
        let _ = device.write(&[0xFF]);
        assert_eq!(device.status(), DeviceStatus::Error);

        // Still delegated, the driver's own code comes back.
        let mut buf = [0u8; 1];
        assert_eq!(device.read(&mut buf), Err(HalError::Timeout));
        assert_eq!(
            *observed.borrow(),
            vec![DeviceStatus::Busy, DeviceStatus::Busy]
        );
        assert_eq!(device.status(), DeviceStatus::Error);
    }

    #[test]
    fn test_success_in_error_state_stays_error() {
        let (mut device, observed) = wired_probe(DeviceType::Uart, None);
        device.status_cell().set(DeviceStatus::Error);

        assert_eq!(device.write(&[1, 2]), Ok(2));
        assert_eq!(device.ioctl(IoctlCommand::SetSpeed.code(), 0), Ok(0x02));
        assert_eq!(
            *observed.borrow(),
            vec![DeviceStatus::Busy, DeviceStatus::Busy]
        );
        assert_eq!(device.status(), DeviceStatus::Error);

        device.init().unwrap();
        assert_eq!(device.status(), DeviceStatus::Idle);
    }

    #[test]
    fn test_missing_capability_in_error_state_is_unsupported() {
        let mut device = Device::new(0x2000, FakeRegisterFile::new(), Box::new(BareDriver));
        device.status_cell().set(DeviceStatus::Error);

        assert_eq!(device.read(&mut [0]), Err(HalError::Unsupported));
        assert_eq!(device.write(&[0]), Err(HalError::Unsupported));
        assert_eq!(device.status(), DeviceStatus::Error);
    }

    #[test]
    fn test_init_recovers_from_error() {
        let status = Arc::new(StatusCell::new(DeviceStatus::Idle));
        let mut device = Device::new(0x3000, FakeRegisterFile::new(), Box::new(BareDriver));
        device.status = Arc::clone(&status);
        status.set(DeviceStatus::Error);

        device.init().unwrap();
        assert_eq!(device.status(), DeviceStatus::Idle);
    }

    #[test]
    fn test_busy_device_rejects_operations() {
        let (mut device, observed) = wired_probe(DeviceType::Uart, None);
        device.status_cell().set(DeviceStatus::Busy);

        assert_eq!(device.write(&[1]), Err(HalError::Busy));
        assert_eq!(
            device.ioctl(IoctlCommand::Reset.code(), 0),
            Err(HalError::Busy)
        );
        assert!(observed.borrow().is_empty());
    }

    #[test]
    fn test_ioctl_decoding() {
        let (mut device, _observed) = wired_probe(DeviceType::Uart, None);

        assert_eq!(device.ioctl(0x02, 9600), Ok(0x02 + 9600));
        assert_eq!(device.ioctl(0x04, 0), Ok(0x04));
        assert_eq!(device.ioctl(0x99, 0), Err(HalError::Unsupported));
        assert_eq!(device.status(), DeviceStatus::Idle);
    }

    #[test]
    fn test_reset_ioctl_clears_error() {
        let (mut device, _observed) = wired_probe(DeviceType::Uart, None);
        device.status_cell().set(DeviceStatus::Error);

        assert_eq!(device.ioctl(IoctlCommand::Reset.code(), 0), Ok(0x01));
        assert_eq!(device.status(), DeviceStatus::Idle);
    }

    #[test]
    fn test_wait_for_ready_idle_returns_without_polling() {
        let device = Device::new(0x4000, FakeRegisterFile::new(), Box::new(BareDriver));
        let mut polls = 0;
        let mut hook = || polls += 1;

        device.wait_for_ready(&mut hook).unwrap();
        assert_eq!(polls, 0);
    }

    #[test]
    fn test_wait_for_ready_polls_until_handler_completes() {
        let device = Device::new(0x4000, FakeRegisterFile::new(), Box::new(BareDriver));
        let status = device.status_cell();
        status.set(DeviceStatus::Busy);

        let mut polls = 0;
        let mut interrupt = || {
            polls += 1;
            if polls == 3 {
                status.set(DeviceStatus::Idle);
            }
        };
        device.wait_for_ready(&mut interrupt).unwrap();
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_set_irq_requires_interrupt_capable() {
        let mut device = Device::new(0x5000, FakeRegisterFile::new(), Box::new(BareDriver));
        assert_eq!(device.set_irq(7), Err(HalError::Unsupported));
        assert_eq!(device.irq_line(), None);
    }

    #[test]
    fn test_set_irq_writes_vector_register() {
        let regs = FakeRegisterFile::new();
        let driver = ProbeDriver::new(DeviceType::InterruptCapable);
        let mut device = Device::new(0x5000, regs.clone(), Box::new(driver));

        device.set_irq(11).unwrap();
        assert_eq!(device.irq_line(), Some(11));
        assert_eq!(regs.writes_to(0x5000 + IRQ_VECTOR_OFFSET), vec![11]);
    }

    #[test]
    fn test_ioctl_command_codes_round_trip() {
        for command in [
            IoctlCommand::Reset,
            IoctlCommand::SetSpeed,
            IoctlCommand::EnableIrq,
            IoctlCommand::DisableIrq,
        ] {
            assert_eq!(IoctlCommand::try_from(command.code()), Ok(command));
        }
        assert_eq!(IoctlCommand::try_from(0), Err(HalError::Unsupported));
    }
}
