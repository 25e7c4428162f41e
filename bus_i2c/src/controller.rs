//! I2C transaction engine
//!
//! A transaction walks five phases:
//!
//! 1. **BusFree**: poll until the status Busy bit clears
//! 2. **Start**: assert START
//! 3. **AddressPhase**: write `(address << 1) | direction`, poll Done
//! 4. **DataPhase**: per byte, write then poll Done, or poll Done then read
//! 5. **Stop**: assert STOP
//!
//! Every wait is a [`poll_until`] bounded by the transaction's budget. Once
//! START has been asserted, STOP is asserted on every return path, so the
//! number of STOPs always equals the number of STARTs.

use hal::{poll_until, HalError, HalResult, RegisterBlock, RegisterIo, Relax, SpinRelax};
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{I2cConfig, I2cSpeed};
use crate::regs::{ControlFlags, StatusFlags, CLOCK, CONTROL, DATA, READ_BIT, STATUS};

/// A 7-bit peripheral address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeripheralAddress(u8);

impl PeripheralAddress {
    /// Highest 7-bit address
    pub const MAX: u8 = 0x7F;

    /// Validates a raw address
    pub fn new(raw: u8) -> HalResult<Self> {
        if raw > Self::MAX {
            return Err(HalError::OutOfRange(raw as usize));
        }
        Ok(Self(raw))
    }

    /// Returns the raw 7-bit value
    pub fn get(self) -> u8 {
        self.0
    }

    /// Returns the byte sent during the address phase
    pub fn address_byte(self, direction: Direction) -> u8 {
        match direction {
            Direction::Write => self.0 << 1,
            Direction::Read => (self.0 << 1) | READ_BIT,
        }
    }

    /// Iterates every 7-bit address
    pub fn all() -> impl Iterator<Item = PeripheralAddress> {
        (0..=Self::MAX).map(PeripheralAddress)
    }
}

impl TryFrom<u8> for PeripheralAddress {
    type Error = HalError;

    fn try_from(raw: u8) -> HalResult<Self> {
        Self::new(raw)
    }
}

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Write,
    Read,
}

/// Transaction phase, recorded when a transaction fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    BusFree,
    Start,
    AddressPhase,
    DataPhase,
    Stop,
}

/// Bytes moved by a transaction
#[derive(Debug)]
pub enum Payload<'a> {
    Write(&'a [u8]),
    Read(&'a mut [u8]),
}

/// One START-to-STOP exchange with a single peripheral
#[derive(Debug)]
pub struct Transaction<'a> {
    pub address: PeripheralAddress,
    pub payload: Payload<'a>,
    pub timeout_budget: u32,
}

impl<'a> Transaction<'a> {
    /// Creates a write transaction
    pub fn write(address: PeripheralAddress, bytes: &'a [u8], timeout_budget: u32) -> Self {
        Self {
            address,
            payload: Payload::Write(bytes),
            timeout_budget,
        }
    }

    /// Creates a read transaction filling `buffer`
    pub fn read(address: PeripheralAddress, buffer: &'a mut [u8], timeout_budget: u32) -> Self {
        Self {
            address,
            payload: Payload::Read(buffer),
            timeout_budget,
        }
    }

    /// Returns the transfer direction
    pub fn direction(&self) -> Direction {
        match self.payload {
            Payload::Write(_) => Direction::Write,
            Payload::Read(_) => Direction::Read,
        }
    }

    /// Returns the number of data bytes
    pub fn len(&self) -> usize {
        match &self.payload {
            Payload::Write(bytes) => bytes.len(),
            Payload::Read(buffer) => buffer.len(),
        }
    }

    /// Returns whether the transaction carries no data bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Controller counters, reported by the `stats` diagnostic command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct I2cStats {
    pub transactions: u64,
    pub starts: u64,
    pub stops: u64,
    pub timeouts: u64,
    pub retries: u64,
    pub last_failure: Option<Phase>,
}

/// I2C bus master over a memory-mapped register block
pub struct I2cController<R> {
    regs: RegisterBlock<R>,
    config: I2cConfig,
    relax: Box<dyn Relax>,
    stats: I2cStats,
}

impl<R: RegisterIo> I2cController<R> {
    /// Creates a controller at `config.base_address`
    ///
    /// Does not touch the hardware; call [`I2cController::init`].
    pub fn new(io: R, config: I2cConfig) -> Self {
        Self {
            regs: RegisterBlock::new(io, config.base_address),
            config,
            relax: Box::new(SpinRelax),
            stats: I2cStats::default(),
        }
    }

    /// Replaces the hook called between status polls
    pub fn with_relax(mut self, relax: impl Relax + 'static) -> Self {
        self.relax = Box::new(relax);
        self
    }

    /// Returns the configuration
    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    /// Returns the counters
    pub fn stats(&self) -> I2cStats {
        self.stats
    }

    /// Zeroes the counters
    pub fn reset_stats(&mut self) {
        self.stats = I2cStats::default();
    }

    /// Reads a controller register at `offset`
    pub fn read_raw(&mut self, offset: usize) -> u32 {
        self.regs.read(offset)
    }

    /// Programs the default clock and enables automatic ACK
    pub fn init(&mut self) -> HalResult<()> {
        info!(
            "i2c@{:#x}: init, clock {} Hz",
            self.regs.base(),
            self.config.default_speed_hz
        );
        self.regs.write(CLOCK, self.config.default_speed_hz);
        self.regs.set_bits(CONTROL, ControlFlags::ACK.bits());
        Ok(())
    }

    /// Disables automatic ACK
    pub fn deinit(&mut self) -> HalResult<()> {
        info!("i2c@{:#x}: deinit", self.regs.base());
        self.regs.clear_bits(CONTROL, ControlFlags::ACK.bits());
        Ok(())
    }

    /// Writes the clock register
    ///
    /// Rates other than the standard 100 kHz, 400 kHz and 3.4 MHz are
    /// written anyway; bus timing at such rates is undefined.
    pub fn set_speed(&mut self, hz: u32) {
        match I2cSpeed::from_hz(hz) {
            Some(speed) => info!("i2c: speed {:?} ({} Hz)", speed, hz),
            None => warn!("i2c: non-standard speed {} Hz", hz),
        }
        self.regs.write(CLOCK, hz);
    }

    /// Writes `payload` to `address` in one transaction
    pub fn send(&mut self, address: u8, payload: &[u8]) -> HalResult<()> {
        let address = PeripheralAddress::new(address)?;
        let budget = self.config.timeout_budget;
        self.execute(Transaction::write(address, payload, budget))
            .inspect_err(|err| {
                warn!("i2c: send to {:#04x} failed: {}", address.get(), err);
            })
    }

    /// Fills `buffer` from `address` in one transaction
    pub fn receive(&mut self, address: u8, buffer: &mut [u8]) -> HalResult<()> {
        let address = PeripheralAddress::new(address)?;
        let budget = self.config.timeout_budget;
        self.execute(Transaction::read(address, buffer, budget))
            .inspect_err(|err| {
                warn!("i2c: receive from {:#04x} failed: {}", address.get(), err);
            })
    }

    /// Sends with up to `max_retries` full restarts
    ///
    /// Returns [`HalError::Failed`] once every attempt has failed, or
    /// immediately when `max_retries` is zero.
    pub fn send_with_retries(
        &mut self,
        address: u8,
        payload: &[u8],
        max_retries: u32,
    ) -> HalResult<()> {
        PeripheralAddress::new(address)?;
        self.with_retries(max_retries, |ctrl| ctrl.send(address, payload))
    }

    /// Receives with up to `max_retries` full restarts
    pub fn receive_with_retries(
        &mut self,
        address: u8,
        buffer: &mut [u8],
        max_retries: u32,
    ) -> HalResult<()> {
        PeripheralAddress::new(address)?;
        self.with_retries(max_retries, |ctrl| ctrl.receive(address, &mut *buffer))
    }

    /// Writes `value` into peripheral register `register`
    pub fn write_register(&mut self, address: u8, register: u8, value: u8) -> HalResult<()> {
        self.send(address, &[register, value])
    }

    /// Reads peripheral register `register`
    ///
    /// The controller has no repeated START, so the register pointer write
    /// and the one-byte read are separate transactions.
    pub fn read_register(&mut self, address: u8, register: u8) -> HalResult<u8> {
        self.send(address, &[register])?;
        let mut value = [0u8; 1];
        self.receive(address, &mut value)?;
        Ok(value[0])
    }

    /// Probes all 128 addresses with a zero-length write
    ///
    /// Returns the addresses that completed the address phase.
    pub fn scan_bus(&mut self) -> Vec<PeripheralAddress> {
        let budget = self.config.scan_timeout_budget;
        let present: Vec<_> = PeripheralAddress::all()
            .filter(|&address| {
                self.execute(Transaction::write(address, &[], budget))
                    .is_ok()
            })
            .collect();
        info!("i2c: scan found {} device(s)", present.len());
        present
    }

    /// Runs one transaction through every phase
    pub fn execute(&mut self, mut txn: Transaction<'_>) -> HalResult<()> {
        self.stats.transactions += 1;
        debug!(
            "i2c: {:?} {:#04x}, {} byte(s)",
            txn.direction(),
            txn.address.get(),
            txn.len()
        );

        let budget = txn.timeout_budget;
        if let Err(err) = self.wait_status(budget, |status| !status.contains(StatusFlags::BUSY)) {
            return Err(self.fail(Phase::BusFree, err));
        }

        self.regs.set_bits(CONTROL, ControlFlags::START.bits());
        self.stats.starts += 1;

        let result = self.transfer(&mut txn);

        self.regs.set_bits(CONTROL, ControlFlags::STOP.bits());
        self.stats.stops += 1;

        result.map_err(|(phase, err)| self.fail(phase, err))
    }

    fn transfer(&mut self, txn: &mut Transaction<'_>) -> Result<(), (Phase, HalError)> {
        let budget = txn.timeout_budget;
        let address_byte = txn.address.address_byte(txn.direction());

        self.regs.write(DATA, address_byte.into());
        self.wait_done(budget)
            .map_err(|err| (Phase::AddressPhase, err))?;

        match &mut txn.payload {
            Payload::Write(bytes) => {
                for &byte in bytes.iter() {
                    self.regs.write(DATA, byte.into());
                    self.wait_done(budget)
                        .map_err(|err| (Phase::DataPhase, err))?;
                }
            }
            Payload::Read(buffer) => {
                for slot in buffer.iter_mut() {
                    self.wait_done(budget)
                        .map_err(|err| (Phase::DataPhase, err))?;
                    *slot = (self.regs.read(DATA) & 0xFF) as u8;
                }
            }
        }
        Ok(())
    }

    fn wait_done(&mut self, budget: u32) -> HalResult<u32> {
        self.wait_status(budget, |status| status.contains(StatusFlags::DONE))
    }

    fn wait_status(
        &mut self,
        budget: u32,
        mut ready: impl FnMut(StatusFlags) -> bool,
    ) -> HalResult<u32> {
        let Self { regs, relax, .. } = self;
        poll_until(budget, relax.as_mut(), || {
            ready(StatusFlags::from_bits_truncate(regs.read(STATUS)))
        })
    }

    fn fail(&mut self, phase: Phase, err: HalError) -> HalError {
        if err == HalError::Timeout {
            self.stats.timeouts += 1;
        }
        self.stats.last_failure = Some(phase);
        debug!("i2c: {} in {:?}", err, phase);
        err
    }

    fn with_retries(
        &mut self,
        max_retries: u32,
        mut attempt: impl FnMut(&mut Self) -> HalResult<()>,
    ) -> HalResult<()> {
        if max_retries == 0 {
            warn!("i2c: retry wrapper called with zero attempts");
            return Err(HalError::Failed);
        }
        for n in 1..=max_retries {
            match attempt(self) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!("i2c: attempt {}/{} failed: {}", n, max_retries, err);
                    if n < max_retries {
                        self.stats.retries += 1;
                    }
                }
            }
        }
        Err(HalError::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::FakeRegisterFile;
    use std::cell::Cell;
    use std::rc::Rc;

    const BASE: usize = 0x4000_3000;

    fn controller(budget: u32) -> (I2cController<FakeRegisterFile>, FakeRegisterFile) {
        let regs = FakeRegisterFile::new();
        let config = I2cConfig::default().with_timeout_budget(budget);
        (I2cController::new(regs.clone(), config), regs)
    }

    #[test]
    fn test_address_validation() {
        assert_eq!(
            PeripheralAddress::new(0x80),
            Err(HalError::OutOfRange(0x80))
        );
        let address = PeripheralAddress::try_from(0x50).unwrap();
        assert_eq!(address.address_byte(Direction::Write), 0xA0);
        assert_eq!(address.address_byte(Direction::Read), 0xA1);
        assert_eq!(PeripheralAddress::all().count(), 128);
    }

    #[test]
    fn test_init_sets_clock_and_ack() {
        let (mut ctrl, regs) = controller(10);
        ctrl.init().unwrap();
        assert_eq!(regs.value(BASE + CLOCK), 100_000);
        assert_eq!(regs.value(BASE + CONTROL), ControlFlags::ACK.bits());

        ctrl.deinit().unwrap();
        assert_eq!(regs.value(BASE + CONTROL) & ControlFlags::ACK.bits(), 0);
    }

    #[test]
    fn test_send_writes_address_then_payload() {
        let (mut ctrl, regs) = controller(10);
        regs.preset(BASE + STATUS, StatusFlags::DONE.bits());

        ctrl.send(0x50, &[0x01, 0x02, 0x03, 0x04]).unwrap();

        assert_eq!(
            regs.writes_to(BASE + DATA),
            vec![0xA0, 0x01, 0x02, 0x03, 0x04]
        );
        let stats = ctrl.stats();
        assert_eq!((stats.starts, stats.stops), (1, 1));
        assert_eq!(stats.last_failure, None);
    }

    #[test]
    fn test_receive_uses_read_bit() {
        let (mut ctrl, regs) = controller(10);
        regs.preset(BASE + STATUS, StatusFlags::DONE.bits());

        let mut buffer = [0u8; 2];
        ctrl.receive(0x50, &mut buffer).unwrap();

        assert_eq!(regs.writes_to(BASE + DATA), vec![0xA1]);
        // The fake data register echoes the address byte back.
        assert_eq!(buffer, [0xA1, 0xA1]);
    }

    #[test]
    fn test_timeout_still_stops() {
        let (mut ctrl, regs) = controller(50);

        assert_eq!(ctrl.send(0x50, &[1]), Err(HalError::Timeout));

        // One bus-free check, then exactly the budget waiting for Done.
        assert_eq!(regs.reads_of(BASE + STATUS), 1 + 50);
        let stats = ctrl.stats();
        assert_eq!((stats.starts, stats.stops, stats.timeouts), (1, 1, 1));
        assert_eq!(stats.last_failure, Some(Phase::AddressPhase));
        assert_ne!(regs.value(BASE + CONTROL) & ControlFlags::STOP.bits(), 0);
    }

    #[test]
    fn test_bus_never_free_skips_start() {
        let (mut ctrl, regs) = controller(20);
        regs.preset(BASE + STATUS, StatusFlags::BUSY.bits());

        assert_eq!(ctrl.send(0x50, &[1]), Err(HalError::Timeout));
        assert_eq!(regs.reads_of(BASE + STATUS), 20);
        assert!(regs.writes_to(BASE + CONTROL).is_empty());
        assert_eq!(ctrl.stats().last_failure, Some(Phase::BusFree));
        assert_eq!(ctrl.stats().starts, ctrl.stats().stops);
    }

    #[test]
    fn test_relax_hook_called_per_failed_poll() {
        let relaxed = Rc::new(Cell::new(0u32));
        let counter = relaxed.clone();
        let (ctrl, _regs) = controller(7);
        let mut ctrl = ctrl.with_relax(move || counter.set(counter.get() + 1));

        assert_eq!(ctrl.send(0x10, &[]), Err(HalError::Timeout));
        assert_eq!(relaxed.get(), 7);
    }

    #[test]
    fn test_retries_bounded() {
        let (mut ctrl, _regs) = controller(3);

        assert_eq!(
            ctrl.send_with_retries(0x50, &[1, 2], 4),
            Err(HalError::Failed)
        );
        let stats = ctrl.stats();
        assert_eq!(stats.starts, 4);
        assert_eq!(stats.stops, 4);
        assert_eq!(stats.retries, 3);
    }

    #[test]
    fn test_zero_retries_never_touch_bus() {
        let (mut ctrl, regs) = controller(3);
        assert_eq!(ctrl.send_with_retries(0x50, &[1], 0), Err(HalError::Failed));
        assert!(regs.accesses().is_empty());
    }

    #[test]
    fn test_retry_rejects_bad_address_without_attempts() {
        let (mut ctrl, regs) = controller(3);
        assert_eq!(
            ctrl.send_with_retries(0xF0, &[1], 3),
            Err(HalError::OutOfRange(0xF0))
        );
        assert!(regs.accesses().is_empty());
    }

    #[test]
    fn test_set_speed_writes_any_value() {
        let (mut ctrl, regs) = controller(3);
        ctrl.set_speed(400_000);
        ctrl.set_speed(123_456);
        assert_eq!(regs.writes_to(BASE + CLOCK), vec![400_000, 123_456]);
    }

    #[test]
    fn test_read_register_is_two_transactions() {
        let (mut ctrl, regs) = controller(3);
        regs.preset(BASE + STATUS, StatusFlags::DONE.bits());

        ctrl.read_register(0x50, 0x10).unwrap();

        assert_eq!(regs.writes_to(BASE + DATA), vec![0xA0, 0x10, 0xA1]);
        assert_eq!(ctrl.stats().transactions, 2);
    }
}
