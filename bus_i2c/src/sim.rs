//! Simulated I2C controller
//!
//! A register-level model of the controller with EEPROM-like peripherals
//! attached. It implements [`RegisterIo`], so the real transaction engine
//! runs against it unchanged.
//!
//! ## Model
//!
//! - START and STOP self-clear and are counted
//! - An address byte naming an attached peripheral sets Done; any other
//!   address is never acknowledged, so Done stays clear
//! - The first written data byte sets the peripheral's memory pointer, the
//!   rest are stored at the pointer, which auto-increments
//! - Reads return memory at the pointer, which auto-increments
//!
//! Clones share state, so a test keeps one handle while the controller owns
//! another.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use hal::RegisterIo;

use crate::regs::{ControlFlags, StatusFlags, CLOCK, CONTROL, DATA, READ_BIT, STATUS};

/// Memory size of a simulated peripheral
pub const PERIPHERAL_MEMORY: usize = 256;

#[derive(Debug, Clone)]
struct Peripheral {
    memory: [u8; PERIPHERAL_MEMORY],
    pointer: u8,
}

impl Peripheral {
    fn new() -> Self {
        Self {
            memory: [0; PERIPHERAL_MEMORY],
            pointer: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusState {
    Idle,
    AwaitAddress,
    Writing { address: u8, pointer_set: bool },
    Reading { address: u8 },
    Ignored,
}

#[derive(Debug)]
struct SimState {
    base: usize,
    control: u32,
    clock: u32,
    done: bool,
    bus: BusState,
    last_data: u32,
    peripherals: BTreeMap<u8, Peripheral>,
    busy_reads: usize,
    nack_addresses: usize,
    stalled: bool,
    starts: usize,
    stops: usize,
    status_reads: usize,
    data_writes: Vec<u8>,
}

impl SimState {
    fn status(&mut self) -> u32 {
        self.status_reads += 1;
        let mut status = StatusFlags::empty();
        if self.busy_reads > 0 {
            self.busy_reads -= 1;
            status |= StatusFlags::BUSY;
        }
        if self.done && !self.stalled {
            status |= StatusFlags::DONE;
        }
        status.bits()
    }

    fn write_control(&mut self, value: u32) {
        let flags = ControlFlags::from_bits_truncate(value);
        if flags.contains(ControlFlags::START) {
            self.starts += 1;
            self.done = false;
            self.bus = BusState::AwaitAddress;
        }
        if flags.contains(ControlFlags::STOP) {
            self.stops += 1;
            self.done = false;
            self.bus = BusState::Idle;
        }
        // START and STOP self-clear.
        self.control = (flags & ControlFlags::ACK).bits();
    }

    fn write_data(&mut self, value: u32) {
        let byte = (value & 0xFF) as u8;
        self.data_writes.push(byte);
        self.last_data = value;

        self.bus = match self.bus {
            BusState::AwaitAddress => self.address_phase(byte),
            BusState::Writing {
                address,
                pointer_set,
            } => {
                if let Some(peripheral) = self.peripherals.get_mut(&address) {
                    if pointer_set {
                        peripheral.memory[peripheral.pointer as usize] = byte;
                        peripheral.pointer = peripheral.pointer.wrapping_add(1);
                    } else {
                        peripheral.pointer = byte;
                    }
                }
                self.done = true;
                BusState::Writing {
                    address,
                    pointer_set: true,
                }
            }
            other => {
                self.done = false;
                other
            }
        };
    }

    fn address_phase(&mut self, byte: u8) -> BusState {
        let address = byte >> 1;
        if !self.peripherals.contains_key(&address) {
            self.done = false;
            return BusState::Ignored;
        }
        if self.nack_addresses > 0 {
            self.nack_addresses -= 1;
            self.done = false;
            return BusState::Ignored;
        }

        self.done = true;
        if byte & READ_BIT != 0 {
            BusState::Reading { address }
        } else {
            BusState::Writing {
                address,
                pointer_set: false,
            }
        }
    }

    fn read_data(&mut self) -> u32 {
        if let BusState::Reading { address } = self.bus {
            if let Some(peripheral) = self.peripherals.get_mut(&address) {
                let byte = peripheral.memory[peripheral.pointer as usize];
                peripheral.pointer = peripheral.pointer.wrapping_add(1);
                self.last_data = byte.into();
            }
        }
        self.last_data
    }
}

/// Shared handle to a simulated controller
#[derive(Debug, Clone)]
pub struct SimulatedController {
    state: Rc<RefCell<SimState>>,
}

impl SimulatedController {
    /// Creates a controller mapped at `base` with no peripherals attached
    pub fn new(base: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                base,
                control: 0,
                clock: 0,
                done: false,
                bus: BusState::Idle,
                last_data: 0,
                peripherals: BTreeMap::new(),
                busy_reads: 0,
                nack_addresses: 0,
                stalled: false,
                starts: 0,
                stops: 0,
                status_reads: 0,
                data_writes: Vec::new(),
            })),
        }
    }

    /// Attaches a zero-filled peripheral at a 7-bit address
    pub fn attach(&self, address: u8) -> &Self {
        self.state
            .borrow_mut()
            .peripherals
            .insert(address, Peripheral::new());
        self
    }

    /// Detaches the peripheral at `address`
    pub fn detach(&self, address: u8) {
        self.state.borrow_mut().peripherals.remove(&address);
    }

    /// Loads bytes into a peripheral's memory starting at `offset`
    pub fn load(&self, address: u8, offset: u8, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        if let Some(peripheral) = state.peripherals.get_mut(&address) {
            for (i, &byte) in bytes.iter().enumerate() {
                let slot = (offset as usize + i) % PERIPHERAL_MEMORY;
                peripheral.memory[slot] = byte;
            }
        }
    }

    /// Returns a copy of a peripheral's memory
    pub fn memory(&self, address: u8) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .peripherals
            .get(&address)
            .map(|peripheral| peripheral.memory.to_vec())
    }

    /// Reports the bus as held by another master for the next `reads` status reads
    pub fn hold_bus(&self, reads: usize) {
        self.state.borrow_mut().busy_reads = reads;
    }

    /// Leaves the next `count` address phases unacknowledged
    pub fn nack_next(&self, count: usize) {
        self.state.borrow_mut().nack_addresses = count;
    }

    /// Stops Done from ever being reported
    pub fn stall(&self, stalled: bool) {
        self.state.borrow_mut().stalled = stalled;
    }

    /// Returns the number of START conditions generated
    pub fn starts(&self) -> usize {
        self.state.borrow().starts
    }

    /// Returns the number of STOP conditions generated
    pub fn stops(&self) -> usize {
        self.state.borrow().stops
    }

    /// Returns the number of status register reads
    pub fn status_reads(&self) -> usize {
        self.state.borrow().status_reads
    }

    /// Returns every byte written to the data register, in order
    pub fn data_writes(&self) -> Vec<u8> {
        self.state.borrow().data_writes.clone()
    }

    /// Returns the clock register
    pub fn clock(&self) -> u32 {
        self.state.borrow().clock
    }

    /// Returns whether automatic ACK is enabled
    pub fn ack_enabled(&self) -> bool {
        self.state.borrow().control & ControlFlags::ACK.bits() != 0
    }

    /// Clears the counters and the data write log
    pub fn clear_counters(&self) {
        let mut state = self.state.borrow_mut();
        state.starts = 0;
        state.stops = 0;
        state.status_reads = 0;
        state.data_writes.clear();
    }
}

impl RegisterIo for SimulatedController {
    fn read32(&mut self, addr: usize) -> u32 {
        let mut state = self.state.borrow_mut();
        match addr.wrapping_sub(state.base) {
            STATUS => state.status(),
            CONTROL => state.control,
            DATA => state.read_data(),
            CLOCK => state.clock,
            _ => 0,
        }
    }

    fn write32(&mut self, addr: usize, value: u32) {
        let mut state = self.state.borrow_mut();
        match addr.wrapping_sub(state.base) {
            CONTROL => state.write_control(value),
            DATA => state.write_data(value),
            CLOCK => state.clock = value,
            _ => {}
        }
    }
}
