//! Hardware seams for oscillator calibration
//!
//! The calibrator only needs to read and write the trim register, time one
//! USB frame, and keep one byte in non-volatile storage. Each of these is a
//! trait so the search can run against a simulated oscillator on the host.

/// Errors from the persisted trim byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Write did not complete
    WriteFailed,
    /// Storage is not available on this board
    Unavailable,
}

/// Oscillator with a writable frequency trim register
pub trait TrimmableOscillator {
    /// Current trim value
    fn trim(&self) -> u8;

    /// Apply a new trim value; takes effect immediately
    fn set_trim(&mut self, value: u8);
}

/// Timing reference provided by the USB transport
pub trait FrameReference {
    /// Measure one nominal 1 ms frame.
    ///
    /// The result is proportional to the oscillator cycles that elapsed
    /// between two start-of-frame markers.
    fn measure_reference_interval(&mut self) -> u16;
}

/// One byte of non-volatile storage holding the calibrated trim
pub trait TrimStore {
    /// Read the stored byte (`0xFF` when never written)
    fn load(&mut self) -> u8;

    /// Write the byte
    fn store(&mut self, value: u8) -> Result<(), StoreError>;
}

#[cfg(test)]
pub mod mock {
    //! Simulated RC oscillator and storage for testing

    use super::*;
    use core::cell::RefCell;

    /// Oscillator whose frame measurement is a function of the trim value
    pub struct SimOscillator<F: Fn(u8) -> u16> {
        trim: u8,
        response: F,
        /// Every trim value that was measured, in order
        trials: RefCell<Vec<u8>>,
        /// Measurements returned after this many trials are replaced
        corrupt_after: Option<(usize, u16)>,
    }

    impl<F: Fn(u8) -> u16> SimOscillator<F> {
        /// Create an oscillator starting at `trim`
        pub fn new(trim: u8, response: F) -> Self {
            Self {
                trim,
                response,
                trials: RefCell::new(Vec::new()),
                corrupt_after: None,
            }
        }

        /// Return `value` for every measurement after the first `count`
        pub fn corrupt_after(mut self, count: usize, value: u16) -> Self {
            self.corrupt_after = Some((count, value));
            self
        }

        /// Trim values measured so far
        pub fn trials(&self) -> Vec<u8> {
            self.trials.borrow().clone()
        }
    }

    impl<F: Fn(u8) -> u16> TrimmableOscillator for SimOscillator<F> {
        fn trim(&self) -> u8 {
            self.trim
        }

        fn set_trim(&mut self, value: u8) {
            self.trim = value;
        }
    }

    impl<F: Fn(u8) -> u16> FrameReference for SimOscillator<F> {
        fn measure_reference_interval(&mut self) -> u16 {
            let mut trials = self.trials.borrow_mut();
            trials.push(self.trim);
            match self.corrupt_after {
                Some((count, value)) if trials.len() > count => value,
                _ => (self.response)(self.trim),
            }
        }
    }

    /// In-memory trim byte that counts writes
    pub struct MockTrimStore {
        value: u8,
        writes: usize,
        fail_writes: bool,
    }

    impl MockTrimStore {
        /// Create a store holding `value`
        pub fn new(value: u8) -> Self {
            Self {
                value,
                writes: 0,
                fail_writes: false,
            }
        }

        /// Make every write fail
        pub fn failing(mut self) -> Self {
            self.fail_writes = true;
            self
        }

        /// Stored byte
        pub fn value(&self) -> u8 {
            self.value
        }

        /// Number of successful writes
        pub fn writes(&self) -> usize {
            self.writes
        }
    }

    impl TrimStore for MockTrimStore {
        fn load(&mut self) -> u8 {
            self.value
        }

        fn store(&mut self, value: u8) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::WriteFailed);
            }
            self.value = value;
            self.writes += 1;
            Ok(())
        }
    }
}
