//! Compile-time configuration for the CDC-UART bridge
//!
//! Board variants differ in buffer sizes, USB packet sizes and the clock
//! that feeds the baud generator. The firmware binary picks one profile via
//! the `soft-serial` cargo feature.

/// Clock configuration
pub mod clock {
    /// Nominal CPU clock the RC oscillator is trimmed towards (Hz)
    pub const F_CPU_HZ: u32 = 16_500_000;

    /// Clock feeding the UART divisor (double-speed mode divides by 8)
    pub const UART_DIVISOR_CLOCK_HZ: u32 = F_CPU_HZ >> 3;

    /// Clock feeding the bit timer of the software serial link (prescaler 64)
    pub const SOFT_TIMER_CLOCK_HZ: u32 = F_CPU_HZ >> 6;
}

/// Oscillator calibration constants
pub mod calibration {
    /// Persisted trim byte meaning "never calibrated"
    pub const TRIM_UNCALIBRATED: u8 = 0xFF;

    /// Reference-interval units counted per frame at 10.5 MHz
    pub const FRAME_UNITS_PER_10M5: u32 = 1499;

    /// Clock at which one frame measures exactly `FRAME_UNITS_PER_10M5`
    pub const FRAME_REFERENCE_CLOCK_HZ: u32 = 10_500_000;

    /// Split-range trial for oscillators with two 128-step halves
    pub const SPLIT_RANGE_TRIAL: u8 = 0x98;

    /// Default trim for the 12.8 MHz high-range oscillator
    pub const HIGH_RANGE_DEFAULT_TRIM: u8 = 232;

    /// Trim offset applied to the factory value when uncalibrated
    /// (8.00 MHz to 8.25 MHz)
    pub const DEFAULT_TRIM_OFFSET: u8 = 4;
}

/// USB device identity and endpoint sizing
pub mod usb {
    /// Vendor ID (shared VOTI CDC-ACM VID)
    pub const VID: u16 = 0x16C0;

    /// Product ID
    pub const PID: u16 = 0x05E1;

    /// Largest packet the USB glue ever moves in one transfer
    pub const MAX_PACKET_SIZE: usize = 64;

    /// Depth of the packet queues between USB task and bridge
    pub const PACKET_QUEUE_DEPTH: usize = 4;

    /// Length of the CDC line coding structure
    pub const LINE_CODING_LEN: usize = 7;
}

/// Board profiles
pub mod board {
    /// Sizing and defaults for one board variant
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BoardProfile {
        /// Inbound (serial -> USB) ring capacity, power of two
        pub inbound_capacity: usize,
        /// Outbound (USB -> serial) ring capacity, power of two
        pub outbound_capacity: usize,
        /// Bulk/interrupt IN packet size (device -> host)
        pub bulk_in: usize,
        /// Bulk OUT packet size (host -> device)
        pub bulk_out: usize,
        /// Baud rate used until the host sets a line coding
        pub default_baud: u32,
        /// Extra free bytes required before the OUT gate reopens
        pub out_headroom: usize,
        /// RTS deasserts when inbound free space drops below this
        pub rts_stop_free: usize,
        /// RTS reasserts once inbound free space reaches this
        pub rts_resume_free: usize,
    }

    /// Board with an on-chip UART peripheral
    pub const HARDWARE: BoardProfile = BoardProfile {
        inbound_capacity: 128,
        outbound_capacity: 256,
        bulk_in: 8,
        bulk_out: 8,
        default_baud: 9600,
        out_headroom: 0,
        rts_stop_free: 8,
        rts_resume_free: 16,
    };

    /// Board without a UART; the line is synthesized in software
    pub const SOFTWARE: BoardProfile = BoardProfile {
        inbound_capacity: 8,
        outbound_capacity: 128,
        bulk_in: 8,
        bulk_out: 2,
        // Maximum speed of the software link
        default_baud: 4800,
        out_headroom: 0,
        rts_stop_free: 1,
        rts_resume_free: 4,
    };

    /// Inbound capacity of the hardware profile, as a const generic
    pub const HARDWARE_INBOUND: usize = HARDWARE.inbound_capacity;
    /// Outbound capacity of the hardware profile, as a const generic
    pub const HARDWARE_OUTBOUND: usize = HARDWARE.outbound_capacity;
    /// Inbound capacity of the software profile, as a const generic
    pub const SOFTWARE_INBOUND: usize = SOFTWARE.inbound_capacity;
    /// Outbound capacity of the software profile, as a const generic
    pub const SOFTWARE_OUTBOUND: usize = SOFTWARE.outbound_capacity;
}

/// Software serial link tuning
pub mod soft_serial {
    /// Drive the line inverted (direct RS-232 levels through a resistor)
    pub const INVERT: bool = false;

    /// Slowest baud rate the 8-bit bit timer can represent
    pub const MIN_BAUD: u32 = 1200;

    /// Fastest baud rate the software link sustains
    pub const MAX_BAUD: u32 = 4800;
}
