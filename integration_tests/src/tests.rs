//! Loopback test cases.

use std::time::Duration;

use colored::Colorize;
use serialport::{DataBits, Parity, StopBits};

use crate::device::BridgePort;

/// Serial backend the firmware was built with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Hardware,
    Software,
}

impl Variant {
    pub fn default_baud(self) -> u32 {
        match self {
            Variant::Hardware => 9600,
            Variant::Software => 4800,
        }
    }

    /// Rates the backend reaches within tolerance
    fn rates(self) -> &'static [u32] {
        match self {
            Variant::Hardware => &[1200, 2400, 4800, 9600, 19200, 38400, 57600],
            Variant::Software => &[1200, 2400, 4800],
        }
    }
}

/// Test result.
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub message: Option<String>,
}

impl TestResult {
    fn pass() -> Self {
        Self {
            name: String::new(),
            passed: true,
            message: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            passed: false,
            message: Some(message.into()),
        }
    }
}

/// Run a test function and print results as it happens.
fn run_test<F>(name: &str, bridge: &mut BridgePort, test_fn: F) -> TestResult
where
    F: FnOnce(&mut BridgePort) -> TestResult,
{
    print!("  {} ... ", name);
    std::io::Write::flush(&mut std::io::stdout()).ok();

    let mut result = test_fn(bridge);
    result.name = name.to_string();

    if result.passed {
        println!("{}", "PASS".green().bold());
    } else {
        println!("{}", "FAIL".red().bold());
        if let Some(msg) = &result.message {
            println!("    {}", msg.red());
        }
    }

    // Leave the next test a clean line at the default rate
    let _ = bridge.drain();

    result
}

/// Run all tests and return results.
pub fn run_all_tests(bridge: &mut BridgePort, variant: Variant) -> Vec<TestResult> {
    let mut results = Vec::new();

    results.push(run_test("Short string echoes", bridge, |b| {
        echo(b, variant.default_baud(), b"hello, bridge\r\n")
    }));
    results.push(run_test("All byte values echo", bridge, |b| {
        let data: Vec<u8> = (0..=255u8).collect();
        echo(b, variant.default_baud(), &data)
    }));
    results.push(run_test("Echo at every supported rate", bridge, |b| {
        test_rates(b, variant)
    }));
    results.push(run_test("Transfer larger than the buffers", bridge, |b| {
        test_bulk_transfer(b, variant)
    }));
    results.push(run_test("DTR toggling keeps the link", bridge, |b| {
        test_dtr_toggle(b, variant)
    }));
    if variant == Variant::Hardware {
        results.push(run_test("7E2 frames echo", bridge, test_seven_even_two));
    }

    results
}

/// Print test results summary.
pub fn print_results(results: &[TestResult]) {
    println!("\n{}", "=".repeat(60));
    println!("{}", "Test Results".bold());
    println!("{}", "=".repeat(60));

    let mut passed = 0;
    let mut failed = 0;

    for result in results {
        if result.passed {
            println!("  {} {}", "[PASS]".green().bold(), result.name);
            passed += 1;
        } else {
            println!("  {} {}", "[FAIL]".red().bold(), result.name);
            if let Some(msg) = &result.message {
                println!("         {}", msg.red());
            }
            failed += 1;
        }
    }

    println!("{}", "-".repeat(60));
    println!(
        "  Total: {} passed, {} failed",
        passed.to_string().green(),
        if failed > 0 {
            failed.to_string().red()
        } else {
            failed.to_string().normal()
        }
    );
    println!("{}", "=".repeat(60));
}

/// Time to move `len` bytes both ways at `baud`, with generous slack
fn transfer_timeout(len: usize, baud: u32) -> Duration {
    let bits = (len as u64 + 64) * 10 * 3;
    Duration::from_millis(500 + bits * 1000 / baud as u64)
}

/// First mismatch between what was sent and what came back
fn compare(sent: &[u8], echoed: &[u8]) -> Option<String> {
    if let Some(i) = sent.iter().zip(echoed).position(|(a, b)| a != b) {
        return Some(format!(
            "byte {} differs: sent 0x{:02x}, got 0x{:02x}",
            i, sent[i], echoed[i]
        ));
    }
    if echoed.len() != sent.len() {
        return Some(format!(
            "sent {} bytes, got {} back",
            sent.len(),
            echoed.len()
        ));
    }
    None
}

fn echo(bridge: &mut BridgePort, baud: u32, data: &[u8]) -> TestResult {
    if let Err(e) = bridge.set_baud(baud) {
        return TestResult::fail(format!("Error setting {} baud: {}", baud, e));
    }
    match bridge.round_trip(data, transfer_timeout(data.len(), baud)) {
        Ok(echoed) => match compare(data, &echoed) {
            None => TestResult::pass(),
            Some(msg) => TestResult::fail(format!("at {} baud: {}", baud, msg)),
        },
        Err(e) => TestResult::fail(format!("Error: {}", e)),
    }
}

// --- Individual Tests ---

fn test_rates(bridge: &mut BridgePort, variant: Variant) -> TestResult {
    let pattern: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(37) ^ 0x5A).collect();
    for &baud in variant.rates() {
        let result = echo(bridge, baud, &pattern);
        if !result.passed {
            return result;
        }
        print!("{} ", baud);
        std::io::Write::flush(&mut std::io::stdout()).ok();
    }
    // Back to the rate the other tests expect
    echo(bridge, variant.default_baud(), b"ok")
}

fn test_bulk_transfer(bridge: &mut BridgePort, variant: Variant) -> TestResult {
    // Several times the outbound buffer, so both RTS/CTS and the OUT gate engage
    let data: Vec<u8> = (0..1024u32).map(|i| (i * 7 + i / 256) as u8).collect();
    echo(bridge, variant.default_baud(), &data)
}

fn test_dtr_toggle(bridge: &mut BridgePort, variant: Variant) -> TestResult {
    for (i, asserted) in [false, true, false, true].into_iter().enumerate() {
        if let Err(e) = bridge.set_dtr(asserted) {
            return TestResult::fail(format!("Error setting DTR: {}", e));
        }
        let result = echo(bridge, variant.default_baud(), &[b'0' + i as u8; 8]);
        if !result.passed {
            return result;
        }
    }
    TestResult::pass()
}

fn test_seven_even_two(bridge: &mut BridgePort) -> TestResult {
    if let Err(e) = bridge.set_line_coding(9600, DataBits::Seven, Parity::Even, StopBits::Two) {
        return TestResult::fail(format!("Error setting 7E2: {}", e));
    }
    // Only the low seven bits survive a 7-bit frame
    let data: Vec<u8> = b"Seven bit text 0123456789".to_vec();
    let result = match bridge.round_trip(&data, transfer_timeout(data.len(), 9600)) {
        Ok(echoed) => match compare(&data, &echoed) {
            None => TestResult::pass(),
            Some(msg) => TestResult::fail(msg),
        },
        Err(e) => TestResult::fail(format!("Error: {}", e)),
    };
    if let Err(e) = bridge.set_baud(9600) {
        return TestResult::fail(format!("Error restoring 8N1: {}", e));
    }
    result
}
