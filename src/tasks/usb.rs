//! USB device task
//!
//! Runs the embassy-usb device state machine next to the two CDC ACM
//! pumps that feed [`UsbPipes`]. Class requests never reach this task;
//! the device's control handler answers them.

use embassy_futures::join::join3;
use embassy_usb::class::cdc_acm::{Receiver, Sender};
use embassy_usb::driver::Driver;
use embassy_usb::UsbDevice;

use crate::usb::cdc_io::{in_pump, out_pump};
use crate::usb::UsbPipes;

pub async fn usb_task<'d, D: Driver<'d>>(
    mut device: UsbDevice<'d, D>,
    sender: Sender<'d, D>,
    receiver: Receiver<'d, D>,
    pipes: &UsbPipes,
) {
    join3(
        device.run(),
        out_pump(receiver, pipes),
        in_pump(sender, pipes),
    )
    .await;
}
