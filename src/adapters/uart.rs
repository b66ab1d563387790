//! UART adapter for the SIM7670G link.
//!
//! Splits one ESP-IDF `UartDriver` into a receive half for the harvester
//! and a transmit half for the link token.  The driver's ISR fills its own
//! rx buffer; the harvester task drains it with a bounded wait.

use core::time::Duration;

use esp_idf_hal::delay::TickType;
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::uart::{config::Config, Uart, UartDriver, UartRxDriver, UartTxDriver};
use esp_idf_hal::units::Hertz;
use log::info;

use crate::app::ports::{LinkRx, LinkTx};
use crate::config::PipelineConfig;
use crate::error::{Error, LinkError, Result};

pub struct UartRx(UartRxDriver<'static>);

pub struct UartTx(UartTxDriver<'static>);

/// Open the modem UART on the configured pins and split it.
pub fn open(
    uart: impl Peripheral<P = impl Uart> + 'static,
    config: &PipelineConfig,
) -> Result<(UartRx, UartTx)> {
    // SAFETY: the pins are reserved for the modem link and not handed to
    // any other driver.
    let tx_pin = unsafe { AnyIOPin::new(i32::from(config.tx_pin)) };
    let rx_pin = unsafe { AnyIOPin::new(i32::from(config.rx_pin)) };

    let uart_config = Config::new().baudrate(Hertz(config.baud_rate));
    let driver = UartDriver::new(
        uart,
        tx_pin,
        rx_pin,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )
    .map_err(|_| Error::Init("UART driver install failed"))?;

    info!(
        "UART | baud={} tx=GPIO{} rx=GPIO{}",
        config.baud_rate, config.tx_pin, config.rx_pin
    );
    let (tx, rx) = driver.into_split();
    Ok((UartRx(rx), UartTx(tx)))
}

impl LinkRx for UartRx {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> core::result::Result<usize, LinkError> {
        self.0
            .read(buf, TickType::from(timeout).ticks())
            .map_err(|_| LinkError::Io)
    }
}

impl LinkTx for UartTx {
    fn write(&mut self, data: &[u8]) -> core::result::Result<usize, LinkError> {
        self.0.write(data).map_err(|_| LinkError::Io)
    }

    fn flush(&mut self) -> core::result::Result<(), LinkError> {
        self.0
            .wait_done(TickType::from(Duration::from_millis(100)).ticks())
            .map_err(|_| LinkError::Io)
    }
}
