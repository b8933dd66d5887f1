use embassy_time::Timer;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::spi::SpiDevice;

use super::frame::{self, CrcError, FRAME_LEN};
use super::MeterDriver;

#[derive(Debug)]
pub enum SpiMeterError {
    Spi,
    Pin,
    CrcErrorRx { expected: u8, received: u8 },
}

impl From<CrcError> for SpiMeterError {
    fn from(e: CrcError) -> Self {
        SpiMeterError::CrcErrorRx {
            expected: e.expected,
            received: e.received,
        }
    }
}

/// One board on its own SPI device. Chip select is handled by the `SpiDevice`.
pub struct SpiMeterDriver<SPI, EN, SYN> {
    pub spi_device: SPI,
    pub pin_en: EN,
    pub pin_syn: SYN,
}

impl<SPI, EN, SYN> SpiMeterDriver<SPI, EN, SYN> {
    pub fn new(spi_device: SPI, pin_en: EN, pin_syn: SYN) -> Self {
        Self {
            spi_device,
            pin_en,
            pin_syn,
        }
    }
}

impl<SPI, EN, SYN> MeterDriver for SpiMeterDriver<SPI, EN, SYN>
where
    SPI: SpiDevice,
    EN: OutputPin,
    SYN: OutputPin,
{
    type Error = SpiMeterError;

    async fn transaction(
        &mut self,
        next_read_addr: Option<u8>,
        write: Option<(u8, u16)>,
    ) -> Result<u32, SpiMeterError> {
        let buf_tx = frame::encode_request(next_read_addr, write);
        let mut buf_rx = [0u8; FRAME_LEN];
        self.spi_device
            .transfer(&mut buf_rx, &buf_tx)
            .await
            .map_err(|_| SpiMeterError::Spi)?;
        Ok(frame::decode_response(&buf_rx)?)
    }

    async fn hardware_reset(&mut self) -> Result<(), Self::Error> {
        self.pin_syn.set_high().map_err(|_| SpiMeterError::Pin)?;
        self.pin_en.set_low().map_err(|_| SpiMeterError::Pin)?;
        Timer::after_millis(5).await;
        self.pin_en.set_high().map_err(|_| SpiMeterError::Pin)?;
        // startup time before the bus accepts frames
        Timer::after_millis(35).await;
        Ok(())
    }

    async fn latch(&mut self) -> Result<(), Self::Error> {
        // minimum pulse width and spacing are 4 us
        self.pin_syn.set_low().map_err(|_| SpiMeterError::Pin)?;
        Timer::after_micros(10).await;
        self.pin_syn.set_high().map_err(|_| SpiMeterError::Pin)?;
        Timer::after_micros(10).await;
        Ok(())
    }
}
