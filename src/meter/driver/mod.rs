pub mod frame;
pub mod sim;
pub mod spi;

use core::fmt::Debug;

/// Bus to a single metering board.
///
/// Register access is pipelined: every transaction optionally writes one 16 bit
/// register half and selects the register to be returned by the *next* transaction.
/// The value returned belongs to the address selected by the previous transaction.
#[allow(async_fn_in_trait)]
pub trait MeterDriver {
    type Error: Debug;

    async fn transaction(
        &mut self,
        next_read_addr: Option<u8>,
        write: Option<(u8, u16)>,
    ) -> Result<u32, Self::Error>;

    /// power cycle the board and reset its bus interface, has to be followed by a
    /// full configuration
    async fn hardware_reset(&mut self) -> Result<(), Self::Error>;

    /// latch the instantaneous waveform registers of both metering ICs
    async fn latch(&mut self) -> Result<(), Self::Error>;
}
