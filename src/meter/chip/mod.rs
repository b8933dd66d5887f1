mod registers;
pub use registers::Reg;

mod configuration;
pub use configuration::*;

use super::driver::MeterDriver;

const SOFT_RESET_KEY: u16 = 0x789A;
const CFG_UNLOCK_KEY: u16 = 0x55AA;
const CFG_LOCK_KEY: u16 = 0x0000;

#[derive(Debug)]
pub enum ConfigureError<E> {
    Bus(E),
    /// the board did not echo the last written value
    NoResponse,
}

impl<E> From<E> for ConfigureError<E> {
    fn from(e: E) -> Self {
        ConfigureError::Bus(e)
    }
}

pub struct Board<'a, D: MeterDriver> {
    pub driver: &'a mut D,
}

impl<'a, D: MeterDriver> Board<'a, D> {
    pub fn new(driver: &'a mut D) -> Self {
        Self { driver }
    }

    /// uses two driver transactions to read a register. for more efficient read access, use `read_registers`
    pub async fn read_register(&mut self, reg: Reg) -> Result<u32, D::Error> {
        self.driver.transaction(Some(reg.addr()), None).await?;
        self.driver.transaction(None, None).await
    }

    /// Pipelined read of a register table: every transaction selects the next
    /// register and returns the one selected before, so `n` registers take `n + 1`
    /// transactions. Reads `min(regs.len(), out.len())` registers.
    pub async fn read_registers(&mut self, regs: &[Reg], out: &mut [u32]) -> Result<(), D::Error> {
        self.read_table(regs, out, |raw| raw).await
    }

    /// like `read_registers`, for two's complement registers
    pub async fn read_registers_signed(&mut self, regs: &[Reg], out: &mut [i32]) -> Result<(), D::Error> {
        self.read_table(regs, out, |raw| raw as i32).await
    }

    async fn read_table<T>(&mut self, regs: &[Reg], out: &mut [T], convert: fn(u32) -> T) -> Result<(), D::Error> {
        let n = regs.len().min(out.len());
        if n == 0 {
            return Ok(());
        }
        // the first response belongs to whatever was selected before
        self.driver.transaction(Some(regs[0].addr()), None).await?;
        for i in 1..=n {
            let next = if i < n { Some(regs[i].addr()) } else { None };
            out[i - 1] = convert(self.driver.transaction(next, None).await?);
        }
        Ok(())
    }

    pub async fn write_register_16(&mut self, reg: Reg, value: u16) -> Result<(), D::Error> {
        self.driver.transaction(None, Some((reg.addr(), value))).await?;
        Ok(())
    }

    pub async fn configure(&mut self, config: &BoardConfiguration) -> Result<(), ConfigureError<D::Error>> {
        self.write_register_16(Reg::SOFT_RESET, SOFT_RESET_KEY).await?;
        self.write_register_16(Reg::CFG_ACCESS, CFG_UNLOCK_KEY).await?;
        self.write_register_16(Reg::METER_EN, 0x0001).await?;

        let last = self.read_register(Reg::LAST_DATA).await?;
        if last & 0xffff != 0x0001 {
            return Err(ConfigureError::NoResponse);
        }

        self.write_register_16(Reg::MMODE0, config.line_freq).await?;
        self.write_register_16(Reg::MMODE1, config.pga_gain).await?;
        for (reg, gain) in Reg::UGAIN.iter().zip(config.voltage_gain) {
            self.write_register_16(*reg, gain).await?;
        }
        for (reg, gain) in Reg::IGAIN.iter().zip(config.current_gain) {
            self.write_register_16(*reg, gain).await?;
        }
        self.write_register_16(Reg::CFG_ACCESS, CFG_LOCK_KEY).await?;

        Ok(())
    }
}
