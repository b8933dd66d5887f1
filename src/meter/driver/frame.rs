use crc::{Crc, CRC_8_SMBUS};

pub const CRC_FRAME: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

pub const FRAME_LEN: usize = 5;

/// address byte meaning "nothing"
const NO_ADDR: u8 = 0xff;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CrcError {
    pub expected: u8,
    pub received: u8,
}

/// read address, write address, write value (LE), crc
pub fn encode_request(next_read_addr: Option<u8>, write: Option<(u8, u16)>) -> [u8; FRAME_LEN] {
    let mut buf = [0u8; FRAME_LEN];
    buf[0] = next_read_addr.unwrap_or(NO_ADDR);
    if let Some((addr, val)) = write {
        buf[1] = addr;
        buf[2..4].copy_from_slice(&val.to_le_bytes());
    } else {
        buf[1] = NO_ADDR;
    }
    buf[4] = CRC_FRAME.checksum(&buf[..4]);
    buf
}

pub fn decode_request(buf: &[u8; FRAME_LEN]) -> Result<(Option<u8>, Option<(u8, u16)>), CrcError> {
    check(buf)?;
    let read = (buf[0] != NO_ADDR).then_some(buf[0]);
    let write = (buf[1] != NO_ADDR).then(|| (buf[1], u16::from_le_bytes([buf[2], buf[3]])));
    Ok((read, write))
}

pub fn encode_response(value: u32) -> [u8; FRAME_LEN] {
    let mut buf = [0u8; FRAME_LEN];
    buf[..4].copy_from_slice(&value.to_le_bytes());
    buf[4] = CRC_FRAME.checksum(&buf[..4]);
    buf
}

pub fn decode_response(buf: &[u8; FRAME_LEN]) -> Result<u32, CrcError> {
    check(buf)?;
    let mut val = [0u8; 4];
    val.copy_from_slice(&buf[..4]);
    Ok(u32::from_le_bytes(val))
}

fn check(buf: &[u8; FRAME_LEN]) -> Result<(), CrcError> {
    let expected = CRC_FRAME.checksum(&buf[..4]);
    if expected != buf[4] {
        Err(CrcError {
            expected,
            received: buf[4],
        })
    } else {
        Ok(())
    }
}
