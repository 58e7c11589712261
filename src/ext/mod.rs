use bytes::{Buf, BufMut, Bytes};

use crate::{common::ByteStr, postgres::ProtocolError};

/// Integer signess in postgres docs is awful.
pub trait UsizeExt {
    /// length is usize in rust, while postgres wants i32,
    /// this will panic when overflow instead of wrapping
    fn to_i32(self) -> i32;
}

impl UsizeExt for usize {
    fn to_i32(self) -> i32 {
        self.try_into().expect("message size too large for protocol")
    }
}

pub trait StrExt {
    /// postgres String must be nul terminated
    fn nul_string_len(&self) -> i32;
}

impl StrExt for str {
    fn nul_string_len(&self) -> i32 {
        self.len().to_i32() + 1/* nul */
    }
}

pub trait BufMutExt {
    /// postgres String must be nul terminated
    fn put_nul_string(&mut self, string: &str);
}

impl<B: BufMut> BufMutExt for B {
    fn put_nul_string(&mut self, string: &str) {
        self.put(string.as_bytes());
        self.put_u8(b'\0');
    }
}

pub trait BytesExt {
    /// Splits off the bytes up to the next nul terminator, consuming it.
    fn get_nul_bytes(&mut self) -> Result<Bytes, ProtocolError>;

    /// [`Self::get_nul_bytes`] checked as utf-8.
    fn get_nul_bytestr(&mut self) -> Result<ByteStr, ProtocolError>;
}

impl BytesExt for Bytes {
    fn get_nul_bytes(&mut self) -> Result<Bytes, ProtocolError> {
        let end = self
            .iter()
            .position(|e| matches!(e, b'\0'))
            .ok_or(ProtocolError::malformed("string missing nul terminator"))?;
        let me = self.split_to(end);
        Buf::advance(self, 1); // nul
        Ok(me)
    }

    fn get_nul_bytestr(&mut self) -> Result<ByteStr, ProtocolError> {
        ByteStr::from_utf8(self.get_nul_bytes()?)
            .map_err(|_| ProtocolError::malformed("string not valid utf-8"))
    }
}
