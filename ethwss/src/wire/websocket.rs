//! The WebSocket frame header of RFC 6455.
use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

use super::{Error, Result};

enum_with_unknown! {
    /// The frame opcode.
    pub enum OpCode(u8) {
        Continuation = 0x0,
        Text = 0x1,
        Binary = 0x2,
        Close = 0x8,
        Ping = 0x9,
        Pong = 0xa,
    }
}

impl OpCode {
    /// The largest opcode value we accept from a peer.
    pub const MAX_VALID: u8 = 0xa;

    /// If this is a control frame (close, ping or pong).
    pub fn is_control(self) -> bool {
        u8::from(self) & 0x8 != 0
    }
}

/// The three encodings of the payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    /// The 7-bit length field holds the length itself.
    Base,
    /// The 7-bit field is 126 and a 16-bit length follows.
    Extended16,
    /// The 7-bit field is 127 and a 64-bit length follows.
    Extended64,
}

impl SizeClass {
    const MARKER_16: u8 = 126;
    const MARKER_64: u8 = 127;

    /// The smallest encoding able to express a payload length.
    pub fn for_len(len: u64) -> Self {
        if len <= 125 {
            SizeClass::Base
        } else if len <= u64::from(u16::max_value()) {
            SizeClass::Extended16
        } else {
            SizeClass::Extended64
        }
    }

    fn from_marker(len7: u8) -> Self {
        match len7 {
            Self::MARKER_16 => SizeClass::Extended16,
            Self::MARKER_64 => SizeClass::Extended64,
            _ => SizeClass::Base,
        }
    }

    /// The length of an unmasked header in this class.
    pub fn header_len(self) -> usize {
        match self {
            SizeClass::Base => 2,
            SizeClass::Extended16 => 4,
            SizeClass::Extended64 => 10,
        }
    }
}

/// The length of a masking key.
pub const MASK_LEN: usize = 4;

byte_wrapper! {
    /// A byte sequence starting with a WebSocket frame.
    #[derive(Debug, PartialEq, Eq)]
    pub struct frame([u8]);
}

mod field {
    pub(crate) const FLAGS: usize = 0;
    pub(crate) const LENGTH: usize = 1;
    pub(crate) const EXTENDED: usize = 2;

    pub(crate) const FIN: u8 = 0x80;
    pub(crate) const RSV1: u8 = 0x40;
    pub(crate) const RSV2: u8 = 0x20;
    pub(crate) const RSV3: u8 = 0x10;
    pub(crate) const OPCODE: u8 = 0x0f;
    pub(crate) const MASK: u8 = 0x80;
    pub(crate) const LEN7: u8 = 0x7f;
}

impl frame {
    /// Imbue a raw octet buffer with frame structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with frame structure.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        let frm = Self::new_unchecked(data);
        frm.check_len()?;
        Ok(frm)
    }

    /// Ensure the complete header is present.
    ///
    /// The payload is not required, its length is only known after the header was read.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < 2 || self.0.len() < self.header_len() {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// The final fragment flag.
    pub fn fin(&self) -> bool {
        self.0[field::FLAGS] & field::FIN != 0
    }

    /// The three reserved bits, as `(rsv1, rsv2, rsv3)`.
    pub fn reserved(&self) -> (bool, bool, bool) {
        let flags = self.0[field::FLAGS];
        (flags & field::RSV1 != 0, flags & field::RSV2 != 0, flags & field::RSV3 != 0)
    }

    /// The opcode.
    pub fn opcode(&self) -> OpCode {
        OpCode::from(self.0[field::FLAGS] & field::OPCODE)
    }

    /// Whether a masking key is present.
    pub fn is_masked(&self) -> bool {
        self.0[field::LENGTH] & field::MASK != 0
    }

    /// The size class selected by the 7-bit length field.
    pub fn size_class(&self) -> SizeClass {
        SizeClass::from_marker(self.0[field::LENGTH] & field::LEN7)
    }

    /// The header length, including the masking key.
    pub fn header_len(&self) -> usize {
        let mask = if self.is_masked() { MASK_LEN } else { 0 };
        self.size_class().header_len() + mask
    }

    /// The payload length, resolved through the extended fields.
    pub fn payload_len(&self) -> u64 {
        match self.size_class() {
            SizeClass::Base => u64::from(self.0[field::LENGTH] & field::LEN7),
            SizeClass::Extended16 => {
                u64::from(NetworkEndian::read_u16(&self.0[field::EXTENDED..]))
            },
            SizeClass::Extended64 => NetworkEndian::read_u64(&self.0[field::EXTENDED..]),
        }
    }

    /// The masking key, if present.
    pub fn masking_key(&self) -> Option<[u8; MASK_LEN]> {
        if !self.is_masked() {
            return None;
        }
        let start = self.size_class().header_len();
        let mut key = [0; MASK_LEN];
        key.copy_from_slice(&self.0[start..start + MASK_LEN]);
        Some(key)
    }

    /// The payload bytes that are present, possibly fewer than `payload_len`.
    pub fn payload_slice(&self) -> &[u8] {
        &self.0[self.header_len()..]
    }

    /// Set the first byte: fin, reserved bits and opcode.
    pub fn set_flags(&mut self, fin: bool, reserved: (bool, bool, bool), opcode: OpCode) {
        let mut flags = u8::from(opcode) & field::OPCODE;
        if fin { flags |= field::FIN; }
        if reserved.0 { flags |= field::RSV1; }
        if reserved.1 { flags |= field::RSV2; }
        if reserved.2 { flags |= field::RSV3; }
        self.0[field::FLAGS] = flags;
    }

    /// Set the mask bit and payload length in the given encoding.
    ///
    /// The class must be able to express `len`, a `Base` length above 125 is truncated.
    pub fn set_mask_and_len(&mut self, masked: bool, class: SizeClass, len: u64) {
        let mask = if masked { field::MASK } else { 0 };
        match class {
            SizeClass::Base => self.0[field::LENGTH] = mask | (len as u8 & field::LEN7),
            SizeClass::Extended16 => {
                self.0[field::LENGTH] = mask | SizeClass::MARKER_16;
                NetworkEndian::write_u16(&mut self.0[field::EXTENDED..], len as u16);
            },
            SizeClass::Extended64 => {
                self.0[field::LENGTH] = mask | SizeClass::MARKER_64;
                NetworkEndian::write_u64(&mut self.0[field::EXTENDED..], len);
            },
        }
    }

    /// Set the masking key, after the length has been set.
    pub fn set_masking_key(&mut self, key: [u8; MASK_LEN]) {
        let start = self.size_class().header_len();
        self.0[start..start + MASK_LEN].copy_from_slice(&key);
    }
}

/// A high-level representation of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Whether this is the final fragment of a message.
    pub fin: bool,
    /// Reserved bits for extensions.
    pub reserved: (bool, bool, bool),
    /// The frame opcode.
    pub opcode: OpCode,
    /// The masking key applied to the payload.
    pub mask: Option<[u8; MASK_LEN]>,
    /// The length of the payload following the header.
    pub payload_len: u64,
    /// The encoding of the payload length.
    ///
    /// Peers may use a wider encoding than needed, the header length follows this field.
    pub size_class: SizeClass,
}

impl FrameHeader {
    /// A final, unmasked frame with the smallest length encoding.
    pub fn new(opcode: OpCode, payload_len: u64) -> Self {
        FrameHeader {
            fin: true,
            reserved: (false, false, false),
            opcode,
            mask: None,
            payload_len,
            size_class: SizeClass::for_len(payload_len),
        }
    }

    /// Parse the header at the start of a frame.
    ///
    /// A 64-bit length with the most significant bit set is `Malformed`.
    pub fn parse(frm: &frame) -> Result<Self> {
        frm.check_len()?;
        let payload_len = frm.payload_len();
        if payload_len >> 63 != 0 {
            return Err(Error::Malformed);
        }
        Ok(FrameHeader {
            fin: frm.fin(),
            reserved: frm.reserved(),
            opcode: frm.opcode(),
            mask: frm.masking_key(),
            payload_len,
            size_class: frm.size_class(),
        })
    }

    /// The length of the header, including the masking key.
    pub fn header_len(&self) -> usize {
        let mask = if self.mask.is_some() { MASK_LEN } else { 0 };
        self.size_class.header_len() + mask
    }

    /// Header and payload together.
    pub fn frame_len(&self) -> u64 {
        self.header_len() as u64 + self.payload_len
    }

    /// Emit the header into the start of a frame.
    pub fn emit(&self, frm: &mut frame) {
        frm.set_flags(self.fin, self.reserved, self.opcode);
        frm.set_mask_and_len(self.mask.is_some(), self.size_class, self.payload_len);
        if let Some(key) = self.mask {
            frm.set_masking_key(key);
        }
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "WS op={:?} fin={} len={}", self.opcode, self.fin, self.payload_len)?;
        if self.mask.is_some() {
            write!(f, " masked")?;
        }
        Ok(())
    }
}

/// Mask or unmask a payload in place.
///
/// The operation is its own inverse. `offset` is the position of `payload[0]` within the frame
/// payload, for callers that process it in pieces.
pub fn apply_mask(key: [u8; MASK_LEN], offset: usize, payload: &mut [u8]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[(offset + i) % MASK_LEN];
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[rustfmt::skip]
    static TEXT_FRAME: [u8; 7] = [
        0x81, 0x05,
        b'h', b'e', b'l', b'l', b'o',
    ];

    #[rustfmt::skip]
    static MASKED_FRAME: [u8; 11] = [
        0x81, 0x85,
        0x37, 0xfa, 0x21, 0x3d,
        0x7f, 0x9f, 0x4d, 0x51, 0x58,
    ];

    #[test]
    fn test_deconstruct() {
        let frm = frame::new_checked(&TEXT_FRAME[..]).unwrap();
        assert!(frm.fin());
        assert_eq!(frm.opcode(), OpCode::Text);
        assert!(!frm.is_masked());
        assert_eq!(frm.size_class(), SizeClass::Base);
        assert_eq!(frm.payload_len(), 5);
        assert_eq!(frm.payload_slice(), b"hello");
        assert_eq!(FrameHeader::parse(frm), Ok(FrameHeader::new(OpCode::Text, 5)));
    }

    #[test]
    fn test_masked() {
        let frm = frame::new_checked(&MASKED_FRAME[..]).unwrap();
        let header = FrameHeader::parse(frm).unwrap();
        assert_eq!(header.mask, Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(header.header_len(), 6);
        let mut payload = frm.payload_slice().to_vec();
        apply_mask(header.mask.unwrap(), 0, &mut payload);
        assert_eq!(&payload, b"Hello");
    }

    #[test]
    fn test_construct() {
        let header = FrameHeader::new(OpCode::Text, 5);
        let mut bytes = vec![0xa5; 7];
        header.emit(frame::new_unchecked_mut(&mut bytes));
        bytes[2..].copy_from_slice(b"hello");
        assert_eq!(&bytes[..], &TEXT_FRAME[..]);
    }

    #[test]
    fn test_size_classes() {
        assert_eq!(SizeClass::for_len(10), SizeClass::Base);
        assert_eq!(SizeClass::for_len(125), SizeClass::Base);
        assert_eq!(SizeClass::for_len(126), SizeClass::Extended16);
        assert_eq!(SizeClass::for_len(200), SizeClass::Extended16);
        assert_eq!(SizeClass::for_len(65535), SizeClass::Extended16);
        assert_eq!(SizeClass::for_len(65536), SizeClass::Extended64);

        assert_eq!(FrameHeader::new(OpCode::Binary, 10).header_len(), 2);
        assert_eq!(FrameHeader::new(OpCode::Binary, 200).header_len(), 4);
        assert_eq!(FrameHeader::new(OpCode::Binary, 70000).header_len(), 10);

        let mut masked = FrameHeader::new(OpCode::Binary, 200);
        masked.mask = Some([1, 2, 3, 4]);
        assert_eq!(masked.header_len(), 8);
    }

    #[test]
    fn test_extended16() {
        let header = FrameHeader::new(OpCode::Binary, 200);
        let mut bytes = vec![0; 4];
        header.emit(frame::new_unchecked_mut(&mut bytes));
        assert_eq!(bytes, [0x82, 126, 0x00, 0xc8]);
        let frm = frame::new_checked(&bytes).unwrap();
        assert_eq!(frm.size_class(), SizeClass::Extended16);
        assert_eq!(FrameHeader::parse(frm), Ok(header));
    }

    #[test]
    fn test_extended64() {
        let header = FrameHeader::new(OpCode::Binary, 0x1_0000);
        let mut bytes = vec![0; 10];
        header.emit(frame::new_unchecked_mut(&mut bytes));
        assert_eq!(bytes, [0x82, 127, 0, 0, 0, 0, 0, 0x01, 0x00, 0x00]);
        assert_eq!(FrameHeader::parse(frame::new_unchecked(&bytes)), Ok(header));

        bytes[2] = 0x80;
        assert_eq!(FrameHeader::parse(frame::new_unchecked(&bytes)), Err(Error::Malformed));
    }

    #[test]
    fn test_wide_length_encoding() {
        #[rustfmt::skip]
        let extended16 = [
            0x82, 126, 0x00, 0x03,
            b'a', b'b', b'c',
        ];
        let frm = frame::new_checked(&extended16[..]).unwrap();
        let header = FrameHeader::parse(frm).unwrap();
        assert_eq!(header.size_class, SizeClass::Extended16);
        assert_eq!(header.payload_len, 3);
        assert_eq!(header.header_len(), 4);
        assert_eq!(header.header_len(), frm.header_len());

        #[rustfmt::skip]
        let extended64 = [
            0x82, 0xff, 0, 0, 0, 0, 0, 0, 0, 0x03,
            0x01, 0x02, 0x03, 0x04,
            b'a' ^ 0x01, b'b' ^ 0x02, b'c' ^ 0x03,
        ];
        let frm = frame::new_checked(&extended64[..]).unwrap();
        let header = FrameHeader::parse(frm).unwrap();
        assert_eq!(header.size_class, SizeClass::Extended64);
        assert_eq!(header.mask, Some([1, 2, 3, 4]));
        assert_eq!(header.header_len(), 14);
        assert_eq!(header.frame_len(), 17);

        let mut bytes = vec![0; 14];
        header.emit(frame::new_unchecked_mut(&mut bytes));
        assert_eq!(&bytes[..], &extended64[..14]);
    }

    #[test]
    fn test_truncated() {
        assert_eq!(frame::new_checked(&[0x81]).err(), Some(Error::Truncated));
        assert_eq!(frame::new_checked(&[0x82, 126, 0x00]).err(), Some(Error::Truncated));
        assert_eq!(frame::new_checked(&MASKED_FRAME[..5]).err(), Some(Error::Truncated));
        // The payload is not part of the length check.
        assert!(frame::new_checked(&TEXT_FRAME[..2]).is_ok());
    }

    #[test]
    fn test_opcodes() {
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Close.is_control());
        assert!(!OpCode::Text.is_control());
        assert_eq!(OpCode::from(0x3), OpCode::Unknown(0x3));
        assert_eq!(u8::from(OpCode::Pong), OpCode::MAX_VALID);
    }

    #[test]
    fn mask_in_pieces() {
        let key = [0xde, 0xad, 0xbe, 0xef];
        let mut whole = *b"websocket payload";
        apply_mask(key, 0, &mut whole);
        let mut pieces = *b"websocket payload";
        let (head, tail) = pieces.split_at_mut(7);
        apply_mask(key, 0, head);
        apply_mask(key, 7, tail);
        assert_eq!(whole, pieces);
    }
}
