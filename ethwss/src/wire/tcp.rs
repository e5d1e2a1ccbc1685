//! The TCP segment, its options and wrapping sequence numbers.
use core::{ops, cmp, fmt};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Checksum, Error, IpProtocol, Ipv4Address, Result};
use super::ipv4::checksum;

/// A TCP sequence number.
///
/// A sequence number is a monotonically advancing integer modulo 2<sup>32</sup>.
/// Sequence numbers do not have a discontiguity when compared pairwise across a signed overflow.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub i32);

impl SeqNumber {
    /// Reinterpret the on-wire unsigned value.
    pub fn from_u32(value: u32) -> Self {
        SeqNumber(value as i32)
    }

    /// The on-wire unsigned value.
    pub fn as_u32(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0 as u32)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        if rhs > i32::MAX as usize {
            panic!("attempt to add to sequence number with unsigned overflow")
        }
        SeqNumber(self.0.wrapping_add(rhs as i32))
    }
}

impl ops::Sub<usize> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: usize) -> SeqNumber {
        if rhs > i32::MAX as usize {
            panic!("attempt to subtract to sequence number with unsigned overflow")
        }
        SeqNumber(self.0.wrapping_sub(rhs as i32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl ops::Sub for SeqNumber {
    type Output = usize;

    fn sub(self, rhs: SeqNumber) -> usize {
        let result = self.0.wrapping_sub(rhs.0);
        if result < 0 {
            panic!("attempt to subtract sequence numbers with underflow")
        }
        result as usize
    }
}

impl cmp::PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &SeqNumber) -> Option<cmp::Ordering> {
        self.0.wrapping_sub(other.0).partial_cmp(&0)
    }
}

/// A set of tcp flags.
///
/// Only the low eight bits of the flag field, the NS bit is never used.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(pub u8);

impl Flags {
    /// No flags.
    pub const NONE: Flags = Flags(0x00);
    /// No more data from the sender.
    pub const FIN: Flags = Flags(0x01);
    /// Synchronize sequence numbers.
    pub const SYN: Flags = Flags(0x02);
    /// Reset the connection.
    pub const RST: Flags = Flags(0x04);
    /// Push buffered data to the application.
    pub const PSH: Flags = Flags(0x08);
    /// The acknowledgement field is significant.
    pub const ACK: Flags = Flags(0x10);
    /// The urgent pointer field is significant.
    pub const URG: Flags = Flags(0x20);
    /// ECN echo.
    pub const ECE: Flags = Flags(0x40);
    /// Congestion window reduced.
    pub const CWR: Flags = Flags(0x80);

    /// The second segment of a handshake.
    pub const SYN_ACK: Flags = Flags(0x12);
    /// Acknowledged end of stream.
    pub const FIN_ACK: Flags = Flags(0x11);
    /// Acknowledged reset.
    pub const RST_ACK: Flags = Flags(0x14);
    /// A data segment.
    pub const PSH_ACK: Flags = Flags(0x18);

    /// Test if all bits of `flag` are set.
    pub fn has_flag(self, flag: Flags) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// Return the FIN flag.
    #[inline]
    pub fn fin(self) -> bool {
        self.has_flag(Flags::FIN)
    }

    /// Return the SYN flag.
    #[inline]
    pub fn syn(self) -> bool {
        self.has_flag(Flags::SYN)
    }

    /// Return the RST flag.
    #[inline]
    pub fn rst(self) -> bool {
        self.has_flag(Flags::RST)
    }

    /// Return the PSH flag.
    #[inline]
    pub fn psh(self) -> bool {
        self.has_flag(Flags::PSH)
    }

    /// Return the ACK flag.
    #[inline]
    pub fn ack(self) -> bool {
        self.has_flag(Flags::ACK)
    }

    /// Return the length of a control flag, in terms of sequence space.
    pub fn sequence_len(self) -> usize {
        usize::from(self.syn()) + usize::from(self.fin())
    }
}

impl ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl ops::BitAnd for Flags {
    type Output = Flags;

    fn bitand(self, rhs: Flags) -> Flags {
        Flags(self.0 & rhs.0)
    }
}

impl ops::BitXor for Flags {
    type Output = Flags;

    fn bitxor(self, rhs: Flags) -> Flags {
        Flags(self.0 ^ rhs.0)
    }
}

impl ops::Not for Flags {
    type Output = Flags;

    fn not(self) -> Flags {
        Flags(!self.0)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Flags({:#04x} {})", self.0, self)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const NAMES: [(Flags, &str); 8] = [
            (Flags::SYN, "syn"), (Flags::ACK, "ack"), (Flags::FIN, "fin"), (Flags::RST, "rst"),
            (Flags::PSH, "psh"), (Flags::URG, "urg"), (Flags::ECE, "ece"), (Flags::CWR, "cwr"),
        ];

        let mut first = true;
        for &(flag, name) in NAMES.iter() {
            if self.has_flag(flag) {
                if !first { f.write_str("|")? }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

byte_wrapper! {
    /// A byte sequence representing a TCP segment.
    #[derive(Debug, PartialEq, Eq)]
    pub struct tcp([u8]);
}

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::Field;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const SEQ_NUM:  Field = 4..8;
    pub(crate) const ACK_NUM:  Field = 8..12;
    pub(crate) const OFFSET:   usize = 12;
    pub(crate) const FLAGS:    usize = 13;
    pub(crate) const WIN_SIZE: Field = 14..16;
    pub(crate) const CHECKSUM: Field = 16..18;
    pub(crate) const URGENT:   Field = 18..20;

    pub(crate) fn OPTIONS(length: u8) -> Field {
        URGENT.end..(length as usize)
    }

    pub(crate) const OPT_END: u8 = 0x00;
    pub(crate) const OPT_NOP: u8 = 0x01;
    pub(crate) const OPT_MSS: u8 = 0x02;
    pub(crate) const OPT_WS:  u8 = 0x03;
    pub(crate) const OPT_SACKPERM: u8 = 0x04;
}

impl tcp {
    /// The length of a header without options.
    pub const MIN_HEADER_LEN: usize = field::URGENT.end;

    /// Imbue a raw octet buffer with TCP segment structure.
    pub fn new_unchecked(buffer: &[u8]) -> &tcp {
        Self::__from_macro_new_unchecked(buffer)
    }

    /// Imbue a mutable octet buffer with TCP segment structure.
    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut tcp {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&tcp> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// Unwrap the segment as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no header accessor method will panic if called.
    /// Returns `Err(Error::Truncated)` if the buffer is too short.
    /// Returns `Err(Error::Malformed)` if the header length field has a value smaller
    /// than the minimal header length.
    ///
    /// The result of this check is invalidated by calling [set_header_len].
    ///
    /// [set_header_len]: #method.set_header_len
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < field::URGENT.end {
            Err(Error::Truncated)
        } else {
            let header_len = self.header_len() as usize;
            if len < header_len {
                Err(Error::Truncated)
            } else if header_len < field::URGENT.end {
                Err(Error::Malformed)
            } else {
                Ok(())
            }
        }
    }

    /// Return the source port field.
    #[inline]
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    /// Return the destination port field.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    /// Return the sequence number field.
    #[inline]
    pub fn seq_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.0[field::SEQ_NUM]))
    }

    /// Return the acknowledgement number field.
    #[inline]
    pub fn ack_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.0[field::ACK_NUM]))
    }

    /// Read all flags at once.
    #[inline]
    pub fn flags(&self) -> Flags {
        Flags(self.0[field::FLAGS])
    }

    /// Return the header length, in octets.
    #[inline]
    pub fn header_len(&self) -> u8 {
        (self.0[field::OFFSET] >> 4) * 4
    }

    /// Return the window size field.
    #[inline]
    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::WIN_SIZE])
    }

    /// Return the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the urgent pointer field.
    #[inline]
    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::URGENT])
    }

    /// Return the options.
    #[inline]
    pub fn options(&self) -> &[u8] {
        &self.0[field::OPTIONS(self.header_len())]
    }

    /// Return the payload.
    #[inline]
    pub fn payload_slice(&self) -> &[u8] {
        &self.0[usize::from(self.header_len())..]
    }

    /// Return the length of the segment, in terms of sequence space.
    pub fn sequence_len(&self) -> usize {
        self.payload_slice().len() + self.flags().sequence_len()
    }

    /// Validate the segment checksum against the IPv4 pseudo header.
    pub fn verify_checksum(&self, src_addr: Ipv4Address, dst_addr: Ipv4Address) -> bool {
        checksum::combine(&[
            checksum::pseudo_header(&src_addr, &dst_addr, IpProtocol::Tcp,
                                    self.0.len() as u32),
            checksum::data(&self.0)
        ]) == !0
    }

    /// Set the source port field.
    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::SRC_PORT], value)
    }

    /// Set the destination port field.
    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::DST_PORT], value)
    }

    /// Set the sequence number field.
    #[inline]
    pub fn set_seq_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.0[field::SEQ_NUM], value.0)
    }

    /// Set the acknowledgement number field.
    #[inline]
    pub fn set_ack_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.0[field::ACK_NUM], value.0)
    }

    /// Set a combination of flags.
    #[inline]
    pub fn set_flags(&mut self, Flags(flags): Flags) {
        self.0[field::FLAGS] = flags;
    }

    /// Set the header length, in octets.
    ///
    /// Also clears the reserved bits and the NS flag.
    #[inline]
    pub fn set_header_len(&mut self, value: u8) {
        self.0[field::OFFSET] = (value / 4) << 4;
    }

    /// Set the window size field.
    #[inline]
    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::WIN_SIZE], value)
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    /// Set the urgent pointer field.
    #[inline]
    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::URGENT], value)
    }

    /// Compute and fill in the checksum.
    ///
    /// Must be called once the payload has been written, the checksum covers all of it.
    pub fn fill_checksum(&mut self, src_addr: Ipv4Address, dst_addr: Ipv4Address) {
        self.set_checksum(0);
        let checksum = {
            !checksum::combine(&[
                checksum::pseudo_header(&src_addr, &dst_addr, IpProtocol::Tcp,
                                        self.0.len() as u32),
                checksum::data(&self.0)
            ])
        };
        self.set_checksum(checksum)
    }

    /// Return a mutable pointer to the options.
    #[inline]
    pub fn options_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len();
        &mut self.0[field::OPTIONS(header_len)]
    }

    /// Return a mutable pointer to the payload data.
    #[inline]
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let header_len = self.header_len() as usize;
        &mut self.0[header_len..]
    }
}

impl AsRef<[u8]> for tcp {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for tcp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP src={} dst={} {} seq={}",
               self.src_port(), self.dst_port(), self.flags(), self.seq_number())?;
        if self.flags().ack() {
            write!(f, " ack={}", self.ack_number())?;
        }
        write!(f, " win={} len={}", self.window_len(), self.payload_slice().len())
    }
}

/// A representation of a single TCP option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TcpOption<'a> {
    /// Terminates the option list, the rest is padding.
    EndOfList,
    /// A single byte of alignment.
    NoOperation,
    /// The largest segment the sender is willing to receive.
    MaxSegmentSize(u16),
    /// The shift applied to all window fields of the sender after the handshake.
    WindowScale(u8),
    /// The sender understands selective acknowledgements.
    SackPermitted,
    /// Any other option, skipped by its length.
    Unknown {
        /// The option kind byte.
        kind: u8,
        /// The option data, without kind and length.
        data: &'a [u8],
    }
}

impl<'a> TcpOption<'a> {
    /// Parse the option at the start of a buffer, returning the remaining buffer.
    ///
    /// An option whose length byte contradicts its kind, or that reaches past the end of the
    /// option space, is an error.
    pub fn parse(buffer: &'a [u8]) -> Result<(&'a [u8], TcpOption<'a>)> {
        let (length, option);
        match *buffer.get(0).ok_or(Error::Truncated)? {
            field::OPT_END => {
                length = 1;
                option = TcpOption::EndOfList;
            }
            field::OPT_NOP => {
                length = 1;
                option = TcpOption::NoOperation;
            }
            kind => {
                length = *buffer.get(1).ok_or(Error::Truncated)? as usize;
                if length < 2 {
                    return Err(Error::Malformed);
                }
                let data = buffer.get(2..length).ok_or(Error::Truncated)?;
                option = match (kind, length) {
                    (field::OPT_MSS, 4) =>
                        TcpOption::MaxSegmentSize(NetworkEndian::read_u16(data)),
                    (field::OPT_MSS, _) =>
                        return Err(Error::Malformed),
                    (field::OPT_WS, 3) =>
                        TcpOption::WindowScale(data[0]),
                    (field::OPT_WS, _) =>
                        return Err(Error::Malformed),
                    (field::OPT_SACKPERM, 2) =>
                        TcpOption::SackPermitted,
                    (field::OPT_SACKPERM, _) =>
                        return Err(Error::Malformed),
                    (_, _) =>
                        TcpOption::Unknown { kind, data },
                };
            }
        }
        Ok((&buffer[length..], option))
    }

    /// The number of bytes the option occupies when emitted.
    pub fn buffer_len(&self) -> usize {
        match self {
            TcpOption::EndOfList => 1,
            TcpOption::NoOperation => 1,
            TcpOption::MaxSegmentSize(_) => 4,
            TcpOption::WindowScale(_) => 3,
            TcpOption::SackPermitted => 2,
            TcpOption::Unknown { data, .. } => 2 + data.len()
        }
    }

    /// Write the option to the start of the buffer and return the rest.
    ///
    /// `EndOfList` fills the whole remaining buffer as padding.
    pub fn emit<'b>(&self, buffer: &'b mut [u8]) -> &'b mut [u8] {
        let length = self.buffer_len();
        match *self {
            TcpOption::EndOfList => {
                // There may be padding space which also should be initialized.
                for p in buffer.iter_mut() {
                    *p = field::OPT_END;
                }
            }
            TcpOption::NoOperation => {
                buffer[0] = field::OPT_NOP;
            }
            TcpOption::MaxSegmentSize(value) => {
                buffer[0] = field::OPT_MSS;
                buffer[1] = length as u8;
                NetworkEndian::write_u16(&mut buffer[2..4], value)
            }
            TcpOption::WindowScale(value) => {
                buffer[0] = field::OPT_WS;
                buffer[1] = length as u8;
                buffer[2] = value;
            }
            TcpOption::SackPermitted => {
                buffer[0] = field::OPT_SACKPERM;
                buffer[1] = length as u8;
            }
            TcpOption::Unknown { kind, data: provided } => {
                buffer[0] = kind;
                buffer[1] = length as u8;
                buffer[2..length].copy_from_slice(provided)
            }
        }
        &mut buffer[length..]
    }
}

/// A high-level representation of a Transmission Control Protocol segment header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    /// The sender port.
    pub src_port:     u16,
    /// The receiver port.
    pub dst_port:     u16,
    /// Control flags. The ACK bit is derived from `ack_number` when emitting.
    pub flags:        Flags,
    /// Sequence number of the first byte of the segment.
    pub seq_number:   SeqNumber,
    /// The acknowledgement number if the ACK flag is set.
    pub ack_number:   Option<SeqNumber>,
    /// Advertised window, before scaling.
    pub window_len:   u16,
    /// A window scale option.
    pub window_scale: Option<u8>,
    /// A maximum segment size option.
    pub max_seg_size: Option<u16>,
    /// A selective acknowledgement permitted option.
    pub sack_permitted: bool,
    /// The number of payload bytes following the header.
    pub payload_len:  usize,
}

impl Repr {
    /// Parse a Transmission Control Protocol segment and return a high-level representation.
    ///
    /// The addresses are those of the enclosing IPv4 packet, needed for the pseudo header of the
    /// checksum.
    pub fn parse(
        packet: &tcp,
        src_addr: Ipv4Address,
        dst_addr: Ipv4Address,
        checksum: Checksum,
    ) -> Result<Repr> {
        packet.check_len()?;
        // Source and destination ports must be present.
        if packet.src_port() == 0 { return Err(Error::Malformed) }
        if packet.dst_port() == 0 { return Err(Error::Malformed) }

        // Valid checksum may be expected.
        if checksum.manual() && !packet.verify_checksum(src_addr, dst_addr) {
            return Err(Error::WrongChecksum)
        }

        let flags = packet.flags();
        let ack_number = if flags.ack() {
            Some(packet.ack_number())
        } else {
            None
        };

        let mut max_seg_size = None;
        let mut window_scale = None;
        let mut sack_permitted = false;
        let mut options = packet.options();
        while !options.is_empty() {
            let (next_options, option) = TcpOption::parse(options)?;
            match option {
                TcpOption::EndOfList => break,
                TcpOption::NoOperation => (),
                TcpOption::MaxSegmentSize(value) =>
                    max_seg_size = Some(value),
                TcpOption::WindowScale(value) => {
                    // RFC 1323: If a Window Scale option is received with a shift.cnt value
                    // exceeding 14, the TCP should log the error but use 14 instead.
                    window_scale = if value > 14 {
                        net_debug!("parsed window scaling factor {} >14, setting to 14", value);
                        Some(14)
                    } else {
                        Some(value)
                    };
                },
                TcpOption::SackPermitted =>
                    sack_permitted = true,
                TcpOption::Unknown { .. } => (),
            }
            options = next_options;
        }

        Ok(Repr {
            src_port:     packet.src_port(),
            dst_port:     packet.dst_port(),
            flags,
            seq_number:   packet.seq_number(),
            ack_number,
            window_len:   packet.window_len(),
            window_scale,
            max_seg_size,
            sack_permitted,
            payload_len:  packet.payload_slice().len(),
        })
    }

    /// Return the length of a header that will be emitted from this high-level representation.
    ///
    /// This should be used for buffer space calculations.
    /// The TCP header length is a multiple of 4.
    pub fn header_len(&self) -> usize {
        let mut length = field::URGENT.end;
        if self.max_seg_size.is_some() {
            length += 4
        }
        if self.window_scale.is_some() {
            length += 3
        }
        if self.sack_permitted {
            length += 2;
        }
        if length % 4 != 0 {
            length += 4 - length % 4;
        }
        length
    }

    /// Return the length of a segment that will be emitted from this high-level representation.
    pub fn buffer_len(&self) -> usize {
        self.header_len() + self.payload_len
    }

    /// Emit a high-level representation into a Transmission Control Protocol segment.
    ///
    /// Options are written in the order MSS, SACK permitted, window scale and padded with
    /// end-of-list bytes. The checksum is not filled since the payload is usually written
    /// afterwards, see [`tcp::fill_checksum`].
    ///
    /// [`tcp::fill_checksum`]: struct.tcp.html#method.fill_checksum
    pub fn emit(&self, packet: &mut tcp) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_seq_number(self.seq_number);
        packet.set_ack_number(self.ack_number.unwrap_or_default());
        packet.set_window_len(self.window_len);
        packet.set_header_len(self.header_len() as u8);
        let flags = if self.ack_number.is_some() {
            self.flags | Flags::ACK
        } else {
            self.flags & !Flags::ACK
        };
        packet.set_flags(flags);
        {
            let mut options = packet.options_mut();
            if let Some(value) = self.max_seg_size {
                let tmp = options; options = TcpOption::MaxSegmentSize(value).emit(tmp);
            }
            if self.sack_permitted {
                let tmp = options; options = TcpOption::SackPermitted.emit(tmp);
            }
            if let Some(value) = self.window_scale {
                let tmp = options; options = TcpOption::WindowScale(value).emit(tmp);
            }
            if !options.is_empty() {
                TcpOption::EndOfList.emit(options);
            }
        }
        packet.set_checksum(0);
        packet.set_urgent_at(0);
    }

    /// Return the length of the segment, in terms of sequence space.
    pub fn sequence_len(&self) -> usize {
        self.payload_len + self.flags.sequence_len()
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP src={} dst={} {} seq={}",
               self.src_port, self.dst_port, self.flags, self.seq_number)?;
        if let Some(ack_number) = self.ack_number {
            write!(f, " ack={}", ack_number)?;
        }
        write!(f, " win={}", self.window_len)?;
        write!(f, " len={}", self.payload_len)?;
        if let Some(max_seg_size) = self.max_seg_size {
            write!(f, " mss={}", max_seg_size)?;
        }
        if let Some(window_scale) = self.window_scale {
            write!(f, " ws={}", window_scale)?;
        }
        Ok(())
    }
}
