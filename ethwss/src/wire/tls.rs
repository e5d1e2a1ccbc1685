//! The TLS 1.2 record and handshake formats.
//!
//! Only the subset spoken by a client offering `TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256` over
//! X25519 is covered. Records and handshake messages are byte wrappers like the packet formats.
//! The server messages are parsed from complete handshake bodies into borrowed structs, the
//! client messages are emitted directly into a transmit buffer.
use core::fmt;

use super::{Be, Error, Result, U24};

enum_with_unknown! {
    /// The content type of a record.
    pub enum ContentType(u8) {
        ChangeCipherSpec = 0x14,
        Alert = 0x15,
        Handshake = 0x16,
        ApplicationData = 0x17,
    }
}

enum_with_unknown! {
    /// The type of a handshake message.
    pub enum HandshakeType(u8) {
        HelloRequest = 0x00,
        ClientHello = 0x01,
        ServerHello = 0x02,
        Certificate = 0x0b,
        ServerKeyExchange = 0x0c,
        CertificateRequest = 0x0d,
        ServerHelloDone = 0x0e,
        ClientKeyExchange = 0x10,
        Finished = 0x14,
    }
}

enum_with_unknown! {
    /// A cipher suite identifier.
    pub enum CipherSuite(u16) {
        EcdheRsaWithAes128GcmSha256 = 0xc02f,
    }
}

enum_with_unknown! {
    /// A hello extension identifier.
    pub enum ExtensionType(u16) {
        ServerName = 0x0000,
        SupportedGroups = 0x000a,
        SignatureAlgorithms = 0x000d,
        ExtendedMasterSecret = 0x0017,
        RenegotiationInfo = 0xff01,
    }
}

enum_with_unknown! {
    /// A named elliptic curve group.
    pub enum NamedGroup(u16) {
        X25519 = 0x001d,
    }
}

enum_with_unknown! {
    /// The severity of an alert.
    pub enum AlertLevel(u8) {
        Warning = 1,
        Fatal = 2,
    }
}

enum_with_unknown! {
    /// The reason of an alert.
    pub enum AlertDescription(u8) {
        CloseNotify = 0,
        UnexpectedMessage = 10,
        BadRecordMac = 20,
        RecordOverflow = 22,
        HandshakeFailure = 40,
        BadCertificate = 42,
        IllegalParameter = 47,
        DecodeError = 50,
        DecryptError = 51,
        ProtocolVersion = 70,
        InternalError = 80,
    }
}

/// A protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major version byte.
    pub major: u8,
    /// Minor version byte.
    pub minor: u8,
}

impl Version {
    /// TLS 1.2
    pub const TLS_1_2: Version = Version { major: 3, minor: 3 };

    /// The wire representation.
    pub fn to_bytes(self) -> [u8; 2] {
        [self.major, self.minor]
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The size of a record header.
pub const RECORD_HEADER_LEN: usize = 5;
/// The size of a handshake message header.
pub const HANDSHAKE_HEADER_LEN: usize = 4;
/// The largest plaintext fragment a record may carry.
pub const MAX_FRAGMENT_LEN: usize = 1 << 14;
/// The explicit part of an AES-GCM nonce, sent in front of each protected record.
pub const EXPLICIT_NONCE_LEN: usize = 8;
/// The implicit part of an AES-GCM nonce, derived from the key block.
pub const FIXED_IV_LEN: usize = 4;
/// The authentication tag of AES-GCM.
pub const TAG_LEN: usize = 16;
/// Bytes added to a plaintext by record protection.
pub const PROTECTION_OVERHEAD: usize = EXPLICIT_NONCE_LEN + TAG_LEN;
/// The length of client and server random values.
pub const RANDOM_LEN: usize = 32;
/// The length of the verify data in a Finished message.
pub const VERIFY_DATA_LEN: usize = 12;
/// The length of an X25519 public key.
pub const X25519_KEY_LEN: usize = 32;

byte_wrapper! {
    /// A byte sequence starting with a TLS record.
    #[derive(Debug, PartialEq, Eq)]
    pub struct record([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const CONTENT_TYPE: usize = 0;
    pub(crate) const VERSION: Field = 1..3;
    pub(crate) const LENGTH: usize = 3;
    pub(crate) const FRAGMENT: usize = 5;

    pub(crate) const MSG_TYPE: usize = 0;
    pub(crate) const MSG_LENGTH: usize = 1;
    pub(crate) const BODY: usize = 4;
}

impl record {
    /// Imbue a raw octet buffer with record structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with record structure.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        let rec = Self::new_unchecked(data);
        rec.check_len()?;
        Ok(rec)
    }

    /// Ensure the header and the complete fragment are present.
    ///
    /// Returns `Err(Error::Truncated)` while the record has not fully arrived. Trailing bytes of
    /// further records are allowed.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < RECORD_HEADER_LEN {
            return Err(Error::Truncated);
        }
        if self.0.len() < self.record_len() {
            return Err(Error::Truncated);
        }
        Ok(())
    }

    /// The content type field.
    pub fn content_type(&self) -> ContentType {
        ContentType::from(self.0[field::CONTENT_TYPE])
    }

    /// The legacy record version field.
    pub fn version(&self) -> Version {
        let bytes = &self.0[field::VERSION];
        Version { major: bytes[0], minor: bytes[1] }
    }

    /// The fragment length field.
    pub fn length(&self) -> u16 {
        Be::<u16>::read(&self.0, field::LENGTH).map(Be::value).unwrap_or(0)
    }

    /// The length of header and fragment together.
    pub fn record_len(&self) -> usize {
        RECORD_HEADER_LEN + usize::from(self.length())
    }

    /// The fragment, bounded by the length field.
    pub fn fragment(&self) -> &[u8] {
        &self.0[field::FRAGMENT..self.record_len()]
    }

    /// The fragment, bounded by the length field.
    pub fn fragment_mut(&mut self) -> &mut [u8] {
        let end = self.record_len();
        &mut self.0[field::FRAGMENT..end]
    }

    /// Set the content type field.
    pub fn set_content_type(&mut self, value: ContentType) {
        self.0[field::CONTENT_TYPE] = value.into();
    }

    /// Set the version field.
    pub fn set_version(&mut self, value: Version) {
        self.0[field::VERSION].copy_from_slice(&value.to_bytes());
    }

    /// Set the fragment length field.
    pub fn set_length(&mut self, value: u16) {
        Be::new(value).write(&mut self.0, field::LENGTH);
    }
}

/// A high-level representation of a record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// The type of the enclosed fragment.
    pub content_type: ContentType,
    /// The record layer version.
    pub version: Version,
    /// The length of the fragment.
    pub length: u16,
}

impl RecordHeader {
    /// Parse the header at the start of a buffer.
    ///
    /// Only the five header bytes need to be present.
    pub fn parse(buffer: &[u8]) -> Result<RecordHeader> {
        if buffer.len() < RECORD_HEADER_LEN {
            return Err(Error::Truncated);
        }
        let rec = record::new_unchecked(buffer);
        Ok(RecordHeader {
            content_type: rec.content_type(),
            version: rec.version(),
            length: rec.length(),
        })
    }

    /// The length of header and fragment together.
    pub fn record_len(&self) -> usize {
        RECORD_HEADER_LEN + usize::from(self.length)
    }

    /// Write the header into the first five bytes of a buffer.
    pub fn emit(&self, buffer: &mut [u8]) {
        let rec = record::new_unchecked_mut(buffer);
        rec.set_content_type(self.content_type);
        rec.set_version(self.version);
        rec.set_length(self.length);
    }
}

byte_wrapper! {
    /// A byte sequence starting with a handshake message.
    #[derive(Debug, PartialEq, Eq)]
    pub struct handshake([u8]);
}

impl handshake {
    /// Imbue a raw octet buffer with handshake message structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with handshake message structure.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        let message = Self::new_unchecked(data);
        message.check_len()?;
        Ok(message)
    }

    /// Ensure the header and the complete body are present.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < HANDSHAKE_HEADER_LEN {
            return Err(Error::Truncated);
        }
        if self.0.len() < self.message_len() {
            return Err(Error::Truncated);
        }
        Ok(())
    }

    /// The message type field.
    pub fn msg_type(&self) -> HandshakeType {
        HandshakeType::from(self.0[field::MSG_TYPE])
    }

    /// The body length field.
    pub fn length(&self) -> U24 {
        U24::read(&self.0, field::MSG_LENGTH).unwrap_or_default()
    }

    /// The length of header and body together.
    pub fn message_len(&self) -> usize {
        HANDSHAKE_HEADER_LEN + self.length().value() as usize
    }

    /// The whole message including its header, as hashed into the transcript.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..self.message_len()]
    }

    /// The message body.
    pub fn body(&self) -> &[u8] {
        &self.0[field::BODY..self.message_len()]
    }

    /// Set the message type field.
    pub fn set_msg_type(&mut self, value: HandshakeType) {
        self.0[field::MSG_TYPE] = value.into();
    }

    /// Set the body length field.
    pub fn set_length(&mut self, value: U24) {
        value.write(&mut self.0, field::MSG_LENGTH);
    }

    /// The message body, for writing.
    pub fn body_mut(&mut self) -> &mut [u8] {
        let end = self.message_len();
        &mut self.0[field::BODY..end]
    }
}

/// Sequential reads from a complete message body.
///
/// Running out of bytes is a `Malformed` message since the length was already checked at the
/// message layer.
struct Cursor<'a> {
    data: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.data.len() < len {
            return Err(Error::Malformed);
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.bytes(2)?;
        Be::<u16>::read(bytes, 0).map(Be::value)
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The ClientHello this client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientHello<'a> {
    /// The client random.
    pub random: [u8; RANDOM_LEN],
    /// The host name for the server name indication extension.
    pub server_name: &'a str,
}

impl ClientHello<'_> {
    /// The length of the extension block.
    fn extensions_len(&self) -> usize {
        // server_name: type, length, list length, name type, name length, name
        let sni = 9 + self.server_name.len();
        // supported_groups: type, length, list length, x25519
        let groups = 8;
        // extended_master_secret: type, empty
        let ems = 4;
        // renegotiation_info: type, length, empty renegotiated connection
        let reneg = 5;
        // signature_algorithms: type, length, list length, sha256+rsa
        let sigalgs = 8;
        sni + groups + ems + reneg + sigalgs
    }

    fn body_len(&self) -> usize {
        // version, random, session id, cipher suites, compression methods, extensions
        2 + RANDOM_LEN + 1 + 4 + 2 + 2 + self.extensions_len()
    }

    /// The length of the handshake message, header included.
    pub fn buffer_len(&self) -> usize {
        HANDSHAKE_HEADER_LEN + self.body_len()
    }

    /// Emit the handshake message into the start of a buffer.
    ///
    /// # Panics
    /// This panics if the buffer is shorter than `buffer_len()` or the server name is longer than
    /// the extension length fields allow.
    pub fn emit(&self, buffer: &mut [u8]) {
        let name = self.server_name.as_bytes();
        assert!(name.len() <= usize::from(u16::max_value()) - 9, "Server name too long");

        let message = handshake::new_unchecked_mut(&mut buffer[..self.buffer_len()]);
        message.set_msg_type(HandshakeType::ClientHello);
        message.set_length(U24::from_len(self.body_len()));

        let body = message.body_mut();
        let mut at = 0;
        let mut put = |bytes: &[u8]| {
            body[at..at + bytes.len()].copy_from_slice(bytes);
            at += bytes.len();
        };

        put(&Version::TLS_1_2.to_bytes());
        put(&self.random);
        // Empty session id.
        put(&[0]);
        put(Be::new(2u16).as_bytes());
        put(Be::new(u16::from(CipherSuite::EcdheRsaWithAes128GcmSha256)).as_bytes());
        // Only the null compression method.
        put(&[1, 0]);
        put(Be::new(self.extensions_len() as u16).as_bytes());

        put(Be::new(u16::from(ExtensionType::ServerName)).as_bytes());
        put(Be::new(name.len() as u16 + 5).as_bytes());
        put(Be::new(name.len() as u16 + 3).as_bytes());
        // host_name
        put(&[0]);
        put(Be::new(name.len() as u16).as_bytes());
        put(name);

        put(Be::new(u16::from(ExtensionType::SupportedGroups)).as_bytes());
        put(&[0x00, 0x04, 0x00, 0x02]);
        put(Be::new(u16::from(NamedGroup::X25519)).as_bytes());

        put(Be::new(u16::from(ExtensionType::ExtendedMasterSecret)).as_bytes());
        put(&[0x00, 0x00]);

        put(Be::new(u16::from(ExtensionType::RenegotiationInfo)).as_bytes());
        put(&[0x00, 0x01, 0x00]);

        put(Be::new(u16::from(ExtensionType::SignatureAlgorithms)).as_bytes());
        // One pair: sha256 (4) with rsa (1).
        put(&[0x00, 0x04, 0x00, 0x02, 0x04, 0x01]);
    }
}

/// A parsed ServerHello body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerHello<'a> {
    /// The negotiated version.
    pub version: Version,
    /// The server random.
    pub random: [u8; RANDOM_LEN],
    /// The session id, unused as we never resume.
    pub session_id: &'a [u8],
    /// The selected cipher suite.
    pub cipher_suite: CipherSuite,
    /// The selected compression method.
    pub compression_method: u8,
    /// Whether the server agreed to the extended master secret.
    pub extended_master_secret: bool,
}

impl<'a> ServerHello<'a> {
    /// Parse the body of a ServerHello message.
    pub fn parse(body: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor::new(body);
        let version = cursor.bytes(2)?;
        let version = Version { major: version[0], minor: version[1] };
        let mut random = [0; RANDOM_LEN];
        random.copy_from_slice(cursor.bytes(RANDOM_LEN)?);
        let session_len = cursor.u8()?;
        let session_id = cursor.bytes(usize::from(session_len))?;
        let cipher_suite = CipherSuite::from(cursor.u16()?);
        let compression_method = cursor.u8()?;

        let mut extended_master_secret = false;
        // The extension block may be omitted entirely.
        if !cursor.is_empty() {
            let ext_len = cursor.u16()?;
            let mut extensions = Cursor::new(cursor.bytes(usize::from(ext_len))?);
            while !extensions.is_empty() {
                let kind = ExtensionType::from(extensions.u16()?);
                let len = extensions.u16()?;
                let _data = extensions.bytes(usize::from(len))?;
                if let ExtensionType::ExtendedMasterSecret = kind {
                    extended_master_secret = true;
                }
            }
        }

        Ok(ServerHello {
            version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extended_master_secret,
        })
    }
}

/// A parsed ServerKeyExchange body for ECDHE.
///
/// The signature is retained but never verified, certificates are not validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerKeyExchange<'a> {
    /// The group of the ephemeral key.
    pub named_group: NamedGroup,
    /// The ephemeral public key of the server.
    pub public_key: &'a [u8],
    /// The signature and hash algorithm pair.
    pub signature_algorithm: u16,
    /// The signature over the parameters.
    pub signature: &'a [u8],
}

impl<'a> ServerKeyExchange<'a> {
    const NAMED_CURVE: u8 = 3;

    /// Parse the body of a ServerKeyExchange message.
    ///
    /// Explicit curve parameters are `Unsupported`, only named curves are understood.
    pub fn parse(body: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor::new(body);
        if cursor.u8()? != Self::NAMED_CURVE {
            return Err(Error::Unsupported);
        }
        let named_group = NamedGroup::from(cursor.u16()?);
        let key_len = cursor.u8()?;
        let public_key = cursor.bytes(usize::from(key_len))?;
        let signature_algorithm = cursor.u16()?;
        let sig_len = cursor.u16()?;
        let signature = cursor.bytes(usize::from(sig_len))?;
        Ok(ServerKeyExchange {
            named_group,
            public_key,
            signature_algorithm,
            signature,
        })
    }
}

/// The ClientKeyExchange carrying our ephemeral X25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientKeyExchange {
    /// The client public key.
    pub public_key: [u8; X25519_KEY_LEN],
}

impl ClientKeyExchange {
    /// The length of the handshake message, header included.
    pub const LEN: usize = HANDSHAKE_HEADER_LEN + 1 + X25519_KEY_LEN;

    /// Emit the handshake message into the start of a buffer.
    pub fn emit(&self, buffer: &mut [u8]) {
        let message = handshake::new_unchecked_mut(&mut buffer[..Self::LEN]);
        message.set_msg_type(HandshakeType::ClientKeyExchange);
        message.set_length(U24::from_len(1 + X25519_KEY_LEN));
        let body = message.body_mut();
        body[0] = X25519_KEY_LEN as u8;
        body[1..].copy_from_slice(&self.public_key);
    }
}

/// A Finished message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finished {
    /// The PRF output over the transcript.
    pub verify_data: [u8; VERIFY_DATA_LEN],
}

impl Finished {
    /// The length of the handshake message, header included.
    pub const LEN: usize = HANDSHAKE_HEADER_LEN + VERIFY_DATA_LEN;

    /// Parse a complete Finished message, header included.
    pub fn parse(message: &handshake) -> Result<Self> {
        message.check_len()?;
        if message.msg_type() != HandshakeType::Finished {
            return Err(Error::Unrecognized);
        }
        if message.body().len() != VERIFY_DATA_LEN {
            return Err(Error::Malformed);
        }
        let mut verify_data = [0; VERIFY_DATA_LEN];
        verify_data.copy_from_slice(message.body());
        Ok(Finished { verify_data })
    }

    /// Emit the handshake message into the start of a buffer.
    pub fn emit(&self, buffer: &mut [u8]) {
        let message = handshake::new_unchecked_mut(&mut buffer[..Self::LEN]);
        message.set_msg_type(HandshakeType::Finished);
        message.set_length(U24::from_len(VERIFY_DATA_LEN));
        message.body_mut().copy_from_slice(&self.verify_data);
    }
}

/// An empty Certificate message, the answer to a CertificateRequest when we have none.
pub const EMPTY_CERTIFICATE: [u8; 7] = [0x0b, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00];

/// The single byte body of a ChangeCipherSpec record.
pub const CHANGE_CIPHER_SPEC: u8 = 1;

/// An alert message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    /// The severity.
    pub level: AlertLevel,
    /// The reason.
    pub description: AlertDescription,
}

impl Alert {
    /// Parse an alert fragment.
    pub fn parse(fragment: &[u8]) -> Result<Self> {
        match fragment {
            &[level, description] => Ok(Alert {
                level: AlertLevel::from(level),
                description: AlertDescription::from(description),
            }),
            _ => Err(Error::Malformed),
        }
    }

    /// Emit the alert into two bytes.
    pub fn emit(&self, buffer: &mut [u8]) {
        buffer[0] = self.level.into();
        buffer[1] = self.description.into();
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} alert: {:?}", self.level, self.description)
    }
}
