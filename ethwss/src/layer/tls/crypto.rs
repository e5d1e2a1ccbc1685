//! Key schedule and record protection of TLS 1.2 with AES-128-GCM and SHA-256.
//!
//! The PRF, master secret and key block follow RFC 5246 and RFC 7627. Records are sealed with the
//! nonce layout of RFC 5288, a fixed IV from the key block followed by the sequence number.
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Key, Tag};
use hmac::{Hmac, Mac};
use rand_core::{CryptoRng, RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::layer::{Error, Result};
use crate::wire::Error as WireError;
use crate::wire::tls::{ContentType, Version};
use crate::wire::tls::{EXPLICIT_NONCE_LEN, FIXED_IV_LEN, MAX_FRAGMENT_LEN, PROTECTION_OVERHEAD};
use crate::wire::tls::{RANDOM_LEN, VERIFY_DATA_LEN};

type HmacSha256 = Hmac<Sha256>;

/// The length of the master secret.
pub const MASTER_SECRET_LEN: usize = 48;

/// The length of an AES-128 key.
pub const KEY_LEN: usize = 16;

trait Rng: RngCore + CryptoRng {}
impl<T: RngCore + CryptoRng> Rng for T {}

/// The environment available for operations.
///
/// This contains the rng, used for the client random, the ephemeral key and the initial TCP
/// sequence number. The TCP client and the WebSocket key draw from it as well.
pub struct System {
    rng: Box<dyn Rng>,
}

impl System {
    /// A system seeded from the operating system.
    pub fn new() -> core::result::Result<Self, rand_core::Error> {
        let chacha = rand_chacha::ChaChaRng::from_rng(rand_core::OsRng)?;
        Ok(System::from_rng(chacha))
    }

    /// A system drawing from the given generator.
    ///
    /// Tests use a seeded generator for reproducible handshakes.
    pub fn from_rng<R>(rng: R) -> Self
    where
        R: RngCore + CryptoRng + 'static,
    {
        System { rng: Box::new(rng) }
    }

    /// A fresh random value.
    pub fn random(&mut self) -> [u8; RANDOM_LEN] {
        let mut random = [0; RANDOM_LEN];
        self.rng.fill_bytes(&mut random);
        random
    }

    /// Generate an ephemeral X25519 key pair.
    pub fn dh_generate(&mut self) -> (EphemeralSecret, PublicKey) {
        let private = EphemeralSecret::random_from_rng(&mut *self);
        let public = PublicKey::from(&private);
        (private, public)
    }
}

impl RngCore for System {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> core::result::Result<(), rand_core::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

impl CryptoRng for System {}

fn hmac(secret: &[u8]) -> HmacSha256 {
    match <HmacSha256 as Mac>::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC takes keys of any length"),
    }
}

/// The TLS 1.2 pseudo random function with SHA-256.
///
/// Fills `out` with `P_SHA256(secret, label || seed)` where the seed is the concatenation of all
/// parts. See [RFC 5246, section 5].
///
/// [RFC 5246, section 5]: https://tools.ietf.org/html/rfc5246#section-5
pub fn prf(secret: &[u8], label: &[u8], seed: &[&[u8]], out: &mut [u8]) {
    let keyed = hmac(secret);

    // A(1)
    let mut a = {
        let mut mac = keyed.clone();
        mac.update(label);
        seed.iter().for_each(|part| mac.update(part));
        mac.finalize().into_bytes()
    };

    for chunk in out.chunks_mut(32) {
        let mut mac = keyed.clone();
        mac.update(&a);
        mac.update(label);
        seed.iter().for_each(|part| mac.update(part));
        let block = mac.finalize().into_bytes();
        chunk.copy_from_slice(&block[..chunk.len()]);

        let mut mac = keyed.clone();
        mac.update(&a);
        a = mac.finalize().into_bytes();
    }
}

/// The running hash over all handshake messages.
///
/// Every message sent or received is added in wire order, header included and record header
/// excluded.
#[derive(Clone, Default)]
pub struct Transcript {
    hash: Sha256,
}

impl Transcript {
    /// An empty transcript.
    pub fn new() -> Self {
        Transcript::default()
    }

    /// Add a handshake message.
    pub fn update(&mut self, message: &[u8]) {
        self.hash.update(message);
    }

    /// The hash over all messages so far.
    pub fn current(&self) -> [u8; 32] {
        self.hash.clone().finalize().into()
    }
}

/// Derive the master secret.
///
/// With the extended master secret ([RFC 7627]) the session hash is the transcript up to and
/// including the ClientKeyExchange. Otherwise the classic derivation over both randoms is used.
///
/// [RFC 7627]: https://tools.ietf.org/html/rfc7627
pub fn master_secret(
    premaster: &[u8],
    extended: bool,
    session_hash: &[u8; 32],
    client_random: &[u8; RANDOM_LEN],
    server_random: &[u8; RANDOM_LEN],
) -> [u8; MASTER_SECRET_LEN] {
    let mut master = [0; MASTER_SECRET_LEN];
    if extended {
        prf(premaster, b"extended master secret", &[session_hash], &mut master);
    } else {
        prf(premaster, b"master secret", &[client_random, server_random], &mut master);
    }
    master
}

/// The verify data of a Finished message.
pub fn verify_data(
    master: &[u8; MASTER_SECRET_LEN],
    label: &[u8],
    handshake_hash: &[u8; 32],
) -> [u8; VERIFY_DATA_LEN] {
    let mut verify = [0; VERIFY_DATA_LEN];
    prf(master, label, &[handshake_hash], &mut verify);
    verify
}

/// The keys of both directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyBlock {
    /// The client write key.
    pub client_key: [u8; KEY_LEN],
    /// The server write key.
    pub server_key: [u8; KEY_LEN],
    /// The implicit part of the client nonce.
    pub client_iv: [u8; FIXED_IV_LEN],
    /// The implicit part of the server nonce.
    pub server_iv: [u8; FIXED_IV_LEN],
}

impl KeyBlock {
    const LEN: usize = 2 * KEY_LEN + 2 * FIXED_IV_LEN;

    /// Expand the master secret into the key block.
    ///
    /// Note that the seed has the server random first.
    pub fn derive(
        master: &[u8; MASTER_SECRET_LEN],
        client_random: &[u8; RANDOM_LEN],
        server_random: &[u8; RANDOM_LEN],
    ) -> Self {
        let mut block = [0; Self::LEN];
        prf(master, b"key expansion", &[server_random, client_random], &mut block);

        let mut keys = KeyBlock {
            client_key: [0; KEY_LEN],
            server_key: [0; KEY_LEN],
            client_iv: [0; FIXED_IV_LEN],
            server_iv: [0; FIXED_IV_LEN],
        };
        keys.client_key.copy_from_slice(&block[..16]);
        keys.server_key.copy_from_slice(&block[16..32]);
        keys.client_iv.copy_from_slice(&block[32..36]);
        keys.server_iv.copy_from_slice(&block[36..40]);
        keys
    }
}

/// AES-128-GCM protection of one direction.
///
/// The nonce is the fixed IV followed by the eight byte explicit nonce. The additional data is
/// the sequence number, content type, version and plaintext length. The sequence number starts at
/// zero and increments once per record.
pub struct RecordProtection {
    cipher: Aes128Gcm,
    fixed_iv: [u8; FIXED_IV_LEN],
    sequence: u64,
}

impl RecordProtection {
    /// Protection with a key and the implicit nonce part, at sequence number zero.
    pub fn new(key: &[u8; KEY_LEN], fixed_iv: [u8; FIXED_IV_LEN]) -> Self {
        RecordProtection {
            cipher: Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key)),
            fixed_iv,
            sequence: 0,
        }
    }

    /// The sequence number of the next record.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    fn nonce(&self, explicit: &[u8]) -> [u8; FIXED_IV_LEN + EXPLICIT_NONCE_LEN] {
        let mut nonce = [0; FIXED_IV_LEN + EXPLICIT_NONCE_LEN];
        nonce[..FIXED_IV_LEN].copy_from_slice(&self.fixed_iv);
        nonce[FIXED_IV_LEN..].copy_from_slice(explicit);
        nonce
    }

    fn additional_data(&self, content_type: ContentType, len: usize) -> [u8; 13] {
        let mut aad = [0; 13];
        aad[..8].copy_from_slice(&self.sequence.to_be_bytes());
        aad[8] = content_type.into();
        aad[9..11].copy_from_slice(&Version::TLS_1_2.to_bytes());
        aad[11..].copy_from_slice(&(len as u16).to_be_bytes());
        aad
    }

    /// Encrypt a record fragment in place.
    ///
    /// The fragment is laid out as explicit nonce, plaintext and room for the tag. The explicit
    /// nonce is our sequence number. Plaintext longer than `MAX_FRAGMENT_LEN` is a
    /// `RecordOverflow`, the only input the cipher itself rejects is far longer still.
    pub fn seal(&mut self, content_type: ContentType, fragment: &mut [u8]) -> Result<()> {
        let len = fragment.len()
            .checked_sub(PROTECTION_OVERHEAD)
            .ok_or(Error::Exhausted)?;
        if len > MAX_FRAGMENT_LEN {
            return Err(Error::RecordOverflow);
        }
        let explicit = self.sequence.to_be_bytes();
        let nonce = self.nonce(&explicit);
        let aad = self.additional_data(content_type, len);

        let (head, rest) = fragment.split_at_mut(EXPLICIT_NONCE_LEN);
        let (text, tag) = rest.split_at_mut(len);
        head.copy_from_slice(&explicit);
        let computed = self.cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce), &aad, text)
            .map_err(|_| Error::RecordOverflow)?;
        tag.copy_from_slice(computed.as_slice());
        self.sequence += 1;
        Ok(())
    }

    /// Authenticate and decrypt a record fragment in place, returning the plaintext.
    ///
    /// A failed tag check is `BadRecordMac` and leaves the sequence number unchanged.
    pub fn open<'a>(&mut self, content_type: ContentType, fragment: &'a mut [u8])
        -> Result<&'a mut [u8]>
    {
        let len = fragment.len()
            .checked_sub(PROTECTION_OVERHEAD)
            .ok_or(Error::Wire(WireError::Truncated))?;
        let (head, rest) = fragment.split_at_mut(EXPLICIT_NONCE_LEN);
        let (text, tag) = rest.split_at_mut(len);
        let nonce = self.nonce(head);
        let aad = self.additional_data(content_type, len);

        self.cipher
            .decrypt_in_place_detached(GenericArray::from_slice(&nonce), &aad, text, Tag::from_slice(tag))
            .map_err(|_| Error::BadRecordMac)?;
        self.sequence += 1;
        Ok(text)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hex(text: &str) -> Vec<u8> {
        let clean: Vec<u8> = text.bytes().filter(u8::is_ascii_hexdigit).collect();
        clean.chunks(2)
            .map(|pair| u8::from_str_radix(core::str::from_utf8(pair).unwrap(), 16).unwrap())
            .collect()
    }

    #[test]
    fn prf_sha256_vector() {
        // The widely circulated P_SHA256 test vector of the IETF TLS working group.
        let secret = hex("9b be 43 6b a9 40 f0 17 b1 76 52 84 9a 71 db 35");
        let seed = hex("a0 ba 9f 93 6c da 31 18 27 a6 f7 96 ff d5 19 8c");
        let expected = hex("
            e3 f2 29 ba 72 7b e1 7b 8d 12 26 20 55 7c d4 53
            c2 aa b2 1d 07 c3 d4 95 32 9b 52 d4 e6 1e db 5a
            6b 30 17 91 e9 0d 35 c9 c9 a4 6b 4e 14 ba f9 af
            0f a0 22 f7 07 7d ef 17 ab fd 37 97 c0 56 4b ab
            4f bc 91 66 6e 9d ef 9b 97 fc e3 4f 79 67 89 ba
            a4 80 82 d1 22 ee 42 c5 a7 2e 5a 51 10 ff f7 01
            87 34 7b 66");
        let mut out = vec![0; expected.len()];
        prf(&secret, b"test label", &[&seed], &mut out);
        assert_eq!(out, expected);
    }

    #[test]
    fn prf_seed_parts() {
        let mut joined = [0; 40];
        let mut split = [0; 40];
        prf(b"secret", b"label", &[b"ab"], &mut joined);
        prf(b"secret", b"label", &[b"a", b"b"], &mut split);
        assert_eq!(joined, split);
    }

    #[test]
    fn transcript_is_incremental() {
        let mut transcript = Transcript::new();
        transcript.update(b"hello ");
        let partial = transcript.current();
        transcript.update(b"world");
        assert_ne!(partial, transcript.current());
        let expected: [u8; 32] = Sha256::digest(b"hello world").into();
        assert_eq!(transcript.current(), expected);
    }

    #[test]
    fn key_block_layout() {
        let master = [7; MASTER_SECRET_LEN];
        let client = [1; RANDOM_LEN];
        let server = [2; RANDOM_LEN];
        let keys = KeyBlock::derive(&master, &client, &server);

        let mut block = [0; 40];
        prf(&master, b"key expansion", &[&server, &client], &mut block);
        assert_eq!(&keys.client_key[..], &block[..16]);
        assert_eq!(&keys.server_key[..], &block[16..32]);
        assert_eq!(&keys.client_iv[..], &block[32..36]);
        assert_eq!(&keys.server_iv[..], &block[36..40]);
    }

    #[test]
    fn master_secret_variants() {
        let hash = [3; 32];
        let client = [1; RANDOM_LEN];
        let server = [2; RANDOM_LEN];
        let extended = master_secret(b"premaster", true, &hash, &client, &server);
        let classic = master_secret(b"premaster", false, &hash, &client, &server);
        assert_ne!(extended, classic);

        let mut expected = [0; MASTER_SECRET_LEN];
        prf(b"premaster", b"master secret", &[&client, &server], &mut expected);
        assert_eq!(classic, expected);
    }

    #[test]
    fn seal_open() {
        let key = [0x42; KEY_LEN];
        let mut writer = RecordProtection::new(&key, [1, 2, 3, 4]);
        let mut reader = RecordProtection::new(&key, [1, 2, 3, 4]);

        for round in 0..3u64 {
            let mut fragment = vec![0; PROTECTION_OVERHEAD + 5];
            fragment[EXPLICIT_NONCE_LEN..][..5].copy_from_slice(b"hello");
            writer.seal(ContentType::ApplicationData, &mut fragment).unwrap();
            assert_eq!(&fragment[..EXPLICIT_NONCE_LEN], &round.to_be_bytes());
            assert_ne!(&fragment[EXPLICIT_NONCE_LEN..][..5], b"hello");

            let plain = reader.open(ContentType::ApplicationData, &mut fragment).unwrap();
            assert_eq!(plain, b"hello");
        }
        assert_eq!(writer.sequence(), 3);
        assert_eq!(reader.sequence(), 3);
    }

    #[test]
    fn open_rejects_tampering() {
        let key = [0x42; KEY_LEN];
        let mut writer = RecordProtection::new(&key, [0; 4]);
        let mut fragment = vec![0; PROTECTION_OVERHEAD + 4];
        writer.seal(ContentType::Handshake, &mut fragment).unwrap();

        // Wrong content type in the additional data.
        let mut reader = RecordProtection::new(&key, [0; 4]);
        let mut copy = fragment.clone();
        assert_eq!(reader.open(ContentType::ApplicationData, &mut copy).err(), Some(Error::BadRecordMac));
        assert_eq!(reader.sequence(), 0);

        let mut copy = fragment.clone();
        let last = copy.len() - 1;
        copy[last] ^= 1;
        assert_eq!(reader.open(ContentType::Handshake, &mut copy).err(), Some(Error::BadRecordMac));

        assert!(reader.open(ContentType::Handshake, &mut fragment).is_ok());
        assert_eq!(reader.open(ContentType::Handshake, &mut [0; 10]).err(),
            Some(Error::Wire(WireError::Truncated)));
    }

    #[test]
    fn seal_rejects_oversized_fragment() {
        let mut writer = RecordProtection::new(&[7; KEY_LEN], [0; 4]);
        let mut fragment = vec![0; PROTECTION_OVERHEAD + MAX_FRAGMENT_LEN + 1];
        assert_eq!(writer.seal(ContentType::ApplicationData, &mut fragment), Err(Error::RecordOverflow));
        assert_eq!(writer.sequence(), 0);
        assert_eq!(writer.seal(ContentType::ApplicationData, &mut [0; 8]), Err(Error::Exhausted));

        let mut fragment = vec![0; PROTECTION_OVERHEAD + MAX_FRAGMENT_LEN];
        assert_eq!(writer.seal(ContentType::ApplicationData, &mut fragment), Ok(()));
        assert_eq!(writer.sequence(), 1);
    }

    /// A full key schedule with fixed randoms and X25519 keys.
    ///
    /// The expected values were computed with OpenSSL (X25519, AES-128-GCM) and a separate
    /// P_SHA256 written from RFC 5246. Records are laid out as in RFC 5288.
    #[test]
    fn key_schedule_known_answer() {
        use x25519_dalek::{PublicKey, StaticSecret};

        let mut client_private = [0; 32];
        let mut server_private = [0; 32];
        for i in 0..32 {
            client_private[i] = 0x10 + i as u8;
            server_private[i] = 0x40 + i as u8;
        }
        let mut client_random = [0; RANDOM_LEN];
        let mut server_random = [0; RANDOM_LEN];
        for i in 0..RANDOM_LEN {
            client_random[i] = 0xc0 + (i % 16) as u8;
            server_random[i] = 0x50 + (i % 16) as u8;
        }

        let client_secret = StaticSecret::from(client_private);
        let server_secret = StaticSecret::from(server_private);
        let client_public = PublicKey::from(&client_secret);
        let server_public = PublicKey::from(&server_secret);
        assert_eq!(&client_public.as_bytes()[..],
            &hex("d89e3bad79437dbed9f843418304f460ff05c7fe81fe4a9577a804cb9367ff66")[..]);
        assert_eq!(&server_public.as_bytes()[..],
            &hex("79a631eede1bf9c98f12032cdeadd0e7a079398fc786b88cc846ec89af85a51a")[..]);

        let premaster = client_secret.diffie_hellman(&server_public);
        assert_eq!(premaster.as_bytes(), server_secret.diffie_hellman(&client_public).as_bytes());
        assert_eq!(&premaster.as_bytes()[..],
            &hex("0b7480daab7ce8926aaf208e30ef89c8403f7d00aa3db0428f914ead05c85e09")[..]);

        let mut transcript = Transcript::new();
        transcript.update(b"client hello|server hello|server key exchange|server hello done|");
        transcript.update(b"client key exchange");
        let session_hash = transcript.current();
        assert_eq!(&session_hash[..],
            &hex("3111f955178efeba31a6c3c9fa23b3089dd547db08dc536b4b7bfb6cfae342f9")[..]);

        let master = master_secret(premaster.as_bytes(), true, &session_hash, &client_random, &server_random);
        assert_eq!(&master[..], &hex("
            7961d9773888756d82a7923250861c0809ea13e21ada9b3861069d8a396cfba0
            f467c2ceeca0285e743c5791986a8f08")[..]);
        let classic = master_secret(premaster.as_bytes(), false, &session_hash, &client_random, &server_random);
        assert_eq!(&classic[..], &hex("
            e389882d6486ba741813204a51d04625a6c79312fc2446f971ff0f0de44362be
            8b1e6daf04683d64e9e7aea8912d6e16")[..]);

        let keys = KeyBlock::derive(&master, &client_random, &server_random);
        assert_eq!(&keys.client_key[..], &hex("c3f274b5154ba436cf48e9ca6a0246cc")[..]);
        assert_eq!(&keys.server_key[..], &hex("d41d9da192231e93b9a6534601e7d9cf")[..]);
        assert_eq!(&keys.client_iv[..], &hex("80d5a64c")[..]);
        assert_eq!(&keys.server_iv[..], &hex("29b51c27")[..]);

        let finished_hash: [u8; 32] = Sha256::digest(b"transcript through client key exchange").into();
        let verify = verify_data(&master, b"client finished", &finished_hash);
        assert_eq!(&verify[..], &hex("8bf804631c8ad077af493407")[..]);

        let plain = b"GET /feed HTTP/1.1\r\n";
        let mut writer = RecordProtection::new(&keys.client_key, keys.client_iv);
        let expected = [
            hex("0000000000000000 5bb918c4e6cfa7b49cec4942f7163362425bbc2e
                 fd259e4d6b467b7f01ac3d46e596d06a"),
            hex("0000000000000001 fb62b2362d598a47518da495c9797277395b6f2a
                 cb401bc25317d1fad509225b41a3b5af"),
        ];
        for record in expected.iter() {
            let mut fragment = vec![0; PROTECTION_OVERHEAD + plain.len()];
            fragment[EXPLICIT_NONCE_LEN..][..plain.len()].copy_from_slice(plain);
            writer.seal(ContentType::ApplicationData, &mut fragment).unwrap();
            assert_eq!(&fragment, record);
        }

        let mut reader = RecordProtection::new(&keys.server_key, keys.server_iv);
        let mut sealed = hex("0000000000000000 7ac8131fcfc0f2f2ba6dd0e41077ed90
            2c4318c57c96b6ae76578bdbaeea17a8");
        let opened = reader.open(ContentType::Handshake, &mut sealed).unwrap();
        let mut finished = vec![0x14, 0x00, 0x00, 0x0c];
        finished.extend_from_slice(&verify);
        assert_eq!(opened, &finished[..]);
    }

    #[test]
    fn system_is_deterministic() {
        let mut a = System::from_rng(rand_chacha::ChaCha8Rng::seed_from_u64(1));
        let mut b = System::from_rng(rand_chacha::ChaCha8Rng::seed_from_u64(1));
        assert_eq!(a.random(), b.random());
        let (_, public_a) = a.dh_generate();
        let (_, public_b) = b.dh_generate();
        assert_eq!(public_a.as_bytes(), public_b.as_bytes());
    }
}
