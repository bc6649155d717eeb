//! Common test utilities
//!
//! [`SimulatedCard`] is an in-memory transport that speaks the card side of
//! the protocol: TLV bodies, the encryption envelope, status words, security
//! delays, wallet list paging and key negotiation.

#![allow(dead_code, unreachable_pub)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use cardlink_apdu_core::cipher::{open, seal};
use cardlink_apdu_core::{Aes256CbcCipher, CardTransport, CommandApdu, SessionKey, TransportError};
use cardlink_wallet::crypto::{fast_session_key, strong_session_key};
use cardlink_wallet::tlv::{Tag, TlvBuilder, TlvDecoder};
use cardlink_wallet::types::{CardSettings, CardStatus, EllipticCurve};
use cardlink_wallet::{
    CancelHandle, CryptoProvider, KeyPair, SessionDelegate, SessionState, SoftwareCrypto,
};
use sha2::{Digest, Sha256};
use tokio::sync::Notify;

pub const CARD_ID: [u8; 8] = [0xCB, 0x79, 0x00, 0x00, 0x00, 0x00, 0x00, 0x42];

pub const SW_OK: u16 = 0x9000;
pub const SW_PAUSE: u16 = 0x9789;
pub const SW_NEED_ENCRYPTION: u16 = 0x6982;
pub const SW_INVALID_STATE: u16 = 0x6985;
pub const SW_INVALID_PARAMS: u16 = 0x6A86;
pub const SW_WALLET_NOT_FOUND: u16 = 0x6A88;
pub const SW_WALLET_ALREADY_EXISTS: u16 = 0x6A89;
pub const SW_INVALID_ACCESS_CODE: u16 = 0x6AF1;
pub const SW_INVALID_PASSCODE: u16 = 0x6AF2;
pub const SW_INS_NOT_SUPPORTED: u16 = 0x6D00;

pub const INS_READ: u8 = 0xF2;
pub const INS_SIGN: u8 = 0xFB;
pub const INS_DERIVE: u8 = 0xD2;
pub const INS_PERSONALIZE: u8 = 0xF1;
pub const INS_OPEN_SESSION: u8 = 0xFF;

/// Card nonce used for fast encryption
pub const CARD_NONCE: [u8; 16] = [0x5B; 16];

/// Salt mixed into attestation signatures
pub const ATTEST_SALT: [u8; 16] = [0x5A; 16];

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn code_hash(code: &str) -> [u8; 32] {
    Sha256::digest(code.as_bytes()).into()
}

#[derive(Debug, Clone)]
pub struct SimWallet {
    pub index: u8,
    pub curve: EllipticCurve,
    pub public_key: Vec<u8>,
    pub signed: u32,
}

impl SimWallet {
    pub fn new(index: u8, curve: EllipticCurve) -> Self {
        let mut public_key = vec![0x02, index];
        public_key.resize(33, 0x11);
        Self {
            index,
            curve,
            public_key,
            signed: 0,
        }
    }
}

/// In-memory card behind a [`CardTransport`]
#[derive(Debug)]
pub struct SimulatedCard {
    pub connected: bool,
    pub connects: usize,
    /// Every frame received, in order
    pub frames: Vec<Bytes>,

    pub card_id: Vec<u8>,
    pub status: CardStatus,
    pub firmware: String,
    pub settings: CardSettings,
    pub curves: Vec<EllipticCurve>,
    pub max_wallets: u8,
    pub wallets: Vec<SimWallet>,
    pub access_code: [u8; 32],
    pub passcode: [u8; 32],
    pub card_keys: KeyPair,

    /// Reject plain commands with need-encryption
    pub require_encryption: bool,
    /// Instructions accepted in the clear even when encryption is required
    pub plain_ins: Vec<u8>,
    /// One pause response per entry, with an optional remaining delay in
    /// centiseconds, answered before the next command is processed
    pub pauses: VecDeque<Option<u16>>,
    /// Wallets per page, consumed page by page; falls back to `page_size`
    pub page_sizes: VecDeque<usize>,
    pub page_size: usize,
    /// Wallets before the cursor repeated at the start of each page
    pub page_overlap: usize,
    /// Transport failures returned instead of the next responses
    pub failures: VecDeque<TransportError>,
    /// Status words returned for specific derivation path encodings
    pub derive_failures: HashMap<Vec<u8>, u16>,
    /// Instruction whose exchange never completes
    pub stall_ins: Option<u8>,
    /// Notified once a frame with `stall_ins` has been received
    pub stalled: Arc<Notify>,

    session_key: Option<SessionKey>,
}

impl SimulatedCard {
    /// A personalized multi-wallet card with factory codes and no wallets
    pub fn new() -> Self {
        Self {
            connected: false,
            connects: 0,
            frames: Vec::new(),
            card_id: CARD_ID.to_vec(),
            status: CardStatus::Empty,
            firmware: "4.52r".into(),
            settings: CardSettings::ALLOW_FAST_ENCRYPTION
                | CardSettings::ALLOW_SET_ACCESS_CODE
                | CardSettings::ALLOW_SET_PASSCODE,
            curves: vec![EllipticCurve::Secp256k1, EllipticCurve::Ed25519Slip0010],
            max_wallets: 20,
            wallets: Vec::new(),
            access_code: code_hash("000000"),
            passcode: code_hash("000"),
            card_keys: SoftwareCrypto
                .generate_key_pair(EllipticCurve::Secp256k1)
                .expect("secp256k1 key pair"),
            require_encryption: false,
            plain_ins: vec![INS_OPEN_SESSION, INS_PERSONALIZE],
            pauses: VecDeque::new(),
            page_sizes: VecDeque::new(),
            page_size: 5,
            page_overlap: 0,
            failures: VecDeque::new(),
            derive_failures: HashMap::new(),
            stall_ins: None,
            stalled: Arc::new(Notify::new()),
            session_key: None,
        }
    }

    /// A card straight from the factory
    pub fn factory() -> Self {
        Self {
            status: CardStatus::NotPersonalized,
            settings: CardSettings::empty(),
            curves: Vec::new(),
            ..Self::new()
        }
    }

    /// Add `n` secp256k1 wallets in slots `0..n`
    pub fn with_wallets(mut self, n: u8) -> Self {
        self.wallets = (0..n)
            .map(|i| SimWallet::new(i, EllipticCurve::Secp256k1))
            .collect();
        self.status = CardStatus::Loaded;
        self
    }

    pub fn wallet_key(&self, index: u8) -> Bytes {
        self.wallets
            .iter()
            .find(|w| w.index == index)
            .map(|w| Bytes::from(w.public_key.clone()))
            .expect("wallet exists")
    }

    /// Frames received with instruction `ins`
    pub fn frames_with_ins(&self, ins: u8) -> Vec<CommandApdu> {
        self.frames
            .iter()
            .filter_map(|f| CommandApdu::from_bytes(f).ok())
            .filter(|c| c.instruction() == ins)
            .collect()
    }

    fn respond(&mut self, raw: &[u8]) -> Bytes {
        let Ok(apdu) = CommandApdu::from_bytes(raw) else {
            return response(Bytes::new(), SW_INVALID_PARAMS);
        };

        if let Some(delay) = self.pauses.pop_front() {
            let body = match delay {
                Some(cs) => TlvBuilder::new().append(Tag::Pause, &cs).build().expect("tlv"),
                None => Bytes::new(),
            };
            return response(body, SW_PAUSE);
        }

        let ins = apdu.instruction();
        let key = self.session_key.clone().filter(|_| ins != INS_OPEN_SESSION);
        let body = match &key {
            Some(key) => match open(apdu.data(), key, &Aes256CbcCipher) {
                Ok(body) => body,
                Err(_) => return response(Bytes::new(), SW_INVALID_PARAMS),
            },
            None => apdu.data().clone(),
        };
        if self.require_encryption && key.is_none() && !self.plain_ins.contains(&ins) {
            return response(Bytes::new(), SW_NEED_ENCRYPTION);
        }
        let Ok(request) = TlvDecoder::new(&body) else {
            return response(Bytes::new(), SW_INVALID_PARAMS);
        };

        let result = match ins {
            INS_OPEN_SESSION => self.open_session(apdu.p1(), &request),
            INS_READ => self.read(&request),
            0xF3 => self.attest(&request),
            0xF8 => self.create_wallet(&request),
            0xFC => self.purge_wallet(&request),
            INS_SIGN => self.sign(&request),
            INS_DERIVE => self.derive(&request),
            INS_PERSONALIZE => self.personalize(&request),
            0xE3 => self.depersonalize(),
            _ => Err(SW_INS_NOT_SUPPORTED),
        };

        match result {
            Ok(body) => {
                let body = match &key {
                    Some(key) if !body.is_empty() => {
                        seal(&body, key, &Aes256CbcCipher).expect("seal")
                    }
                    _ => body,
                };
                response(body, SW_OK)
            }
            Err(sw) => response(Bytes::new(), sw),
        }
    }

    fn check_access_code(&self, request: &TlvDecoder) -> Result<(), u16> {
        match request.raw(Tag::Pin) {
            Some(pin) if pin.as_ref() == self.access_code => Ok(()),
            _ => Err(SW_INVALID_ACCESS_CODE),
        }
    }

    fn check_passcode(&self, request: &TlvDecoder) -> Result<(), u16> {
        self.check_access_code(request)?;
        match request.raw(Tag::Pin2) {
            Some(pin) if pin.as_ref() == self.passcode => Ok(()),
            _ => Err(SW_INVALID_PASSCODE),
        }
    }

    fn find_wallet(&mut self, request: &TlvDecoder) -> Result<&mut SimWallet, u16> {
        let key = request.raw(Tag::WalletPublicKey).ok_or(SW_INVALID_PARAMS)?;
        self.wallets
            .iter_mut()
            .find(|w| w.public_key == key.as_ref())
            .ok_or(SW_WALLET_NOT_FOUND)
    }

    fn open_session(&mut self, mode: u8, request: &TlvDecoder) -> Result<Bytes, u16> {
        let key_a = request.raw(Tag::SessionKeyA).ok_or(SW_INVALID_PARAMS)?.clone();
        let (key, key_b) = match mode {
            0x01 => (
                fast_session_key(&self.access_code, &key_a, &CARD_NONCE),
                Bytes::from_static(&CARD_NONCE),
            ),
            0x02 => {
                let ephemeral = SoftwareCrypto
                    .generate_key_pair(EllipticCurve::Secp256k1)
                    .map_err(|_| SW_INVALID_PARAMS)?;
                let shared = SoftwareCrypto
                    .ecdh(&ephemeral.private_key, &key_a)
                    .map_err(|_| SW_INVALID_PARAMS)?;
                (
                    strong_session_key(shared.as_slice(), &self.access_code),
                    ephemeral.public_key,
                )
            }
            _ => return Err(SW_INVALID_PARAMS),
        };
        self.session_key = Some(key);
        Ok(TlvBuilder::new()
            .append(Tag::SessionKeyB, &key_b)
            .build()
            .expect("tlv"))
    }

    fn card_record(&self) -> TlvBuilder {
        let mut record = TlvBuilder::new()
            .append(Tag::CardId, self.card_id.as_slice())
            .append(Tag::ManufacturerName, "CARDLINK")
            .append(Tag::Status, &self.status)
            .append(Tag::FirmwareVersion, self.firmware.as_str());
        if self.status != CardStatus::NotPersonalized {
            record = record
                .append(Tag::CardPublicKey, &self.card_keys.public_key)
                .append(Tag::SettingsMask, &self.settings)
                .append_all(Tag::CurveId, &self.curves)
                .append(Tag::MaxWallets, &self.max_wallets)
                .append(Tag::WalletsCount, &(self.wallets.len() as u8))
                .append(Tag::Pin2IsDefault, &(self.passcode == code_hash("000")));
        }
        record
    }

    fn read(&mut self, request: &TlvDecoder) -> Result<Bytes, u16> {
        self.check_access_code(request)?;
        if request.decode_optional::<u8>(Tag::InteractionMode).ok().flatten() == Some(0x02) {
            return self.wallet_page(request);
        }
        Ok(self.card_record().build().expect("tlv"))
    }

    fn wallet_page(&mut self, request: &TlvDecoder) -> Result<Bytes, u16> {
        let cursor: u8 = request
            .decode(Tag::WalletIndex)
            .map_err(|_| SW_INVALID_PARAMS)?;
        let cursor = usize::from(cursor);
        let size = self.page_sizes.pop_front().unwrap_or(self.page_size);

        let mut wallets = self.wallets.clone();
        wallets.sort_by_key(|w| w.index);
        let start = cursor.saturating_sub(self.page_overlap).min(wallets.len());
        let end = (cursor + size).min(wallets.len()).max(start);

        let mut page = TlvBuilder::new()
            .append(Tag::CardId, self.card_id.as_slice())
            .append(Tag::WalletsCount, &(wallets.len() as u8));
        for wallet in &wallets[start..end] {
            let record = TlvBuilder::new()
                .append(Tag::WalletIndex, &wallet.index)
                .append(Tag::Status, &0x02u8)
                .append(Tag::CurveId, &wallet.curve)
                .append(Tag::WalletPublicKey, wallet.public_key.as_slice())
                .append(Tag::WalletHdChain, &[0xCC; 32])
                .append(Tag::WalletSignedHashes, &wallet.signed);
            page = page.append_nested(Tag::CardWallet, record).expect("tlv");
        }
        Ok(page.build().expect("tlv"))
    }

    fn attest(&self, request: &TlvDecoder) -> Result<Bytes, u16> {
        self.check_access_code(request)?;
        let challenge = request.raw(Tag::Challenge).ok_or(SW_INVALID_PARAMS)?;
        let message = [challenge.as_ref(), ATTEST_SALT.as_slice()].concat();
        let signature = SoftwareCrypto
            .sign(&message, &self.card_keys.private_key, EllipticCurve::Secp256k1)
            .map_err(|_| SW_INVALID_STATE)?;
        Ok(TlvBuilder::new()
            .append(Tag::CardId, self.card_id.as_slice())
            .append(Tag::Salt, &ATTEST_SALT)
            .append(Tag::CardSignature, &signature)
            .build()
            .expect("tlv"))
    }

    fn create_wallet(&mut self, request: &TlvDecoder) -> Result<Bytes, u16> {
        self.check_passcode(request)?;
        let curve: EllipticCurve = request.decode(Tag::CurveId).map_err(|_| SW_INVALID_PARAMS)?;
        let index: u8 = request
            .decode_optional(Tag::WalletIndex)
            .map_err(|_| SW_INVALID_PARAMS)?
            .unwrap_or(0);
        if self.wallets.iter().any(|w| w.index == index) {
            return Err(SW_WALLET_ALREADY_EXISTS);
        }

        let wallet = SimWallet::new(index, curve);
        let body = TlvBuilder::new()
            .append(Tag::CardId, self.card_id.as_slice())
            .append(Tag::WalletIndex, &index)
            .append(Tag::WalletPublicKey, wallet.public_key.as_slice())
            .append(Tag::WalletHdChain, &[0xCC; 32])
            .build()
            .expect("tlv");
        self.wallets.push(wallet);
        self.status = CardStatus::Loaded;
        Ok(body)
    }

    fn purge_wallet(&mut self, request: &TlvDecoder) -> Result<Bytes, u16> {
        self.check_passcode(request)?;
        let index = self.find_wallet(request)?.index;
        self.wallets.retain(|w| w.index != index);
        Ok(Bytes::new())
    }

    fn sign(&mut self, request: &TlvDecoder) -> Result<Bytes, u16> {
        self.check_passcode(request)?;
        let size: u8 = request
            .decode(Tag::TransactionOutHashSize)
            .map_err(|_| SW_INVALID_PARAMS)?;
        let hashes = request
            .raw(Tag::TransactionOutHash)
            .ok_or(SW_INVALID_PARAMS)?
            .clone();
        if size == 0 || hashes.len() % usize::from(size) != 0 {
            return Err(SW_INVALID_PARAMS);
        }

        let mut signatures = BytesMut::new();
        for hash in hashes.chunks(usize::from(size)) {
            let digest = Sha256::digest(hash);
            signatures.put_slice(&digest);
            signatures.put_slice(&digest);
        }
        let count = (hashes.len() / usize::from(size)) as u32;

        let card_id = self.card_id.clone();
        let wallet = self.find_wallet(request)?;
        wallet.signed += count;
        Ok(TlvBuilder::new()
            .append(Tag::CardId, card_id.as_slice())
            .append(Tag::WalletSignature, &signatures.freeze())
            .append(Tag::WalletSignedHashes, &wallet.signed)
            .build()
            .expect("tlv"))
    }

    fn derive(&mut self, request: &TlvDecoder) -> Result<Bytes, u16> {
        self.check_access_code(request)?;
        let path = request.raw(Tag::WalletHdPath).ok_or(SW_INVALID_PARAMS)?.clone();
        if let Some(sw) = self.derive_failures.get(path.as_ref()) {
            return Err(*sw);
        }
        let card_id = self.card_id.clone();
        let wallet = self.find_wallet(request)?;

        let mut public_key = vec![0x03];
        public_key.extend_from_slice(&Sha256::digest([wallet.public_key.as_slice(), path.as_ref()].concat()));
        Ok(TlvBuilder::new()
            .append(Tag::CardId, card_id.as_slice())
            .append(Tag::WalletPublicKey, public_key.as_slice())
            .append(Tag::WalletHdChain, Sha256::digest(&path).as_slice())
            .build()
            .expect("tlv"))
    }

    fn personalize(&mut self, request: &TlvDecoder) -> Result<Bytes, u16> {
        if self.status != CardStatus::NotPersonalized {
            return Err(SW_INVALID_STATE);
        }
        let decode_err = |_| SW_INVALID_PARAMS;
        self.card_id = request.raw(Tag::CardId).ok_or(SW_INVALID_PARAMS)?.to_vec();
        self.settings = request.decode(Tag::SettingsMask).map_err(decode_err)?;
        self.curves = request.decode_all(Tag::CurveId).map_err(decode_err)?;
        self.max_wallets = request.decode(Tag::MaxWallets).map_err(decode_err)?;
        self.access_code = hash_field(request, Tag::NewPin)?;
        self.passcode = hash_field(request, Tag::NewPin2)?;
        self.status = CardStatus::Empty;
        Ok(self.card_record().build().expect("tlv"))
    }

    fn depersonalize(&mut self) -> Result<Bytes, u16> {
        self.status = CardStatus::NotPersonalized;
        self.wallets.clear();
        self.access_code = code_hash("000000");
        self.passcode = code_hash("000");
        Ok(TlvBuilder::new()
            .append(Tag::CardId, self.card_id.as_slice())
            .build()
            .expect("tlv"))
    }
}

impl Default for SimulatedCard {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_field(request: &TlvDecoder, tag: Tag) -> Result<[u8; 32], u16> {
    request
        .raw(tag)
        .and_then(|v| <[u8; 32]>::try_from(v.as_ref()).ok())
        .ok_or(SW_INVALID_PARAMS)
}

fn response(body: Bytes, sw: u16) -> Bytes {
    let mut out = BytesMut::with_capacity(body.len() + 2);
    out.put_slice(&body);
    out.put_u16(sw);
    out.freeze()
}

#[async_trait]
impl CardTransport for SimulatedCard {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        self.connects += 1;
        Ok(())
    }

    async fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if !self.connected {
            return Err(TransportError::Connection);
        }
        self.frames.push(Bytes::copy_from_slice(command));
        if self.stall_ins.is_some() && command.get(1).copied() == self.stall_ins {
            self.stalled.notify_one();
            return std::future::pending().await;
        }

        if let Some(error) = self.failures.pop_front() {
            if error == TransportError::TagLost {
                self.connected = false;
            }
            return Err(error);
        }
        Ok(self.respond(command))
    }

    async fn disconnect(&mut self) {
        self.connected = false;
        self.session_key = None;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Delegate that records everything and answers code prompts from a queue
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    pub codes: Mutex<VecDeque<Option<String>>>,
    pub prompts: Mutex<Vec<u8>>,
    pub delays: Mutex<Vec<Duration>>,
    pub states: Mutex<Vec<SessionState>>,
    /// Cancel the session as soon as a security delay starts
    pub cancel_on_delay: Mutex<Option<CancelHandle>>,
}

impl RecordingDelegate {
    pub fn with_codes(codes: impl IntoIterator<Item = Option<&'static str>>) -> Self {
        Self {
            codes: Mutex::new(codes.into_iter().map(|c| c.map(String::from)).collect()),
            ..Default::default()
        }
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().unwrap().clone()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<u8> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionDelegate for RecordingDelegate {
    async fn request_access_code(&self, attempt: u8) -> Option<String> {
        self.prompts.lock().unwrap().push(attempt);
        self.codes.lock().unwrap().pop_front().flatten()
    }

    fn security_delay(&self, remaining: Duration) {
        self.delays.lock().unwrap().push(remaining);
        if let Some(handle) = self.cancel_on_delay.lock().unwrap().as_ref() {
            handle.cancel();
        }
    }

    fn state_changed(&self, state: SessionState) {
        self.states.lock().unwrap().push(state);
    }
}
