//! Session scenarios against a simulated card

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cardlink_apdu_core::{CardError, CommandApdu};
use cardlink_wallet::commands::{CardConfig, CreateWalletCommand, PurgeWalletCommand};
use cardlink_wallet::tasks::{
    CommandTask, DeriveWalletPublicKeysTask, PersonalizeTask, ScanTask, SignHashesTask,
};
use cardlink_wallet::types::{
    CardId, CardSettings, CardStatus, DerivationPath, EllipticCurve, ManufactureDate,
};
use cardlink_wallet::{
    CardFilter, CardSession, EncryptionMode, Error, PreflightMode, SessionConfig, SessionState,
    TransportError, UserCode,
};
use common::*;

fn session(card: SimulatedCard, config: SessionConfig) -> (CardSession<SimulatedCard>, Arc<RecordingDelegate>) {
    session_with(card, config, RecordingDelegate::default())
}

fn session_with(
    card: SimulatedCard,
    config: SessionConfig,
    delegate: RecordingDelegate,
) -> (CardSession<SimulatedCard>, Arc<RecordingDelegate>) {
    init_tracing();
    let delegate = Arc::new(delegate);
    let session = CardSession::new(card, config).with_delegate(delegate.clone());
    (session, delegate)
}

fn path(s: &str) -> DerivationPath {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_scan_collects_every_wallet_across_pages() {
    let mut card = SimulatedCard::new().with_wallets(7);
    card.page_sizes = [3, 2, 5].into();
    card.page_overlap = 1;
    let (mut session, delegate) = session(card, SessionConfig::default());

    let scanned = session.run(&ScanTask::new()).await.unwrap();

    let indices: Vec<u8> = scanned.card.wallets.iter().map(|w| w.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 6]);
    assert_eq!(scanned.card.wallets_count, 7);
    assert!(scanned.attestation.is_none());

    assert_eq!(session.state(), SessionState::Closed);
    let states = delegate.states();
    assert_eq!(
        states[..3],
        [SessionState::Connecting, SessionState::PreflightReading, SessionState::Running]
    );
    assert_eq!(states[states.len() - 2..], [SessionState::Completing, SessionState::Closed]);
}

#[tokio::test]
async fn test_scan_with_attestation() {
    let (mut session, _) = session(SimulatedCard::new().with_wallets(1), SessionConfig::default());

    let scanned = session.run(&ScanTask::new().with_attestation()).await.unwrap();

    let attestation = scanned.attestation.unwrap();
    assert_eq!(attestation.salt.as_ref(), &ATTEST_SALT);
    assert!(!scanned.attestation_cached);
}

#[tokio::test(start_paused = true)]
async fn test_security_delay_resends_same_frame() {
    let mut card = SimulatedCard::new();
    card.pauses = [Some(150)].into();
    let (mut session, delegate) = session(card, SessionConfig::default());

    session.start().await.unwrap();

    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(delegate.delays(), vec![Duration::from_millis(1500)]);
    assert!(delegate.states().contains(&SessionState::Paused(Duration::from_millis(1500))));

    let frames = &session.transport().frames;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], frames[1]);
}

#[tokio::test(start_paused = true)]
async fn test_security_delay_without_pause_record_uses_interval() {
    let mut card = SimulatedCard::new();
    card.pauses = [None, None].into();
    let config = SessionConfig::default().with_security_delay_interval(Duration::from_millis(250));
    let (mut session, delegate) = session(card, config);

    session.start().await.unwrap();

    assert_eq!(delegate.delays(), vec![Duration::from_millis(250); 2]);
    assert_eq!(session.transport().frames.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_security_delay() {
    let mut card = SimulatedCard::new();
    card.pauses = [Some(3000)].into();
    let (mut session, delegate) = session(card, SessionConfig::default());
    *delegate.cancel_on_delay.lock().unwrap() = Some(session.cancel_handle());

    let result = session.run(&ScanTask::new()).await;

    assert!(matches!(result, Err(Error::UserCancelled)));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.transport().frames.len(), 1);
    assert!(!session.transport().connected);
    assert!(!session.cancel_handle().is_cancelled());
}

#[tokio::test]
async fn test_cancel_before_start() {
    let (mut session, _) = session(SimulatedCard::new(), SessionConfig::default());
    session.cancel_handle().cancel();

    let result = session.start().await;

    assert!(matches!(result, Err(Error::UserCancelled)));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(session.transport().frames.is_empty());
}

#[tokio::test]
async fn test_cancel_while_exchange_is_pending() {
    let mut card = SimulatedCard::new().with_wallets(1);
    card.stall_ins = Some(INS_SIGN);
    let stalled = Arc::clone(&card.stalled);
    let wallet = card.wallet_key(0);
    let (mut session, _) = session(card, SessionConfig::default());

    let handle = session.cancel_handle();
    let canceller = tokio::spawn(async move {
        stalled.notified().await;
        handle.cancel();
    });

    let result = session
        .run(&SignHashesTask::new(vec![Bytes::from_static(&[1; 32])], wallet))
        .await;
    canceller.await.unwrap();

    assert!(matches!(result, Err(Error::UserCancelled)));
    assert_eq!(session.state(), SessionState::Failed);
    let transport = session.transport();
    assert_eq!(transport.frames_with_ins(INS_SIGN).len(), 1);
    let last = CommandApdu::from_bytes(transport.frames.last().unwrap()).unwrap();
    assert_eq!(last.instruction(), INS_SIGN);
    assert_eq!(transport.wallets[0].signed, 0);
    assert!(!transport.connected);
}

#[tokio::test]
async fn test_upgrades_to_fast_encryption_on_demand() {
    let mut card = SimulatedCard::new().with_wallets(1);
    card.require_encryption = true;
    let (mut session, _) = session(card, SessionConfig::default());

    session.start().await.unwrap();

    assert_eq!(session.environment().encryption_mode, EncryptionMode::Fast);
    assert!(session.environment().encryption_key.is_some());

    let frames = session.transport().frames_with_ins(INS_READ);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].p1(), 0x00);
    assert_eq!(frames[1].p1(), 0x01);
    assert_ne!(frames[0].data(), frames[1].data());

    let open = session.transport().frames_with_ins(INS_OPEN_SESSION);
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].p1(), 0x01);
}

#[tokio::test]
async fn test_upgrade_falls_back_to_strong_without_fast_setting() {
    let mut card = SimulatedCard::new().with_wallets(2);
    card.settings.remove(CardSettings::ALLOW_FAST_ENCRYPTION);
    card.require_encryption = true;
    card.plain_ins.push(INS_READ);
    let wallet = card.wallet_key(0);
    let config = SessionConfig::default().with_preflight(PreflightMode::FullCardRead);
    let (mut session, _) = session(card, config);

    let signatures = session
        .run(&SignHashesTask::new(vec![Bytes::from_static(&[0xAB; 32])], wallet))
        .await
        .unwrap();

    assert_eq!(signatures.len(), 1);
    let transport = session.transport();
    let open = transport.frames_with_ins(INS_OPEN_SESSION);
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].p1(), 0x02);
    let sign = transport.frames_with_ins(INS_SIGN);
    assert_eq!(sign.len(), 2);
    assert_eq!(sign[1].p1(), 0x02);
}

#[tokio::test]
async fn test_strong_encryption_upfront() {
    let config = SessionConfig::default().with_encryption_mode(EncryptionMode::Strong);
    let (mut session, _) = session(SimulatedCard::new(), config);

    session.start().await.unwrap();

    let frames = &session.transport().frames;
    assert_eq!(frames.len(), 2);
    let open = session.transport().frames_with_ins(INS_OPEN_SESSION);
    assert_eq!(open[0].p1(), 0x02);
    assert_eq!(session.transport().frames_with_ins(INS_READ)[0].p1(), 0x02);
    assert_eq!(session.card().unwrap().status, CardStatus::Empty);
}

#[tokio::test]
async fn test_access_code_prompt_until_accepted() {
    let mut card = SimulatedCard::new();
    card.access_code = code_hash("123456");
    let delegate = RecordingDelegate::with_codes([Some("111111"), Some("123456")]);
    let (mut session, delegate) = session_with(card, SessionConfig::default(), delegate);

    session.start().await.unwrap();

    assert_eq!(delegate.prompts(), vec![1, 2]);
    assert_eq!(session.environment().access_code.hash(), &code_hash("123456"));
    assert_eq!(session.transport().frames_with_ins(INS_READ).len(), 3);
}

#[tokio::test]
async fn test_access_code_prompt_dismissed() {
    let mut card = SimulatedCard::new();
    card.access_code = code_hash("123456");
    let delegate = RecordingDelegate::with_codes([None]);
    let (mut session, _) = session_with(card, SessionConfig::default(), delegate);

    let result = session.start().await;

    assert!(matches!(result, Err(Error::UserCancelled)));
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_access_code_attempts_exhausted() {
    let mut card = SimulatedCard::new();
    card.access_code = code_hash("123456");
    let delegate = RecordingDelegate::with_codes([Some("1"), Some("2")]);
    let config = SessionConfig::default().with_access_code_attempts(2);
    let (mut session, delegate) = session_with(card, config, delegate);

    let result = session.start().await;

    assert!(matches!(result, Err(Error::AccessCodeRequired)));
    assert_eq!(delegate.prompts(), vec![1, 2]);
}

#[tokio::test]
async fn test_card_filter_rejects_other_card() {
    let filter = CardFilter::default().with_card_id(CardId::new(vec![0xCB, 0x79, 0, 0, 0, 0, 0, 0x01]));
    let config = SessionConfig::default().with_card_filter(filter);
    let (mut session, _) = session(SimulatedCard::new(), config);

    let result = session.run(&ScanTask::new()).await;

    assert!(matches!(result, Err(Error::WrongCard)));
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_transient_transport_error_is_retried() {
    let mut card = SimulatedCard::new();
    card.failures = [TransportError::TagLost].into();
    let (mut session, _) = session(card, SessionConfig::default());

    session.start().await.unwrap();

    let transport = session.transport();
    assert_eq!(transport.connects, 2);
    assert_eq!(transport.frames.len(), 2);
    assert_eq!(transport.frames[0], transport.frames[1]);
}

#[tokio::test]
async fn test_transport_retries_exhausted() {
    let mut card = SimulatedCard::new();
    card.failures = [const { TransportError::Transmission }; 3].into();
    let config = SessionConfig::default().with_transport_retries(2);
    let (mut session, _) = session(card, config);

    let result = session.run(&ScanTask::new()).await;

    assert!(matches!(result, Err(Error::Transport(TransportError::Transmission))));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.transport().frames.len(), 3);
}

#[tokio::test]
async fn test_derive_skips_soft_failures() {
    let paths = vec![
        path("m/44'/0'/0'/0/0"),
        path("m/44'/0'/0'/0/1"),
        path("m/44'/0'/0'/0/2"),
    ];
    let mut card = SimulatedCard::new().with_wallets(1);
    card.derive_failures
        .insert(paths[1].to_bytes().to_vec(), SW_WALLET_NOT_FOUND);
    let wallet = card.wallet_key(0);
    let config = SessionConfig::default().with_preflight(PreflightMode::FullCardRead);
    let (mut session, _) = session(card, config);

    let derived = session
        .run(&DeriveWalletPublicKeysTask::new(wallet, paths.clone()))
        .await
        .unwrap();

    assert_eq!(derived.keys.len(), 2);
    assert!(derived.keys.contains_key(&paths[0]));
    assert!(derived.keys.contains_key(&paths[2]));
    assert_eq!(derived.failed.len(), 1);
    assert_eq!(derived.failed[0].0, paths[1]);
    assert!(matches!(derived.failed[0].1, Error::WalletNotFound));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_derive_hard_failure_without_results() {
    let paths = vec![path("m/44'/0'/0'/0/0"), path("m/44'/0'/0'/0/1")];
    let mut card = SimulatedCard::new().with_wallets(1);
    for p in &paths {
        card.derive_failures.insert(p.to_bytes().to_vec(), SW_INVALID_STATE);
    }
    let wallet = card.wallet_key(0);
    let config = SessionConfig::default().with_preflight(PreflightMode::FullCardRead);
    let (mut session, _) = session(card, config);

    let result = session.run(&DeriveWalletPublicKeysTask::new(wallet, paths)).await;

    assert!(matches!(result, Err(Error::Card(CardError::InvalidState))));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.transport().frames_with_ins(INS_DERIVE).len(), 1);
}

#[tokio::test]
async fn test_derive_hard_failure_after_results_keeps_partial() {
    let paths = vec![
        path("m/44'/0'/0'/0/0"),
        path("m/44'/0'/0'/0/1"),
        path("m/44'/0'/0'/0/2"),
    ];
    let mut card = SimulatedCard::new().with_wallets(1);
    card.derive_failures
        .insert(paths[1].to_bytes().to_vec(), SW_INVALID_STATE);
    let wallet = card.wallet_key(0);
    let config = SessionConfig::default().with_preflight(PreflightMode::FullCardRead);
    let (mut session, _) = session(card, config);

    let derived = session
        .run(&DeriveWalletPublicKeysTask::new(wallet, paths.clone()))
        .await
        .unwrap();

    assert_eq!(derived.keys.len(), 1);
    assert_eq!(derived.failed.len(), 1);
    assert_eq!(session.transport().frames_with_ins(INS_DERIVE).len(), 2);
}

#[tokio::test]
async fn test_sign_in_chunks() {
    let card = SimulatedCard::new().with_wallets(2);
    let wallet = card.wallet_key(1);
    let config = SessionConfig::default()
        .with_preflight(PreflightMode::FullCardRead)
        .with_sign_chunk_size(10);
    let (mut session, _) = session(card, config);

    let hashes: Vec<Bytes> = (0..25u8).map(|i| Bytes::from(vec![i; 32])).collect();
    let signatures = session
        .run(&SignHashesTask::new(hashes, wallet.clone()))
        .await
        .unwrap();

    assert_eq!(signatures.len(), 25);
    assert!(signatures.iter().all(|s| s.len() == 64));
    assert_ne!(signatures[0], signatures[1]);

    let transport = session.transport();
    assert_eq!(transport.frames_with_ins(INS_SIGN).len(), 3);
    assert_eq!(transport.wallets[1].signed, 25);
}

#[tokio::test]
async fn test_sign_unknown_wallet_fails_before_transmit() {
    let config = SessionConfig::default().with_preflight(PreflightMode::FullCardRead);
    let (mut session, _) = session(SimulatedCard::new().with_wallets(1), config);

    let result = session
        .run(&SignHashesTask::new(vec![Bytes::from_static(&[1; 32])], vec![0x02; 33]))
        .await;

    assert!(matches!(result, Err(Error::WalletNotFound)));
    assert!(session.transport().frames_with_ins(INS_SIGN).is_empty());
}

#[tokio::test]
async fn test_personalize_factory_card() {
    let config = CardConfig {
        card_id: CardId::new(CARD_ID.to_vec()),
        settings: CardSettings::ALLOW_FAST_ENCRYPTION | CardSettings::ALLOW_SET_PASSCODE,
        batch_id: Bytes::from_static(&[0x00, 0x42]),
        issuer_name: "CARDLINK".into(),
        manufacture_date: ManufactureDate {
            year: 2026,
            month: 3,
            day: 14,
        },
        curves: vec![EllipticCurve::Secp256k1, EllipticCurve::Ed25519Slip0010],
        max_wallets: 5,
        access_code: UserCode::new("246810"),
        passcode: UserCode::new("1357"),
    };
    let session_config = SessionConfig::default().with_preflight(PreflightMode::None);
    let (mut session, _) = session(SimulatedCard::factory(), session_config);

    let card = session.run(&PersonalizeTask::new(config)).await.unwrap();

    assert_eq!(card.status, CardStatus::Loaded);
    assert_eq!(card.max_wallets, 5);
    let curves: Vec<_> = card.wallets.iter().map(|w| (w.index, w.curve)).collect();
    assert_eq!(
        curves,
        vec![(0, EllipticCurve::Secp256k1), (1, EllipticCurve::Ed25519Slip0010)]
    );

    let transport = session.transport();
    assert_eq!(transport.access_code, code_hash("246810"));
    assert_eq!(transport.passcode, code_hash("1357"));
    assert_eq!(transport.wallets.len(), 2);
}

#[tokio::test]
async fn test_default_preflight_reads_wallets_before_sign() {
    let card = SimulatedCard::new().with_wallets(3);
    let wallet = card.wallet_key(2);
    let config = SessionConfig::default().with_sign_chunk_size(10);
    assert_eq!(config.preflight, PreflightMode::ReadCardOnly);
    let (mut session, _) = session(card, config);

    let hashes: Vec<Bytes> = (0..15u8).map(|i| Bytes::from(vec![i; 32])).collect();
    let signatures = session.run(&SignHashesTask::new(hashes, wallet)).await.unwrap();

    assert_eq!(signatures.len(), 15);
    let transport = session.transport();
    // card record, then a single wallet page shared by both chunks
    assert_eq!(transport.frames_with_ins(INS_READ).len(), 2);
    assert_eq!(transport.frames_with_ins(INS_SIGN).len(), 2);
    assert_eq!(transport.wallets[2].signed, 15);
}

#[tokio::test]
async fn test_default_preflight_derive_finds_wallet() {
    let paths = vec![path("m/44'/0'/0'/0/0"), path("m/44'/0'/0'/0/1")];
    let card = SimulatedCard::new().with_wallets(1);
    let wallet = card.wallet_key(0);
    let (mut session, _) = session(card, SessionConfig::default());

    let derived = session
        .run(&DeriveWalletPublicKeysTask::new(wallet, paths))
        .await
        .unwrap();

    assert_eq!(derived.keys.len(), 2);
    assert!(derived.failed.is_empty());
    assert_eq!(session.transport().frames_with_ins(INS_DERIVE).len(), 2);
}

#[tokio::test]
async fn test_default_preflight_create_wallet_takes_free_slot() {
    let (mut session, _) = session(SimulatedCard::new().with_wallets(2), SessionConfig::default());

    let created = session
        .run(&CommandTask(CreateWalletCommand::new(EllipticCurve::Secp256k1)))
        .await
        .unwrap();

    assert_eq!(created.wallet.index, 2);
    let indices: Vec<u8> = session.transport().wallets.iter().map(|w| w.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_default_preflight_purge_wallet() {
    let card = SimulatedCard::new().with_wallets(2);
    let wallet = card.wallet_key(1);
    let (mut session, _) = session(card, SessionConfig::default());

    session
        .run(&CommandTask(PurgeWalletCommand::new(wallet)))
        .await
        .unwrap();

    let indices: Vec<u8> = session.transport().wallets.iter().map(|w| w.index).collect();
    assert_eq!(indices, vec![0]);
}
