//! Session state machine
//!
//! A [`CardSession`] owns one transport and one [`SessionEnvironment`] and
//! sequences commands against the card in the field:
//!
//! ```text
//! Idle -> Connecting -> [PreflightReading] -> Running <-> Paused(delay)
//!                                                |
//!                                           Completing -> Closed | Failed
//! ```
//!
//! Frames are exchanged strictly one at a time. Security-delay pauses and
//! transport exchanges race against the cancellation signal, so a cancelled
//! session never transmits another frame.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cardlink_apdu_core::{
    CardError, CardTransport, EncryptionMode, ResponseApdu, StatusOutcome, TransportError,
};
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace, warn};

use crate::commands::{Command, OpenSessionCommand, ReadCommand};
use crate::config::{PreflightMode, SessionConfig};
use crate::crypto::{CryptoProvider, KeyPair, fast_session_key, strong_session_key};
use crate::delegate::{NoopDelegate, SessionDelegate};
use crate::environment::{SessionEnvironment, UserCode};
use crate::frame;
use crate::tasks::{CardTask, ReadWalletsListTask};
use crate::tlv::{Tag, TlvDecoder};
use crate::types::{Card, CardSettings, EllipticCurve};
use crate::{Error, Result};

/// Length of the terminal nonce for fast encryption
const FAST_NONCE_LEN: usize = 16;

/// Lifecycle of a [`CardSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started
    Idle,
    /// Establishing the link
    Connecting,
    /// Reading the card record before handing over to the caller
    PreflightReading,
    /// Accepting commands
    Running,
    /// Waiting out a card-enforced security delay
    Paused(Duration),
    /// Tearing down after success
    Completing,
    /// Torn down after success
    Closed,
    /// Torn down after a terminal error
    Failed,
}

impl SessionState {
    /// Whether commands may be sent
    pub const fn accepts_commands(&self) -> bool {
        matches!(self, Self::Running | Self::PreflightReading)
    }

    /// Whether the session may be (re)started
    pub const fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Closed | Self::Failed)
    }
}

/// Cancels a session from outside, e.g. from a UI button
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    /// Request cancellation. No further frame is transmitted.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Resolves once cancellation has been requested
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            // Sender gone: cancellation can no longer happen
            std::future::pending::<()>().await;
        }
    }
}

/// Run `future` unless cancellation wins the race
async fn cancellable<F: Future>(mut cancel: watch::Receiver<bool>, future: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        () = cancelled(&mut cancel) => Err(Error::UserCancelled),
        output = future => Ok(output),
    }
}

/// One interaction with one physical card
#[derive(Debug)]
pub struct CardSession<T: CardTransport> {
    transport: T,
    config: SessionConfig,
    environment: SessionEnvironment,
    delegate: Arc<dyn SessionDelegate>,
    state: SessionState,
    cancel: Arc<watch::Sender<bool>>,
}

impl<T: CardTransport> CardSession<T> {
    /// Create a session over `transport`
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            transport,
            config,
            environment: SessionEnvironment::default(),
            delegate: Arc::new(NoopDelegate),
            state: SessionState::Idle,
            cancel: Arc::new(cancel),
        }
    }

    /// Use `delegate` for prompts and progress
    pub fn with_delegate(mut self, delegate: Arc<dyn SessionDelegate>) -> Self {
        self.delegate = delegate;
        self
    }

    /// Use `crypto` instead of [`crate::crypto::SoftwareCrypto`]
    pub fn with_crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.environment.crypto = crypto;
        self
    }

    /// Identify the terminal with `keys`
    pub fn with_terminal_keys(mut self, keys: KeyPair) -> Self {
        self.environment.terminal_keys = Some(keys);
        self
    }

    /// Current state
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Session configuration
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Shared command state
    pub const fn environment(&self) -> &SessionEnvironment {
        &self.environment
    }

    pub(crate) const fn environment_mut(&mut self) -> &mut SessionEnvironment {
        &mut self.environment
    }

    /// Card record read in this session
    pub const fn card(&self) -> Option<&Card> {
        self.environment.card.as_ref()
    }

    /// Underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Handle that cancels this session
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Session state changed");
            self.state = state;
            self.delegate.state_changed(state);
        }
    }

    /// Fresh environment for a new start; crypto and terminal keys carry over
    fn reset_environment(&mut self) {
        let crypto = Arc::clone(&self.environment.crypto);
        let access_code = self.config.access_code.as_deref().map_or_else(
            UserCode::default_access_code,
            |code| UserCode::from_hash(crypto.sha256(code.as_bytes())),
        );
        let passcode = self.config.passcode.as_deref().map_or_else(
            UserCode::default_passcode,
            |code| UserCode::from_hash(crypto.sha256(code.as_bytes())),
        );

        self.environment = SessionEnvironment {
            encryption_mode: self.config.encryption_mode,
            encryption_key: None,
            access_code,
            passcode,
            terminal_keys: self.environment.terminal_keys.take(),
            card: None,
            legacy_mode: self.config.legacy_mode,
            crypto,
        };
    }

    /// Connect and run the configured preflight
    ///
    /// On failure the session is left in [`SessionState::Failed`].
    #[instrument(level = "debug", skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        if !self.state.can_start() {
            return Err(Error::InvalidSessionState(self.state));
        }

        let result = self.open().await;
        if let Err(e) = &result {
            warn!(error = %e, "Session start failed");
            self.fail().await;
        }
        result
    }

    async fn open(&mut self) -> Result<()> {
        self.reset_environment();
        self.set_state(SessionState::Connecting);
        cancellable(self.cancel.subscribe(), self.transport.connect()).await??;

        if self.config.preflight != PreflightMode::None {
            self.set_state(SessionState::PreflightReading);
            self.preflight().await?;
        }

        self.set_state(SessionState::Running);
        Ok(())
    }

    /// Read the card, asking the delegate for the access code when the
    /// card rejects the current one
    async fn preflight(&mut self) -> Result<()> {
        let mut attempt = 0u8;
        loop {
            match self.execute(&ReadCommand::new()).await {
                Ok(_) => break,
                Err(Error::AccessCodeRequired) if attempt < self.config.access_code_attempts => {
                    attempt += 1;
                    let delegate = Arc::clone(&self.delegate);
                    let code =
                        cancellable(self.cancel.subscribe(), delegate.request_access_code(attempt))
                            .await?
                            .ok_or(Error::UserCancelled)?;

                    debug!(attempt, "Retrying preflight with user access code");
                    self.environment.access_code =
                        UserCode::from_hash(self.environment.crypto.sha256(code.as_bytes()));
                    // Any negotiated key was derived from the old code
                    self.environment.encryption_key = None;
                }
                Err(e) => return Err(e),
            }
        }

        let card = self.environment.card()?;
        if let Some(filter) = &self.config.card_filter {
            if !filter.accepts(card) {
                warn!(card_id = %card.card_id, "Card rejected by filter");
                return Err(Error::WrongCard);
            }
        }
        info!(card_id = %card.card_id, firmware = %card.firmware_version, "Card connected");

        if self.config.preflight == PreflightMode::FullCardRead && card.supports_multiple_wallets() {
            ReadWalletsListTask.run(self).await?;
        }
        Ok(())
    }

    /// Send one command and return its typed result
    ///
    /// Errors that end the session (cancellation, transport loss, wrong
    /// card) move it to [`SessionState::Failed`]; other errors leave it
    /// running so that a task can decide how to proceed.
    #[instrument(level = "debug", skip_all, fields(ins = C::INS))]
    pub async fn send<C: Command>(&mut self, command: &C) -> Result<C::Response> {
        if !self.state.accepts_commands() {
            return Err(Error::InvalidSessionState(self.state));
        }

        let result = self.execute(command).await;
        if let Err(e) = &result {
            if e.is_session_fatal() {
                warn!(error = %e, "Session-fatal error");
                self.fail().await;
            }
        }
        result
    }

    async fn execute<C: Command>(&mut self, command: &C) -> Result<C::Response> {
        if command.requires_wallet_list() && self.card().is_some_and(Card::has_unread_wallets) {
            debug!(ins = C::INS, "Reading wallet list before command");
            ReadWalletsListTask.run(self).await?;
        }
        command.precondition(self.environment.card.as_ref())?;
        if command.requires_encryption() {
            self.ensure_encryption().await?;
        }

        let mut upgraded = false;
        loop {
            match self.dispatch(command).await {
                Err(Error::Card(CardError::NeedEncryption))
                    if !upgraded
                        && command.requires_encryption()
                        && self.environment.encryption_mode == EncryptionMode::None =>
                {
                    upgraded = true;
                    let mode = self.upgraded_mode();
                    info!(%mode, "Card requires encryption, upgrading");
                    self.environment.encryption_mode = mode;
                    self.ensure_encryption().await?;
                }
                result => return result.map_err(|e| remap(command, e)),
            }
        }
    }

    /// Mode to switch to when the card demands encryption
    fn upgraded_mode(&self) -> EncryptionMode {
        match &self.environment.card {
            Some(card) if !card.settings.contains(CardSettings::ALLOW_FAST_ENCRYPTION) => {
                EncryptionMode::Strong
            }
            _ => EncryptionMode::Fast,
        }
    }

    /// Negotiate a session key for the current mode unless one exists
    async fn ensure_encryption(&mut self) -> Result<()> {
        if self.environment.encryption_key.is_some() {
            return Ok(());
        }

        let mode = self.environment.encryption_mode;
        let crypto = Arc::clone(&self.environment.crypto);
        let key = match mode {
            EncryptionMode::None => return Ok(()),
            EncryptionMode::Fast => {
                let nonce_a = crypto.random_bytes(FAST_NONCE_LEN);
                let command = OpenSessionCommand::new(mode, nonce_a.clone());
                let response = self
                    .dispatch(&command)
                    .await
                    .map_err(|e| remap(&command, e))?;
                fast_session_key(
                    self.environment.access_code.hash(),
                    &nonce_a,
                    &response.session_key_b,
                )
            }
            EncryptionMode::Strong => {
                let ephemeral = crypto.generate_key_pair(EllipticCurve::Secp256k1)?;
                let command = OpenSessionCommand::new(mode, ephemeral.public_key.clone());
                let response = self
                    .dispatch(&command)
                    .await
                    .map_err(|e| remap(&command, e))?;
                let shared = crypto.ecdh(&ephemeral.private_key, &response.session_key_b)?;
                strong_session_key(shared.as_slice(), self.environment.access_code.hash())
            }
        };

        debug!(%mode, "Session key established");
        self.environment.encryption_key = Some(key);
        Ok(())
    }

    /// Serialize once, exchange (pausing as often as the card asks), then
    /// deserialize
    async fn dispatch<C: Command>(&mut self, command: &C) -> Result<C::Response> {
        let apdu = frame::build(command, &self.environment)?;
        let raw = apdu.to_bytes()?;
        let response = self.transceive(&raw).await?;
        command.deserialize(&mut self.environment, response)
    }

    async fn transceive(&mut self, raw: &Bytes) -> Result<ResponseApdu> {
        loop {
            let bytes = self.exchange(raw).await?;
            let response = frame::parse(&bytes, &self.environment)?;
            let status = response.status();
            trace!(status = format_args!("{:#06x}", status.to_u16()), "Parsed response");

            match status.outcome() {
                StatusOutcome::Success => return Ok(response),
                StatusOutcome::Pause => {
                    let delay = self.security_delay(&response);
                    self.pause(delay).await?;
                }
                StatusOutcome::Error(error) => {
                    debug!(%error, "Card reported an error");
                    return Err(Error::Card(error));
                }
            }
        }
    }

    /// Remaining delay reported with a pause, in centiseconds, or the
    /// configured interval
    fn security_delay(&self, response: &ResponseApdu) -> Duration {
        TlvDecoder::new(response.data())
            .ok()
            .and_then(|d| d.decode_optional::<u16>(Tag::Pause).ok().flatten())
            .map_or(self.config.security_delay_interval, |cs| {
                Duration::from_millis(u64::from(cs) * 10)
            })
    }

    async fn pause(&mut self, delay: Duration) -> Result<()> {
        let previous = self.state;
        self.set_state(SessionState::Paused(delay));
        self.delegate.security_delay(delay);
        debug!(?delay, "Waiting out security delay");

        let result = cancellable(self.cancel.subscribe(), tokio::time::sleep(delay)).await;
        self.set_state(previous);
        result
    }

    /// Exchange raw bytes, retrying transient transport failures
    async fn exchange(&mut self, raw: &[u8]) -> Result<Bytes> {
        let mut attempt = 0u8;
        loop {
            let result = cancellable(self.cancel.subscribe(), self.transport.transmit_raw(raw)).await?;
            match result {
                Ok(bytes) => return Ok(bytes),
                Err(TransportError::Cancelled) => return Err(Error::UserCancelled),
                Err(e) if e.is_transient() && attempt < self.config.transport_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "Transient transport error, retrying");
                    if !self.transport.is_connected() {
                        cancellable(self.cancel.subscribe(), self.transport.connect()).await??;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Close the session after success
    pub async fn stop(&mut self) {
        if self.state.can_start() {
            return;
        }
        self.set_state(SessionState::Completing);
        self.teardown().await;
        self.set_state(SessionState::Closed);
    }

    async fn fail(&mut self) {
        self.teardown().await;
        self.set_state(SessionState::Failed);
    }

    async fn teardown(&mut self) {
        self.transport.disconnect().await;
        self.environment.encryption_key = None;
        self.cancel.send_replace(false);
    }

    /// Run `task`, starting the session first if needed, and close it
    ///
    /// This is the single completion channel: the task output or its
    /// terminal error.
    #[instrument(level = "debug", skip_all, fields(task = ?task))]
    pub async fn run<K: CardTask>(&mut self, task: &K) -> Result<K::Output> {
        if !self.state.accepts_commands() {
            self.start().await?;
        }

        match task.run(self).await {
            Ok(output) => {
                self.stop().await;
                Ok(output)
            }
            Err(e) => {
                warn!(error = %e, "Task failed");
                self.fail().await;
                Err(e)
            }
        }
    }
}

/// Apply the command's remapping to card-reported errors
fn remap<C: Command>(command: &C, error: Error) -> Error {
    match error {
        Error::Card(e) => command.map_error(e),
        other => other,
    }
}
