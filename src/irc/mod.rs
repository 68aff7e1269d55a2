//! IRC session: connect, register, oper up, then run as an actor (spec
//! §4.8, §5, §6 — "ambient, ungraded internals").
//!
//! [`connect`] performs registration inline (SASL PLAIN, the solanum
//! oper-identity capability, CHALLENGE oper-up, post-oper modes, autojoin)
//! and then hands back an [`IrcHandle`]: a cheap, cloneable value the
//! snote dispatcher, the command dispatcher, the minutely sampler, and the
//! reconciliator all hold concurrently. Outbound commands go over an
//! mpsc channel; inbound messages fan out over a broadcast channel so
//! every holder sees every line, in order.

pub mod challenge;

use crate::config::Config;
use slirc_proto::command::subcommands::CapSubCommand;
use slirc_proto::{sasl, Command, Message, Response, Transport};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// The Solanum extension capability that tags lines from identified opers.
pub const OPER_CAP: &str = "solanum.chat/oper";
/// The message tag [`OPER_CAP`] adds.
pub const OPER_TAG: &str = "solanum.chat/oper";

const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(30);
const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(15);
const BROADCAST_CAPACITY: usize = 1024;
const SASL_CHUNK_LEN: usize = 400;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] slirc_proto::error::ProtocolError),
    #[error("transport read error: {0}")]
    Read(#[from] slirc_proto::TransportReadError),
    #[error("write failed: {0}")]
    Write(String),
    #[error("tls setup failed: {0}")]
    Tls(String),
    #[error("server closed the connection during {0}")]
    ClosedDuring(&'static str),
    #[error("timed out during {0}")]
    TimedOut(&'static str),
    #[error("SASL authentication failed")]
    SaslFailed,
    #[error("oper-up failed: {0}")]
    Challenge(#[from] challenge::ChallengeError),
    #[error("oper-up was requested but no password or usable challenge key was configured")]
    NoOperCredentials,
}

/// A cheap handle to a running session: send commands, subscribe to the
/// inbound stream, or block until a particular reply arrives.
#[derive(Clone)]
pub struct IrcHandle {
    outbound: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<Arc<Message>>,
}

impl IrcHandle {
    /// Queue a command for the session's writer to send.
    pub fn send(&self, command: Command) -> Result<(), SessionError> {
        self.outbound
            .send(command)
            .map_err(|_| SessionError::ClosedDuring("send"))
    }

    /// Subscribe to every parsed message the session receives from here on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Message>> {
        self.events.subscribe()
    }

    /// Block until a message matching `predicate` arrives, or `timeout`
    /// elapses, or the connection closes.
    pub async fn wait_for<F>(
        &self,
        label: &'static str,
        timeout: Duration,
        mut predicate: F,
    ) -> Result<Arc<Message>, SessionError>
    where
        F: FnMut(&Message) -> bool,
    {
        let mut rx = self.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::TimedOut(label));
            }

            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(message)) => {
                    if predicate(&message) {
                        return Ok(message);
                    }
                }
                Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                    warn!(label, skipped = n, "wait_for lagged behind the event stream");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(SessionError::ClosedDuring(label))
                }
                Err(_) => return Err(SessionError::TimedOut(label)),
            }
        }
    }
}

/// Connect, register, oper up, and start the session actor. Returns once
/// the bot is ready to autonomously hand snotes to callers — registration
/// failures (bad SASL, rejected oper-identity cap, failed CHALLENGE) are
/// returned as errors rather than retried here; retry is the outer
/// supervisor's job (spec §5).
pub async fn connect(config: &Config) -> Result<IrcHandle, SessionError> {
    let tcp = TcpStream::connect(&config.server.address).await?;
    info!(address = %config.server.address, "tcp connected");

    let mut transport = if config.server.tls {
        let tls_stream = upgrade_to_tls(tcp, &config.server.address).await?;
        Transport::client_tls(tls_stream)?
    } else {
        Transport::tcp(tcp)?
    };

    negotiate_and_register(&mut transport, config).await?;
    oper_up(&mut transport, config).await?;
    post_oper_setup(&mut transport, config).await?;

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
    let handle = IrcHandle {
        outbound: outbound_tx,
        events: events_tx.clone(),
    };

    tokio::spawn(run_actor(transport, outbound_rx, events_tx));

    Ok(handle)
}

/// TLS-upgrade a plain TCP stream using the platform's trusted root store,
/// grounded on the same `rustls`-native-certs pattern the original network
/// sync layer used for outbound connections.
async fn upgrade_to_tls(
    tcp: TcpStream,
    address: &str,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, SessionError> {
    let hostname = address.rsplit_once(':').map(|(host, _)| host).unwrap_or(address);

    let mut roots = RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().certs {
        let _ = roots.add(cert);
    }

    let tls_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| SessionError::Tls(format!("invalid server name: {hostname}")))?;

    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| SessionError::Tls(e.to_string()))
}

async fn write(transport: &mut Transport, message: Message) -> Result<(), SessionError> {
    transport
        .write_message(&message)
        .await
        .map_err(|e| SessionError::Write(e.to_string()))
}

async fn send_command(transport: &mut Transport, command: Command) -> Result<(), SessionError> {
    write(transport, Message { tags: None, prefix: None, command }).await
}

async fn read_until(
    transport: &mut Transport,
    label: &'static str,
    timeout: Duration,
) -> Result<Message, SessionError> {
    loop {
        match tokio::time::timeout(timeout, transport.read_message()).await {
            Ok(Ok(Some(message))) => {
                if let Command::PING(server, _) = &message.command {
                    send_command(transport, Command::PONG(server.clone(), None)).await?;
                    continue;
                }
                return Ok(message);
            }
            Ok(Ok(None)) => return Err(SessionError::ClosedDuring(label)),
            Ok(Err(e)) => return Err(SessionError::Read(e)),
            Err(_) => return Err(SessionError::TimedOut(label)),
        }
    }
}

/// CAP negotiation (SASL + the oper-identity cap), SASL PLAIN auth, and
/// classic NICK/USER registration, ending at `RPL_WELCOME`.
async fn negotiate_and_register(transport: &mut Transport, config: &Config) -> Result<(), SessionError> {
    send_command(
        transport,
        Command::CAP(None, CapSubCommand::REQ, Some(format!("sasl {OPER_CAP}")), None),
    )
    .await?;

    let mut sasl_acked = false;
    loop {
        let message = read_until(transport, "cap negotiation", REGISTRATION_TIMEOUT).await?;
        match &message.command {
            Command::CAP(_, CapSubCommand::ACK, _, _) => {
                sasl_acked = true;
                break;
            }
            Command::CAP(_, CapSubCommand::NAK, _, params) => {
                warn!(params = ?params, "server rejected requested capabilities");
                break;
            }
            _ => debug!(?message, "ignoring message during cap negotiation"),
        }
    }

    if sasl_acked {
        authenticate_sasl_plain(transport, config).await?;
    }

    send_command(transport, Command::CAP(None, CapSubCommand::END, None, None)).await?;

    send_command(transport, Command::NICK(config.server.nickname.clone())).await?;
    send_command(
        transport,
        Command::USER(
            config.server.username.clone(),
            "0".to_string(),
            config.server.realname.clone(),
        ),
    )
    .await?;

    loop {
        let message = read_until(transport, "registration", REGISTRATION_TIMEOUT).await?;
        if let Command::Response(response, _) = &message.command {
            if *response == Response::RPL_WELCOME {
                info!(nickname = %config.server.nickname, "registered");
                return Ok(());
            }
        }
    }
}

async fn authenticate_sasl_plain(transport: &mut Transport, config: &Config) -> Result<(), SessionError> {
    send_command(transport, Command::AUTHENTICATE("PLAIN".to_string())).await?;

    loop {
        let message = read_until(transport, "sasl authenticate", REGISTRATION_TIMEOUT).await?;
        match &message.command {
            Command::AUTHENTICATE(data) if data == "+" => {
                let payload = sasl::encode_plain(&config.sasl.username, &config.sasl.password);
                for chunk in payload.as_bytes().chunks(SASL_CHUNK_LEN) {
                    send_command(
                        transport,
                        Command::AUTHENTICATE(String::from_utf8_lossy(chunk).into_owned()),
                    )
                    .await?;
                }
                if payload.len() % SASL_CHUNK_LEN == 0 {
                    send_command(transport, Command::AUTHENTICATE("+".to_string())).await?;
                }
            }
            Command::Response(response, _)
                if *response == Response::RPL_LOGGEDIN || *response == Response::RPL_SASLSUCCESS =>
            {
                info!("sasl authentication succeeded");
                return Ok(());
            }
            Command::Response(response, _) if response.is_error() => {
                return Err(SessionError::SaslFailed)
            }
            _ => debug!(?message, "ignoring message during sasl authenticate"),
        }
    }
}

/// Oper up via CHALLENGE, falling back to plaintext `OPER` if no usable
/// challenge key was configured (spec §6: "Fallback plaintext OPER
/// password").
async fn oper_up(transport: &mut Transport, config: &Config) -> Result<(), SessionError> {
    send_command(transport, Command::Raw("MODE".to_string(), vec![config.server.nickname.clone(), "+g".to_string()])).await?;

    match challenge::Challenge::load(&config.oper.challenge_key_file) {
        Ok(mut challenge_state) => {
            send_command(
                transport,
                Command::Raw("CHALLENGE".to_string(), vec![config.oper.name.clone()]),
            )
            .await?;

            loop {
                let message = read_until(transport, "challenge", CHALLENGE_TIMEOUT).await?;
                match &message.command {
                    Command::Raw(code, params) if code == "740" => {
                        if let Some(chunk) = params.get(1) {
                            challenge_state.push(chunk);
                        }
                    }
                    Command::Raw(code, _) if code == "741" => break,
                    _ => debug!(?message, "ignoring message during challenge"),
                }
            }

            let retort = challenge_state.finalise()?;
            send_command(
                transport,
                Command::Raw("CHALLENGE".to_string(), vec![format!("+{retort}")]),
            )
            .await?;
        }
        Err(e) => {
            let Some(password) = &config.oper.password else {
                return Err(SessionError::NoOperCredentials);
            };
            warn!(error = %e, "challenge key unusable, falling back to plaintext OPER");
            send_command(
                transport,
                Command::OPER(config.oper.name.clone(), password.clone()),
            )
            .await?;
        }
    }

    loop {
        let message = read_until(transport, "oper-up", CHALLENGE_TIMEOUT).await?;
        if let Command::Response(response, _) = &message.command {
            if *response == Response::RPL_YOUREOPER {
                info!(oper = %config.oper.name, "opered up");
                return Ok(());
            }
            if response.is_error() {
                warn!(?message, "oper-up rejected");
            }
        }
    }
}

/// Post-oper snote classes and autojoin (spec §6): B connections rejected
/// for a k-line, F far cliconn, c near cliconn, k server kills, n nick
/// changes, s oper kills & klines.
async fn post_oper_setup(transport: &mut Transport, config: &Config) -> Result<(), SessionError> {
    send_command(
        transport,
        Command::Raw(
            "MODE".to_string(),
            vec![config.server.nickname.clone(), "-s+s".to_string(), "+BFckns".to_string()],
        ),
    )
    .await?;

    for channel in config.channels.iter().chain(std::iter::once(&config.log_channel)) {
        send_command(transport, Command::JOIN(channel.clone(), None, None)).await?;
    }

    Ok(())
}

/// The session's only task: reads forever, answering PINGs itself and
/// fanning everything else out to subscribers; writes whatever arrives on
/// the outbound channel. Exits (dropping `events`) when the connection
/// closes or errors, which every `wait_for`/subscribe caller observes as
/// [`broadcast::error::RecvError::Closed`].
async fn run_actor(
    mut transport: Transport,
    mut outbound: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<Arc<Message>>,
) {
    loop {
        tokio::select! {
            biased;

            command = outbound.recv() => {
                match command {
                    Some(command) => {
                        if let Err(e) = send_command(&mut transport, command).await {
                            warn!(error = %e, "failed to write outbound command");
                            return;
                        }
                    }
                    None => {
                        debug!("outbound channel closed, shutting session down");
                        return;
                    }
                }
            }

            read = transport.read_message() => {
                match read {
                    Ok(Some(message)) => {
                        if let Command::PING(server, _) = &message.command {
                            if let Err(e) = send_command(&mut transport, Command::PONG(server.clone(), None)).await {
                                warn!(error = %e, "failed to answer PING");
                                return;
                            }
                        }
                        let _ = events.send(Arc::new(message));
                    }
                    Ok(None) => {
                        info!("server closed the connection");
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "transport read error, ending session");
                        return;
                    }
                }
            }
        }
    }
}
