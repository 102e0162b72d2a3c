//! Built-in protocol client.
//!
//! The session itself is async (tokio sockets, tokio-rustls). [`WireClient`]
//! owns a current-thread runtime and blocks on it, so callers see a plain
//! synchronous [`NativeClient`]. Do not call it from inside another tokio
//! runtime.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::runtime::Runtime;
use tokio_rustls::client::TlsStream;

use super::{tls, NativeClient, OkStatus, PreparedInfo, QueryResult, StatementResult, TextRows};
use crate::bind::BindSet;
use crate::config::{Account, ConnectSettings, SslOptions};
use crate::error::{MariaError, MariaResult};
use crate::protocol::{
    self, auth, binary, capability, command, ColumnDef, ErrPacket, InitialHandshake, OkPacket,
    PrepareOk, HEADER_SIZE, MAX_PAYLOAD, SERVER_MORE_RESULTS_EXISTS,
};

const CLIENT_CAPABILITIES: u32 = capability::LONG_PASSWORD
    | capability::LONG_FLAG
    | capability::PROTOCOL_41
    | capability::TRANSACTIONS
    | capability::SECURE_CONNECTION
    | capability::MULTI_STATEMENTS
    | capability::MULTI_RESULTS
    | capability::PS_MULTI_RESULTS
    | capability::PLUGIN_AUTH;

/// Socket wrapper for plain TCP, unix sockets and TLS.
enum MysqlStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl MysqlStream {
    async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        match self {
            MysqlStream::Tcp(s) => s.read_exact(buf).await?,
            #[cfg(unix)]
            MysqlStream::Unix(s) => s.read_exact(buf).await?,
            MysqlStream::Tls(s) => s.read_exact(buf).await?,
        };
        Ok(())
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            MysqlStream::Tcp(s) => s.write_all(buf).await,
            #[cfg(unix)]
            MysqlStream::Unix(s) => s.write_all(buf).await,
            MysqlStream::Tls(s) => s.write_all(buf).await,
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            MysqlStream::Tcp(s) => s.shutdown().await,
            #[cfg(unix)]
            MysqlStream::Unix(s) => s.shutdown().await,
            MysqlStream::Tls(s) => s.shutdown().await,
        }
    }

    /// TLS or a local socket; safe for cleartext password exchange.
    fn is_secure(&self) -> bool {
        !matches!(self, MysqlStream::Tcp(_))
    }
}

async fn limit<T, F>(duration: Option<Duration>, what: &str, fut: F) -> MariaResult<T>
where
    F: Future<Output = MariaResult<T>>,
{
    match duration {
        Some(d) => tokio::time::timeout(d, fut).await.map_err(|_| {
            MariaError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{} timed out after {:?}", what, d),
            ))
        })?,
        None => fut.await,
    }
}

/// Raw result of one command response, before text/binary row decoding.
enum RawResult {
    Ok(OkPacket),
    Rows {
        columns: Vec<ColumnDef>,
        packets: Vec<Vec<u8>>,
        status: u16,
    },
}

impl RawResult {
    fn more_results(&self) -> bool {
        match self {
            RawResult::Ok(ok) => ok.more_results(),
            RawResult::Rows { status, .. } => status & SERVER_MORE_RESULTS_EXISTS != 0,
        }
    }
}

struct WireConnection {
    stream: MysqlStream,
    /// Next sequence id to send.
    seq: u8,
    server_version: String,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl WireConnection {
    async fn connect(account: &Account, settings: &ConnectSettings) -> MariaResult<Self> {
        let stream = match &account.unix_socket {
            #[cfg(unix)]
            Some(path) => MysqlStream::Unix(UnixStream::connect(path).await?),
            #[cfg(not(unix))]
            Some(_) => {
                return Err(MariaError::Config(
                    "unix sockets are not available on this platform".to_string(),
                ));
            }
            None => {
                let stream = TcpStream::connect((account.host_name.as_str(), account.port)).await?;
                stream.set_nodelay(true)?;
                MysqlStream::Tcp(stream)
            }
        };

        let mut conn = Self {
            stream,
            seq: 0,
            server_version: String::new(),
            read_timeout: settings.read_timeout,
            write_timeout: settings.write_timeout,
        };

        let packet = conn.read_packet().await?;
        let handshake = InitialHandshake::parse(&packet)?;
        tracing::debug!(
            server = %handshake.server_version,
            connection_id = handshake.connection_id,
            plugin = %handshake.auth_plugin_name,
            "received server handshake"
        );
        conn.server_version = handshake.server_version.clone();

        let mut caps = CLIENT_CAPABILITIES;
        if !account.schema.is_empty() {
            caps |= capability::CONNECT_WITH_DB;
        }
        caps &= handshake.capability_flags | capability::CONNECT_WITH_DB;

        if let (Some(ssl), MysqlStream::Tcp(_)) = (&account.ssl, &conn.stream) {
            if handshake.capability_flags & capability::SSL == 0 {
                return Err(MariaError::protocol("server does not support SSL"));
            }
            caps |= capability::SSL;
            conn.write_packet(&protocol::encode_ssl_request(caps, settings.charset))
                .await?;
            conn = conn.into_tls(ssl, &account.host_name).await?;
        }

        conn.authenticate(account, settings, &handshake, caps).await?;

        if let Some(init) = &settings.init_command {
            conn.query(init).await?;
        }
        Ok(conn)
    }

    async fn into_tls(self, ssl: &SslOptions, host: &str) -> MariaResult<Self> {
        let connector = tls::connector(ssl)?;
        let domain = tls::server_name(host)?;
        let Self {
            stream,
            seq,
            server_version,
            read_timeout,
            write_timeout,
        } = self;
        let tcp = match stream {
            MysqlStream::Tcp(tcp) => tcp,
            _ => return Err(MariaError::protocol("TLS upgrade needs a TCP stream")),
        };
        let tls = connector.connect(domain, tcp).await?;
        tracing::debug!("TLS established");
        Ok(Self {
            stream: MysqlStream::Tls(Box::new(tls)),
            seq,
            server_version,
            read_timeout,
            write_timeout,
        })
    }

    async fn authenticate(
        &mut self,
        account: &Account,
        settings: &ConnectSettings,
        handshake: &InitialHandshake,
        caps: u32,
    ) -> MariaResult<()> {
        let mut plugin = if handshake.auth_plugin_name.is_empty() {
            auth::NATIVE_PASSWORD.to_string()
        } else {
            handshake.auth_plugin_name.clone()
        };
        let response = auth::scramble(&plugin, &account.password, &handshake.auth_plugin_data)?;
        let packet = protocol::encode_handshake_response(
            caps,
            &account.user_name,
            &response,
            &account.schema,
            settings.charset,
            &plugin,
        );
        self.write_packet(&packet).await?;

        loop {
            let packet = self.read_packet().await?;
            match packet.first() {
                Some(0x00) => break,
                Some(0xff) => {
                    let err = ErrPacket::parse(&packet)?;
                    tracing::debug!(code = err.code, "authentication rejected");
                    return Err(err.into_error());
                }
                Some(0xfe) => {
                    // auth switch: plugin name, then a fresh scramble
                    let mut buf = &packet[1..];
                    plugin = String::from_utf8_lossy(protocol::read_null_string(&mut buf))
                        .into_owned();
                    let scramble = buf.strip_suffix(&[0u8]).unwrap_or(buf);
                    let response = auth::scramble(&plugin, &account.password, scramble)?;
                    self.write_packet(&response).await?;
                }
                Some(0x01) if plugin == auth::CACHING_SHA2 => match packet.get(1) {
                    Some(0x03) => continue, // fast auth, OK packet follows
                    Some(0x04) if self.stream.is_secure() => {
                        let mut clear = account.password.as_bytes().to_vec();
                        clear.push(0);
                        self.write_packet(&clear).await?;
                    }
                    Some(0x04) => {
                        return Err(MariaError::Auth(
                            "caching_sha2_password full authentication needs TLS or a unix socket"
                                .to_string(),
                        ));
                    }
                    other => {
                        return Err(MariaError::protocol(format!(
                            "unexpected caching_sha2 state {:?}",
                            other
                        )));
                    }
                },
                other => {
                    return Err(MariaError::protocol(format!(
                        "unexpected auth response {:?}, packet len {}",
                        other,
                        packet.len()
                    )));
                }
            }
        }
        tracing::debug!(user = %account.user_name, "authenticated");
        Ok(())
    }

    // ==================== Packets ====================

    async fn write_packet(&mut self, payload: &[u8]) -> MariaResult<()> {
        let timeout = self.write_timeout;
        limit(timeout, "write", async {
            let mut chunks = payload.chunks(MAX_PAYLOAD).peekable();
            if chunks.peek().is_none() {
                let framed = protocol::frame(self.seq, &[]);
                self.seq = self.seq.wrapping_add(1);
                self.stream.write_all(&framed).await?;
                return Ok(());
            }
            while let Some(chunk) = chunks.next() {
                let framed = protocol::frame(self.seq, chunk);
                self.seq = self.seq.wrapping_add(1);
                self.stream.write_all(&framed).await?;
                if chunks.peek().is_none() && chunk.len() == MAX_PAYLOAD {
                    let empty = protocol::frame(self.seq, &[]);
                    self.seq = self.seq.wrapping_add(1);
                    self.stream.write_all(&empty).await?;
                }
            }
            Ok(())
        })
        .await
    }

    /// Read one logical packet, joining 16 MiB continuation packets.
    async fn read_packet(&mut self) -> MariaResult<Vec<u8>> {
        let timeout = self.read_timeout;
        limit(timeout, "read", async {
            let mut payload = Vec::new();
            loop {
                let mut header = [0u8; HEADER_SIZE];
                self.stream.read_exact(&mut header).await?;
                let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
                self.seq = header[3].wrapping_add(1);

                let start = payload.len();
                payload.resize(start + len, 0);
                self.stream.read_exact(&mut payload[start..]).await?;
                if len < MAX_PAYLOAD {
                    return Ok(payload);
                }
            }
        })
        .await
    }

    async fn send_command(&mut self, payload: &[u8]) -> MariaResult<()> {
        self.seq = 0;
        self.write_packet(payload).await
    }

    /// Read one result: OK packet, or column definitions plus row packets.
    async fn read_result(&mut self) -> MariaResult<RawResult> {
        let first = self.read_packet().await?;
        protocol::check_err(&first)?;
        if protocol::is_ok(&first) {
            return Ok(RawResult::Ok(OkPacket::parse(&first)?));
        }
        if first.first() == Some(&0xfb) {
            return Err(MariaError::protocol("LOAD DATA LOCAL INFILE is not supported"));
        }

        let mut buf = &first[..];
        let count = protocol::read_len_enc_int(&mut buf)?.unwrap_or(0) as usize;
        let columns = self.read_columns(count).await?;

        let mut packets = Vec::new();
        loop {
            let packet = self.read_packet().await?;
            if protocol::is_eof(&packet) {
                let status = protocol::eof_status(&packet);
                return Ok(RawResult::Rows {
                    columns,
                    packets,
                    status,
                });
            }
            protocol::check_err(&packet)?;
            packets.push(packet);
        }
    }

    /// `count` column definitions followed by an EOF packet.
    async fn read_columns(&mut self, count: usize) -> MariaResult<Vec<ColumnDef>> {
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            let packet = self.read_packet().await?;
            columns.push(ColumnDef::parse(&packet)?);
        }
        if count > 0 {
            let eof = self.read_packet().await?;
            protocol::check_err(&eof)?;
        }
        Ok(columns)
    }

    // ==================== Commands ====================

    async fn query(&mut self, sql: &str) -> MariaResult<Vec<QueryResult>> {
        tracing::debug!(sql = %sql, "COM_QUERY");
        self.send_command(&protocol::encode_query(sql)).await?;

        let mut results = Vec::new();
        loop {
            let raw = self.read_result().await?;
            let more = raw.more_results();
            results.push(match raw {
                RawResult::Ok(ok) => QueryResult::Done(OkStatus::from(ok)),
                RawResult::Rows {
                    columns, packets, ..
                } => {
                    let rows = packets
                        .iter()
                        .map(|p| protocol::parse_text_row(p, columns.len()))
                        .collect::<MariaResult<Vec<_>>>()?;
                    QueryResult::Rows(TextRows { columns, rows })
                }
            });
            if !more {
                return Ok(results);
            }
        }
    }

    async fn simple_command(&mut self, command: u8, payload: &[u8]) -> MariaResult<()> {
        self.send_command(&protocol::encode_command(command, payload)).await?;
        let packet = self.read_packet().await?;
        protocol::check_err(&packet)
    }

    async fn prepare(&mut self, sql: &str) -> MariaResult<PreparedInfo> {
        tracing::debug!(sql = %sql, "COM_STMT_PREPARE");
        self.send_command(&protocol::encode_command(command::STMT_PREPARE, sql.as_bytes()))
            .await?;
        let packet = self.read_packet().await?;
        protocol::check_err(&packet)?;
        let ok = PrepareOk::parse(&packet)?;

        // parameter definitions carry nothing the binder needs
        self.read_columns(ok.num_params as usize).await?;
        let columns = self.read_columns(ok.num_columns as usize).await?;

        Ok(PreparedInfo {
            id: ok.statement_id,
            params: ok.num_params as usize,
            columns,
        })
    }

    async fn execute(&mut self, statement_id: u32, params: &BindSet) -> MariaResult<StatementResult> {
        tracing::debug!(statement_id, params = params.len(), "COM_STMT_EXECUTE");
        self.send_command(&binary::encode_execute(statement_id, params)).await?;

        let raw = self.read_result().await?;
        let mut more = raw.more_results();
        // trailing results (stored procedures) are drained and dropped
        while more {
            more = self.read_result().await?.more_results();
        }
        Ok(match raw {
            RawResult::Ok(ok) => StatementResult::Done(OkStatus::from(ok)),
            RawResult::Rows {
                columns, packets, ..
            } => StatementResult::Rows { columns, packets },
        })
    }

    async fn close_statement(&mut self, statement_id: u32) -> MariaResult<()> {
        self.send_command(&binary::encode_close(statement_id)).await
    }

    async fn quit(&mut self) -> MariaResult<()> {
        self.send_command(&[command::QUIT]).await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Synchronous facade over [`WireConnection`].
pub struct WireClient {
    runtime: Runtime,
    conn: Option<WireConnection>,
    server_version: String,
}

impl WireClient {
    pub fn connect(account: &Account) -> MariaResult<Self> {
        let settings = account.connect_settings()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        tracing::debug!(address = %account.address(), "connecting");
        let conn = runtime.block_on(limit(
            settings.connect_timeout,
            "connect",
            WireConnection::connect(account, &settings),
        ))?;

        Ok(Self {
            runtime,
            server_version: conn.server_version.clone(),
            conn: Some(conn),
        })
    }

    fn conn(&mut self) -> MariaResult<(&Runtime, &mut WireConnection)> {
        match self.conn.as_mut() {
            Some(conn) => Ok((&self.runtime, conn)),
            None => Err(MariaError::NotConnected),
        }
    }
}

impl NativeClient for WireClient {
    fn query(&mut self, sql: &str) -> MariaResult<Vec<QueryResult>> {
        let (rt, conn) = self.conn()?;
        rt.block_on(conn.query(sql))
    }

    fn select_db(&mut self, schema: &str) -> MariaResult<()> {
        let (rt, conn) = self.conn()?;
        rt.block_on(conn.simple_command(command::INIT_DB, schema.as_bytes()))
    }

    fn prepare(&mut self, sql: &str) -> MariaResult<PreparedInfo> {
        let (rt, conn) = self.conn()?;
        rt.block_on(conn.prepare(sql))
    }

    fn execute(&mut self, statement_id: u32, params: &BindSet) -> MariaResult<StatementResult> {
        let (rt, conn) = self.conn()?;
        rt.block_on(conn.execute(statement_id, params))
    }

    fn close_statement(&mut self, statement_id: u32) -> MariaResult<()> {
        let (rt, conn) = self.conn()?;
        rt.block_on(conn.close_statement(statement_id))
    }

    fn ping(&mut self) -> MariaResult<()> {
        let (rt, conn) = self.conn()?;
        rt.block_on(conn.simple_command(command::PING, &[]))
    }

    fn server_version(&self) -> &str {
        &self.server_version
    }

    fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = self.runtime.block_on(conn.quit()) {
                tracing::debug!(error = %e, "error while closing connection");
            }
        }
    }
}

impl Drop for WireClient {
    fn drop(&mut self) {
        self.close();
    }
}
