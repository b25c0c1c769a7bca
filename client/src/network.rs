use crate::error::ClientError;
use crate::input::forward_input;
use crate::session::{ChatSession, Reaction};
use log::{debug, error, info, warn};
use shared::{outbound_queue, write_lines, LineReader, Outbound, OUTBOUND_CAPACITY};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

/// Settings a client connects with
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Preferred display name; digits are appended if it is taken
    pub name: String,
    pub secret: String,
    pub host: String,
    pub port: u16,
}

pub struct Client {
    stream: TcpStream,
    session: ChatSession,
}

impl Client {
    /// Opens the TCP connection. Failure is never retried.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let addr = format!("{}:{}", config.host, config.port);
        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            warn!("Failed to connect to {}: {}", addr, e);
            ClientError::Communications
        })?;
        info!("Connected to {}", addr);

        Ok(Client {
            stream,
            session: ChatSession::new(config.name, config.secret),
        })
    }

    /// Talks to the server until the session ends.
    ///
    /// Lines from `input` are forwarded once the server has announced this
    /// client's arrival; chat events are written to `output`. Returns `Ok`
    /// when the user leaves or `input` runs out.
    pub async fn run<I, W>(self, input: I, output: &mut W) -> Result<(), ClientError>
    where
        I: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let Client {
            stream,
            mut session,
        } = self;
        let (read_half, write_half) = stream.into_split();

        let (outbound, queue) = outbound_queue(OUTBOUND_CAPACITY);
        let writer = tokio::spawn(async move {
            if let Err(e) = write_lines(write_half, queue).await {
                debug!("Writer stopped: {}", e);
            }
        });

        let (open, gate) = oneshot::channel();
        let mut input_task = tokio::spawn(forward_input(input, outbound.clone(), gate));

        let mut reader = LineReader::new(read_half);
        // A finished input task wins over a server frame arriving at the
        // same time, so a typed leave always exits cleanly.
        let outcome = tokio::select! {
            biased;
            end = &mut input_task => match end {
                Ok(end) => {
                    info!("Input finished: {:?}", end);
                    Ok(())
                }
                Err(e) => {
                    error!("Input task failed: {}", e);
                    Err(ClientError::Communications)
                }
            },
            result = converse(&mut session, &mut reader, &outbound, output, open) => result,
        };

        input_task.abort();
        drop(outbound);
        if let Err(e) = writer.await {
            error!("Writer task panicked: {}", e);
        }

        outcome
    }
}

/// Reacts to server frames until one of them ends the session.
async fn converse<R, W>(
    session: &mut ChatSession,
    reader: &mut LineReader<R>,
    outbound: &Outbound,
    output: &mut W,
    open: oneshot::Sender<()>,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut open = Some(open);

    loop {
        let frame = reader.next_frame().await;
        match session.react(&frame)? {
            Reaction::Reply(line) => {
                if outbound.send(line).await.is_err() {
                    return Err(ClientError::Communications);
                }
            }
            Reaction::Show(line) => show(output, &line).await?,
            Reaction::Joined(line) => {
                show(output, &line).await?;
                if let Some(open) = open.take() {
                    info!("Joined the chat as {}", session.current_name());
                    if open.send(()).is_err() {
                        debug!("Input task already gone, nothing to forward");
                    }
                }
            }
            Reaction::Ignore => {}
        }
    }
}

async fn show<W: AsyncWrite + Unpin>(output: &mut W, line: &str) -> Result<(), ClientError> {
    let written = async {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await
    };
    written.await.map_err(|e| {
        error!("Failed to write output: {}", e);
        ClientError::Communications
    })
}
