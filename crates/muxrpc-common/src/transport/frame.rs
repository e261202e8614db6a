use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, RpcError};
use crate::protocol::message::Header;
use crate::transport::codec::BodyCodec;

/// Maximum frame size (100 MB). Checked before the payload buffer is
/// allocated.
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Any bidirectional byte stream a connection can run over: TCP, Unix
/// sockets, or the raw stream left after a CONNECT upgrade.
pub trait RpcStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> RpcStream for T {}

/// A type-erased connection stream.
pub type BoxedStream = Box<dyn RpcStream>;

/// Reads one length-prefixed frame.
///
/// Wire format: `[4-byte length as u32 big-endian] + [data]`
///
/// An EOF on the length prefix surfaces as an `Io` error whose
/// [`is_disconnect`](RpcError::is_disconnect) is true, which serve loops
/// treat as the peer closing cleanly.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(RpcError::FrameTooLarge { size: len, max: MAX_FRAME_SIZE });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    Ok(buf)
}

/// Writes one length-prefixed frame. Does not flush; callers flush once per
/// logical message.
pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    Ok(())
}

/// Writes one (header, body) message: header frame, body frame, one flush.
///
/// `body` is already encoded. The caller holds the connection's write lock
/// across this call, so the pair is never interleaved with another message.
pub async fn write_message<W>(
    writer: &mut W,
    codec: &BodyCodec,
    header: &Header,
    body: &[u8],
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header_bytes = codec.encode(header)?;
    write_frame(writer, &header_bytes).await?;
    write_frame(writer, body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one (header, body) message and decodes the header. The body is
/// returned raw: its type is only known once the header has been matched to
/// a pending call (client) or a registered method (server).
///
/// Both a framing failure and a header decode failure are unrecoverable for
/// the connection — the stream position can no longer be trusted.
pub async fn read_message<R>(reader: &mut R, codec: &BodyCodec) -> Result<(Header, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let header_frame = read_frame(reader).await?;
    let header: Header = codec.decode(&header_frame)?;
    let body = read_frame(reader).await?;
    Ok((header, body))
}
