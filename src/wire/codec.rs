use crate::wire::{binary, json, DecodeError, EncodeError, FrameError, WireMessage};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

// Largest binary message plus slack. JSON frames are held to the same limit.
const MAX_FRAME_LEN: usize = 256 * 1024;

/// Which encoding a connection speaks. Chosen by the client with one byte right after connecting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecKind {
    Json,
    Binary,
}

impl CodecKind {
    pub fn selector(self) -> u8 {
        match self {
            CodecKind::Json => b'J',
            CodecKind::Binary => b'B',
        }
    }

    pub fn from_selector(selector: u8) -> Result<Self, DecodeError> {
        match selector {
            b'J' => Ok(CodecKind::Json),
            b'B' => Ok(CodecKind::Binary),
            other => Err(DecodeError::UnknownCodec(other)),
        }
    }

    pub fn encode(self, message: &WireMessage) -> Result<Vec<u8>, EncodeError> {
        match self {
            CodecKind::Json => json::encode(message),
            CodecKind::Binary => binary::encode(message),
        }
    }

    pub fn decode(self, data: &[u8]) -> Result<WireMessage, DecodeError> {
        match self {
            CodecKind::Json => json::decode(data),
            CodecKind::Binary => binary::decode(data),
        }
    }
}

pub(crate) async fn read_codec_selector<R>(reader: &mut R) -> Result<CodecKind, FrameError>
where
    R: AsyncRead + Unpin,
{
    let selector = reader.read_u8().await?;
    Ok(CodecKind::from_selector(selector)?)
}

pub(crate) async fn write_codec_selector<W>(writer: &mut W, kind: CodecKind) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u8(kind.selector()).await?;
    writer.flush().await?;
    Ok(())
}

/// MessageCodec frames messages with a 4 byte big-endian length prefix and encodes the frame
/// payload with the connection's codec.
pub struct MessageCodec {
    kind: CodecKind,
    framing: LengthDelimitedCodec,
}

impl MessageCodec {
    pub fn new(kind: CodecKind) -> Self {
        MessageCodec {
            kind,
            framing: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .max_frame_length(MAX_FRAME_LEN)
                .new_codec(),
        }
    }

    pub fn kind(&self) -> CodecKind {
        self.kind
    }
}

impl Decoder for MessageCodec {
    type Item = WireMessage;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.framing.decode(src)? {
            Some(frame) => Ok(Some(self.kind.decode(&frame)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<WireMessage> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = self.kind.encode(&item)?;
        self.framing.encode(Bytes::from(payload), dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::Framed;

    #[tokio::test]
    async fn framed_round_trip_for_both_codecs() {
        for kind in [CodecKind::Json, CodecKind::Binary].iter().copied() {
            let (client, server) = tokio::io::duplex(4096);
            let mut client = Framed::new(client, MessageCodec::new(kind));
            let mut server = Framed::new(server, MessageCodec::new(kind));

            let first = WireMessage::new("login").with_src("alice").with_body("pw");
            let second = WireMessage::new("list");
            client.send(first.clone()).await.unwrap();
            client.send(second.clone()).await.unwrap();

            assert_eq!(server.next().await.unwrap().unwrap(), first);
            assert_eq!(server.next().await.unwrap().unwrap(), second);
        }
    }

    #[tokio::test]
    async fn selector_handshake() {
        let (mut client, mut server) = tokio::io::duplex(16);
        write_codec_selector(&mut client, CodecKind::Binary).await.unwrap();
        assert_eq!(read_codec_selector(&mut server).await.unwrap(), CodecKind::Binary);

        client.write_u8(b'X').await.unwrap();
        assert!(matches!(
            read_codec_selector(&mut server).await,
            Err(FrameError::Decode(DecodeError::UnknownCodec(b'X')))
        ));
    }

    #[test]
    fn bad_payload_is_a_decode_error() {
        let mut codec = MessageCodec::new(CodecKind::Json);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0, 0, 3]);
        buf.extend_from_slice(b"{{{");
        assert!(matches!(codec.decode(&mut buf), Err(FrameError::Decode(DecodeError::Json(_)))));
    }
}
