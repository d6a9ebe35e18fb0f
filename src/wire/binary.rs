use crate::wire::{DecodeError, EncodeError, WireMessage};
use bytes::{Buf, BufMut};

// ```text
// [1 byte: cmd len][cmd][1 byte: src len][src][1 byte: to len][to][2 bytes BE: body len][body][1 byte: error]
// ```
const MAX_SHORT_FIELD: usize = u8::MAX as usize;
pub(crate) const MAX_BODY: usize = u16::MAX as usize;

pub(super) fn encode(message: &WireMessage) -> Result<Vec<u8>, EncodeError> {
    check_len("cmd", &message.cmd, MAX_SHORT_FIELD)?;
    check_len("src", &message.src, MAX_SHORT_FIELD)?;
    check_len("to", &message.to, MAX_SHORT_FIELD)?;
    check_len("body", &message.body, MAX_BODY)?;

    let mut buf = Vec::with_capacity(6 + message.cmd.len() + message.src.len() + message.to.len() + message.body.len());
    buf.put_u8(message.cmd.len() as u8);
    buf.put_slice(message.cmd.as_bytes());
    buf.put_u8(message.src.len() as u8);
    buf.put_slice(message.src.as_bytes());
    buf.put_u8(message.to.len() as u8);
    buf.put_slice(message.to.as_bytes());
    buf.put_u16(message.body.len() as u16);
    buf.put_slice(message.body.as_bytes());
    buf.put_u8(message.error as u8);

    Ok(buf)
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), EncodeError> {
    if value.len() > max {
        return Err(EncodeError::FieldTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

pub(super) fn decode(mut data: &[u8]) -> Result<WireMessage, DecodeError> {
    let cmd = read_short_field(&mut data, "cmd")?;
    let src = read_short_field(&mut data, "src")?;
    let to = read_short_field(&mut data, "to")?;

    if data.remaining() < 2 {
        return Err(DecodeError::Truncated("body"));
    }
    let body_len = data.get_u16() as usize;
    let body = read_string(&mut data, body_len, "body")?;

    if !data.has_remaining() {
        return Err(DecodeError::Truncated("error"));
    }
    let error = match data.get_u8() {
        0 => false,
        1 => true,
        other => return Err(DecodeError::BadErrorFlag(other)),
    };
    if data.has_remaining() {
        return Err(DecodeError::TrailingBytes(data.remaining()));
    }

    Ok(WireMessage {
        cmd,
        src,
        to,
        body,
        error,
        msg_ids: None,
        limit: None,
    })
}

fn read_short_field(data: &mut &[u8], field: &'static str) -> Result<String, DecodeError> {
    if !data.has_remaining() {
        return Err(DecodeError::Truncated(field));
    }
    let len = data.get_u8() as usize;
    read_string(data, len, field)
}

fn read_string(data: &mut &[u8], len: usize, field: &'static str) -> Result<String, DecodeError> {
    if data.remaining() < len {
        return Err(DecodeError::Truncated(field));
    }
    let value = String::from_utf8(data[..len].to_vec()).map_err(|_| DecodeError::InvalidUtf8(field))?;
    data.advance(len);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login() -> WireMessage {
        WireMessage::new("login")
            .with_src("alice")
            .with_to("server")
            .with_body("This is a test message")
    }

    #[test]
    fn login_round_trip() {
        let message = login();
        let decoded = decode(&encode(&message).unwrap()).unwrap();
        assert_eq!(decoded, message);

        let flagged = login().into_error();
        assert_eq!(decode(&encode(&flagged).unwrap()).unwrap(), flagged);
    }

    #[test]
    fn exact_layout() {
        let encoded = encode(&WireMessage::new("list").with_body("al")).unwrap();
        assert_eq!(
            encoded,
            vec![4, b'l', b'i', b's', b't', 0, 0, 0, 2, b'a', b'l', 0]
        );
    }

    #[test]
    fn oversized_fields_are_rejected_not_truncated() {
        let long_src = WireMessage::new("login").with_src("a".repeat(256));
        assert!(matches!(
            encode(&long_src),
            Err(EncodeError::FieldTooLong { field: "src", len: 256, max: 255 })
        ));

        let long_body = WireMessage::new("send").with_body("b".repeat(65536));
        assert!(matches!(encode(&long_body), Err(EncodeError::FieldTooLong { field: "body", .. })));

        let max_body = WireMessage::new("send").with_body("b".repeat(65535));
        assert_eq!(decode(&encode(&max_body).unwrap()).unwrap(), max_body);
    }

    #[test]
    fn malformed_frames() {
        let encoded = encode(&login()).unwrap();

        assert!(matches!(decode(&encoded[..3]), Err(DecodeError::Truncated("cmd"))));
        assert!(matches!(
            decode(&encoded[..encoded.len() - 1]),
            Err(DecodeError::Truncated("error"))
        ));

        let mut bad_flag = encoded.clone();
        *bad_flag.last_mut().unwrap() = 7;
        assert!(matches!(decode(&bad_flag), Err(DecodeError::BadErrorFlag(7))));

        let mut trailing = encoded.clone();
        trailing.push(0);
        assert!(matches!(decode(&trailing), Err(DecodeError::TrailingBytes(1))));

        assert!(matches!(decode(&[1, 0xff, 0, 0, 0, 0, 0]), Err(DecodeError::InvalidUtf8("cmd"))));
    }
}
