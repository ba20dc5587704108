use std::io::{Read, Write};

use anyhow::{bail, Context};

use crate::{config, protocol::Request};

pub fn read_message(stdin: &mut dyn Read) -> anyhow::Result<Option<Request>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = stdin
            .read(&mut len_buf[filled..])
            .context("failed reading native message length")?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled == 0 {
        return Ok(None);
    }
    if filled < 4 {
        bail!("incomplete length prefix (expected 4 bytes, got {filled})");
    }

    // Native messaging uses 32-bit little-endian length.
    let msg_len = u32::from_le_bytes(len_buf);
    if msg_len > config::native_messaging::MAX_MESSAGE_SIZE_BYTES {
        bail!("message too large: {msg_len} bytes");
    }

    let mut payload = vec![0u8; msg_len as usize];
    stdin
        .read_exact(&mut payload)
        .with_context(|| format!("failed reading native message payload ({msg_len} bytes)"))?;

    let req: Request = serde_json::from_slice(&payload).context("invalid JSON request")?;
    Ok(Some(req))
}

pub fn write_json(stdout: &mut dyn Write, v: &serde_json::Value) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec(v).context("failed serializing JSON response")?;
    let len: u32 = bytes
        .len()
        .try_into()
        .context("response too large for u32 length")?;
    stdout.write_all(&len.to_le_bytes())?;
    stdout.write_all(&bytes)?;
    stdout.flush().context("failed flushing stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(json: &str) -> Vec<u8> {
        let mut out = (json.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(json.as_bytes());
        out
    }

    #[test]
    fn test_reads_framed_request() {
        let bytes = frame(r#"{"id":"7","method":"process","params":{"text":"Hi."}}"#);
        let req = read_message(&mut Cursor::new(bytes)).unwrap().unwrap();
        assert_eq!(req.id, "7");
        assert_eq!(req.method, "process");
        assert_eq!(req.params["text"], "Hi.");
    }

    #[test]
    fn test_params_default_to_null() {
        let bytes = frame(r#"{"id":"1","method":"hello"}"#);
        let req = read_message(&mut Cursor::new(bytes)).unwrap().unwrap();
        assert!(req.params.is_null());
    }

    #[test]
    fn test_eof_is_none() {
        assert!(read_message(&mut Cursor::new(Vec::new())).unwrap().is_none());
    }

    #[test]
    fn test_truncated_prefix_is_error() {
        assert!(read_message(&mut Cursor::new(vec![1u8, 0])).is_err());
    }

    #[test]
    fn test_oversized_message_rejected() {
        let len = config::native_messaging::MAX_MESSAGE_SIZE_BYTES + 1;
        let err = read_message(&mut Cursor::new(len.to_le_bytes().to_vec())).unwrap_err();
        assert!(err.to_string().contains("message too large"));
    }

    #[test]
    fn test_write_then_read_frame_layout() {
        let mut out = Vec::new();
        write_json(&mut out, &serde_json::json!({ "id": "2", "result": null })).unwrap();
        let len = u32::from_le_bytes([out[0], out[1], out[2], out[3]]) as usize;
        assert_eq!(len, out.len() - 4);
        let v: serde_json::Value = serde_json::from_slice(&out[4..]).unwrap();
        assert_eq!(v["id"], "2");
    }
}
