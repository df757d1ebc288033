use std::io::{self, Read, Write};

use dbrelay_core::{RPCRequest, RPCResponse};

/// Maximum frame size the server will accept and the client relies on
/// (§4.1, §6): 10 MiB including the JSON payload, excluding the length
/// prefix itself.
pub const MAX_FRAME_SIZE: u32 = 10 * 1024 * 1024;

/// Writes one length-prefixed frame: 4-byte big-endian length, then the
/// raw bytes. Used underneath both request and response framing so the
/// wire-format invariant (§8 property 1: `write_frame; read_frame` is the
/// identity on any payload ≤ 10 MiB) lives in one place.
pub fn write_frame<W: Write>(mut writer: W, bytes: &[u8]) -> io::Result<()> {
    let len = bytes.len();
    if len > MAX_FRAME_SIZE as usize {
        return Err(io::Error::other(format!(
            "frame too large: {len} bytes (max {MAX_FRAME_SIZE})"
        )));
    }
    writer.write_all(&(len as u32).to_be_bytes())?;
    writer.write_all(bytes)?;
    writer.flush()
}

/// Reads one length-prefixed frame. A truncated length prefix or an
/// oversize declared length is a connection-level I/O error (§4.1).
pub fn read_frame<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::other(format!(
            "declared frame size {len} exceeds max {MAX_FRAME_SIZE}"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn send_request<W: Write>(writer: W, request: &RPCRequest) -> io::Result<()> {
    let bytes = serde_json::to_vec(request).map_err(io::Error::other)?;
    write_frame(writer, &bytes)
}

pub fn recv_request<R: Read>(reader: R) -> io::Result<RPCRequest> {
    let bytes = read_frame(reader)?;
    serde_json::from_slice(&bytes).map_err(io::Error::other)
}

pub fn send_response<W: Write>(writer: W, response: &RPCResponse) -> io::Result<()> {
    let bytes = serde_json::to_vec(response).map_err(io::Error::other)?;
    write_frame(writer, &bytes)
}

pub fn recv_response<R: Read>(reader: R) -> io::Result<RPCResponse> {
    let bytes = read_frame(reader)?;
    serde_json::from_slice(&bytes).map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_arbitrary_bytes() {
        let payload = b"{\"hello\":\"world\"}".to_vec();
        let mut buf = Vec::new();
        write_frame(&mut buf, &payload).unwrap();
        let read_back = read_frame(&buf[..]).unwrap();
        assert_eq!(read_back, payload);
    }

    #[test]
    fn rejects_oversize_frame() {
        let huge = vec![0u8; (MAX_FRAME_SIZE + 1) as usize];
        let mut buf = Vec::new();
        assert!(write_frame(&mut buf, &huge).is_err());
    }

    #[test]
    fn request_response_round_trip() {
        let req = RPCRequest::new("select", serde_json::json!({"table_name": "t"}), "abc");
        let mut buf = Vec::new();
        send_request(&mut buf, &req).unwrap();
        let back = recv_request(&buf[..]).unwrap();
        assert_eq!(back.method, "select");
        assert_eq!(back.id, "abc");
    }
}
