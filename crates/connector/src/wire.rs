//! Daemon wire format.
//!
//! A request is a sequence of `(name, value)` pairs, each string prefixed by
//! its length as a big-endian `i32`, ended by the name `"eof"` (which has no
//! value). Replies are a single big-endian `i32`.

use std::collections::HashMap;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const EOF_MARKER: &str = "eof";

/// Upper bound for a single string; anything larger is treated as corruption.
pub const MAX_FIELD_LEN: usize = 64 * 1024;

pub type FieldMap = HashMap<String, String>;

pub async fn read_string<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_i32().await?;
    let len = usize::try_from(len).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidData, format!("negative length prefix {len}"))
    })?;
    if len > MAX_FIELD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("length prefix {len} exceeds {MAX_FIELD_LEN}"),
        ));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub async fn write_string<W>(writer: &mut W, value: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = i32::try_from(value.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "string too long"))?;
    writer.write_i32(len).await?;
    writer.write_all(value.as_bytes()).await
}

/// Reads pairs until the `eof` marker. Later duplicates overwrite earlier ones.
pub async fn read_fields<R>(reader: &mut R) -> io::Result<FieldMap>
where
    R: AsyncRead + Unpin,
{
    let mut fields = FieldMap::new();
    loop {
        let name = read_string(reader).await?;
        if name == EOF_MARKER {
            return Ok(fields);
        }
        let value = read_string(reader).await?;
        fields.insert(name, value);
    }
}

/// Writes pairs followed by the `eof` marker. This is the daemon's side of the
/// exchange.
pub async fn write_fields<W, K, V>(writer: &mut W, fields: &[(K, V)]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    K: AsRef<str>,
    V: AsRef<str>,
{
    for (name, value) in fields {
        write_string(writer, name.as_ref()).await?;
        write_string(writer, value.as_ref()).await?;
    }
    write_string(writer, EOF_MARKER).await?;
    writer.flush().await
}

pub fn encode_code(code: i32) -> Vec<u8> {
    code.to_be_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_fields_until_eof() {
        let (mut daemon, mut app) = tokio::io::duplex(1024);
        write_fields(
            &mut daemon,
            &[("action", "request"), ("uid", "10050"), ("pid", "1234"), ("uid", "10051")],
        )
        .await
        .unwrap();

        let fields = read_fields(&mut app).await.unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields["uid"], "10051");
        assert_eq!(fields["pid"], "1234");
    }

    #[tokio::test]
    async fn negative_length_is_invalid_data() {
        let (mut daemon, mut app) = tokio::io::duplex(64);
        daemon.write_i32(-5).await.unwrap();
        let err = read_fields(&mut app).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn oversized_length_is_invalid_data() {
        let (mut daemon, mut app) = tokio::io::duplex(64);
        daemon.write_i32(MAX_FIELD_LEN as i32 + 1).await.unwrap();
        let err = read_fields(&mut app).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn premature_close_is_unexpected_eof() {
        let (mut daemon, mut app) = tokio::io::duplex(64);
        write_string(&mut daemon, "uid").await.unwrap();
        drop(daemon);
        let err = read_fields(&mut app).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn codes_are_big_endian() {
        assert_eq!(encode_code(2), vec![0, 0, 0, 2]);
    }
}
