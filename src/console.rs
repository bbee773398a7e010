//! Operator console output.
//!
//! Everything the operator is meant to read goes through here, flushed
//! immediately so prompts appear before the blocking line read.

use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Write `line` followed by a newline.
pub async fn write_line<O>(console: &mut O, line: impl AsRef<[u8]>) -> io::Result<()>
where
    O: AsyncWrite + Unpin,
{
    console.write_all(line.as_ref()).await?;
    console.write_all(b"\n").await?;
    console.flush().await
}

/// Write `text` with no trailing newline.
pub async fn write_prompt<O>(console: &mut O, text: &str) -> io::Result<()>
where
    O: AsyncWrite + Unpin,
{
    console.write_all(text.as_bytes()).await?;
    console.flush().await
}
