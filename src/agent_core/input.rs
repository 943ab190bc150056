//! Line input shared by both front-ends.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Print `prompt` and read one line without its line ending.
///
/// Returns `None` at end of input.
pub async fn prompt_line<R, W>(input: &mut R, out: &mut W, prompt: &str) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{prompt}")?;
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let trimmed_len = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed_len);
    Ok(Some(line))
}

/// Whether a line asks to leave the loop (`quit` / `exit`, any case).
pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit")
}
