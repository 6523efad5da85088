//! Channel list: one YouTube channel name per line, re-read every cycle.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};

/// Longest channel name YouTube allows.
pub const MAX_CHANNEL_NAME_LEN: usize = 64;

/// Most bytes buffered per line: a maximal name, one byte to detect overflow, and the newline.
const LINE_LIMIT: u64 = MAX_CHANNEL_NAME_LEN as u64 + 2;

/// A validated channel name: 1-64 characters from `[A-Za-z0-9._-]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn parse(name: &str) -> Result<Self, ChannelError> {
        if name.len() > MAX_CHANNEL_NAME_LEN {
            return Err(ChannelError::TooLong {
                prefix: truncate_lossy(name.as_bytes(), MAX_CHANNEL_NAME_LEN),
            });
        }
        if name.is_empty() || !name.bytes().all(is_channel_byte) {
            return Err(ChannelError::InvalidCharacter {
                line: name.to_string(),
            });
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// Only the first 64 characters are kept, followed by an ellipsis when shown.
    #[error("Channel name is invalid: {prefix}...")]
    TooLong { prefix: String },
    #[error("Channel name is invalid: {line}")]
    InvalidCharacter { line: String },
}

fn is_channel_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-')
}

fn truncate_lossy(bytes: &[u8], max: usize) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(max)]).into_owned()
}

/// Classify one raw line. `Ok(None)` means a blank line to skip silently.
pub fn parse_line(raw: &[u8]) -> Result<Option<ChannelName>, ChannelError> {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    if line.len() > MAX_CHANNEL_NAME_LEN {
        return Err(ChannelError::TooLong {
            prefix: truncate_lossy(line, MAX_CHANNEL_NAME_LEN),
        });
    }
    match std::str::from_utf8(line) {
        Ok(name) => ChannelName::parse(name).map(Some),
        Err(_) => Err(ChannelError::InvalidCharacter {
            line: String::from_utf8_lossy(line).into_owned(),
        }),
    }
}

/// Lazy sequence of valid channel names from one pass over the file.
///
/// Invalid lines are logged and skipped. A read error mid-file ends the pass.
pub struct Channels<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl Channels<BufReader<File>> {
    /// Open the channel list fresh. Failing to open it is fatal to the daemon.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .await
            .with_context(|| format!("Couldn't open {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: AsyncBufRead + Unpin> Channels<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
        }
    }

    pub async fn next(&mut self) -> Option<ChannelName> {
        loop {
            self.buf.clear();
            let read = (&mut self.reader)
                .take(LINE_LIMIT)
                .read_until(b'\n', &mut self.buf)
                .await;
            let truncated = match read {
                Ok(0) => return None,
                Ok(n) => n as u64 == LINE_LIMIT && self.buf.last() != Some(&b'\n'),
                Err(e) => {
                    tracing::error!(line = self.line_no + 1, "Failed reading channel list: {}", e);
                    return None;
                }
            };
            self.line_no += 1;

            let parsed = if truncated {
                match self.discard_rest_of_line().await {
                    Ok(rest_blank) if rest_blank && self.buf.iter().all(u8::is_ascii_whitespace) => Ok(None),
                    Ok(_) => Err(ChannelError::TooLong {
                        prefix: truncate_lossy(&self.buf, MAX_CHANNEL_NAME_LEN),
                    }),
                    Err(e) => {
                        tracing::error!(line = self.line_no, "Failed reading channel list: {}", e);
                        return None;
                    }
                }
            } else {
                parse_line(&self.buf)
            };

            match parsed {
                Ok(Some(name)) => return Some(name),
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(line = self.line_no, "{}", e);
                    continue;
                }
            }
        }
    }

    /// Skip to just past the next newline (or EOF) without buffering.
    /// Returns whether everything skipped was whitespace.
    async fn discard_rest_of_line(&mut self) -> std::io::Result<bool> {
        let mut blank = true;
        loop {
            let (used, done) = {
                let available = self.reader.fill_buf().await?;
                if available.is_empty() {
                    return Ok(blank);
                }
                let (line, done) = match available.iter().position(|&b| b == b'\n') {
                    Some(i) => (&available[..i], true),
                    None => (available, false),
                };
                blank &= line.iter().all(u8::is_ascii_whitespace);
                (line.len() + usize::from(done), done)
            };
            self.reader.consume(used);
            if done {
                return Ok(blank);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    async fn collect(content: &[u8]) -> Vec<String> {
        let mut channels = Channels::new(content);
        let mut names = Vec::new();
        while let Some(name) = channels.next().await {
            names.push(name.to_string());
        }
        names
    }

    #[test]
    fn test_parse_line_strips_single_newline() {
        assert_eq!(parse_line(b"Foo_1.x-y\n").unwrap().unwrap().as_str(), "Foo_1.x-y");
        assert_eq!(parse_line(b"Foo").unwrap().unwrap().as_str(), "Foo");
        assert!(parse_line(b"Foo\n\n").is_err());
    }

    #[test]
    fn test_parse_line_blank_is_skipped() {
        assert_eq!(parse_line(b"\n").unwrap(), None);
        assert_eq!(parse_line(b"").unwrap(), None);
        assert_eq!(parse_line(b"  \n").unwrap(), None);
    }

    #[test]
    fn test_parse_line_rejects_bad_characters() {
        let err = parse_line(b"BAD!Name\n").unwrap_err();
        assert_eq!(err.to_string(), "Channel name is invalid: BAD!Name");
        assert!(parse_line(b"has space\n").is_err());
        assert!(parse_line(b"caf\xc3\xa9\n").is_err());
        assert!(parse_line(b"\xff\xfe\n").is_err());
    }

    #[test]
    fn test_parse_line_length_limit() {
        let max = "a".repeat(MAX_CHANNEL_NAME_LEN);
        assert!(parse_line(format!("{}\n", max).as_bytes()).unwrap().is_some());
        assert!(parse_line(max.as_bytes()).unwrap().is_some());

        let over = "b".repeat(MAX_CHANNEL_NAME_LEN + 1);
        let err = parse_line(over.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            ChannelError::TooLong {
                prefix: "b".repeat(MAX_CHANNEL_NAME_LEN)
            }
        );
        assert!(err.to_string().ends_with("..."));
    }

    #[tokio::test]
    async fn test_channels_skip_blank_and_invalid() {
        let names = collect(b"  \nValidName1\nBAD!Name\n").await;
        assert_eq!(names, vec!["ValidName1"]);
    }

    #[tokio::test]
    async fn test_huge_line_is_skipped_without_buffering_it() {
        let mut content = vec![b'z'; 1 << 20];
        content.extend_from_slice(b"\nNext\n");
        let mut channels = Channels::new(&content[..]);

        assert_eq!(channels.next().await.unwrap().as_str(), "Next");
        assert!(channels.buf.capacity() < 1024, "buffer grew to {}", channels.buf.capacity());
        assert_eq!(channels.line_no, 2);
        assert!(channels.next().await.is_none());
    }

    #[tokio::test]
    async fn test_line_limit_boundaries() {
        let max = "m".repeat(MAX_CHANNEL_NAME_LEN);
        let over_by_one = "o".repeat(MAX_CHANNEL_NAME_LEN + 1);
        let over_by_two = "t".repeat(MAX_CHANNEL_NAME_LEN + 2);
        let long_blank = " ".repeat(300);
        let content = format!("{max}\n{over_by_one}\n{over_by_two}\n{long_blank}\n{max}");
        assert_eq!(collect(content.as_bytes()).await, vec![max.clone(), max]);
    }

    #[tokio::test]
    async fn test_overlong_line_does_not_corrupt_next_line() {
        let content = format!("{}\nNext\n{}", "x".repeat(200), "Last");
        let names = collect(content.as_bytes()).await;
        assert_eq!(names, vec!["Next", "Last"]);
    }

    #[tokio::test]
    async fn test_channels_keep_file_order_and_duplicates() {
        let names = collect(b"b\na\nb\n").await;
        assert_eq!(names, vec!["b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_open_rereads_edits_between_passes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first").unwrap();

        let mut pass = Channels::open(file.path()).await.unwrap();
        assert_eq!(pass.next().await.unwrap().as_str(), "first");
        assert!(pass.next().await.is_none());

        writeln!(file, "second").unwrap();
        let mut pass = Channels::open(file.path()).await.unwrap();
        assert_eq!(pass.next().await.unwrap().as_str(), "first");
        assert_eq!(pass.next().await.unwrap().as_str(), "second");
        assert!(pass.next().await.is_none());
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Channels::open(&dir.path().join("channels.txt")).await.err().unwrap();
        assert!(err.to_string().contains("Couldn't open"));
    }

    proptest! {
        #[test]
        fn valid_names_are_accepted(name in "[A-Za-z0-9._-]{1,64}") {
            let parsed = ChannelName::parse(&name).unwrap();
            prop_assert_eq!(parsed.as_str(), name.as_str());
        }

        #[test]
        fn any_foreign_character_rejects(
            prefix in "[A-Za-z0-9._-]{0,30}",
            bad in "[^A-Za-z0-9._-]",
            suffix in "[A-Za-z0-9._-]{0,30}",
        ) {
            let name = format!("{}{}{}", prefix, bad, suffix);
            prop_assert!(ChannelName::parse(&name).is_err());
        }

        #[test]
        fn names_over_limit_are_rejected(name in "[A-Za-z0-9._-]{65,128}") {
            let is_too_long = matches!(
                ChannelName::parse(&name),
                Err(ChannelError::TooLong { .. })
            );
            prop_assert!(is_too_long);
        }
    }
}
