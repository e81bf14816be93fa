//! Chunked newline-delimited scanning from either end of a file
//!
//! Files are read in fixed-size windows. Bytes of a line that straddles a
//! window boundary are carried as raw bytes into the next window; text is
//! never decoded before the full line is known. Splitting on `0x0A` is safe
//! for UTF-8 because that byte never appears inside a multi-byte sequence.

use crate::error::{HistoryError, HistoryResult};
use std::io::SeekFrom;
use std::ops::ControlFlow;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Scan order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Oldest line first
    Forward,
    /// Newest line first
    Backward,
}

/// A complete line and the byte offset at which it starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedLine {
    pub offset: u64,
    pub bytes: Vec<u8>,
}

/// Reads files window by window and emits complete lines in batches
#[derive(Debug, Clone, Copy)]
pub struct LineScanner {
    chunk_size: usize,
}

impl LineScanner {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Scan `path` in `direction`, handing each window's lines to `visit`.
    ///
    /// Batches are ordered in the scan direction. A missing file scans as
    /// empty. Returning `ControlFlow::Break` from `visit` stops reading.
    pub async fn scan<F>(&self, path: &Path, direction: Direction, visit: F) -> HistoryResult<()>
    where
        F: FnMut(Vec<ScannedLine>) -> ControlFlow<()>,
    {
        match direction {
            Direction::Forward => self.scan_forward_from(path, 0, visit).await,
            Direction::Backward => self.scan_backward(path, visit).await,
        }
    }

    /// Forward scan starting at byte `start`, which must be a line start
    pub async fn scan_forward_from<F>(&self, path: &Path, start: u64, mut visit: F) -> HistoryResult<()>
    where
        F: FnMut(Vec<ScannedLine>) -> ControlFlow<()>,
    {
        let Some((mut file, len)) = open_with_len(path).await? else {
            return Ok(());
        };
        if start >= len {
            return Ok(());
        }
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| HistoryError::io_at("seek", path, e))?;

        let mut buf = vec![0u8; self.chunk_size];
        let mut carry: Vec<u8> = Vec::new();
        let mut line_start = start;
        let mut pos = start;

        while pos < len {
            let n = window_len(len - pos, self.chunk_size);
            file.read_exact(&mut buf[..n])
                .await
                .map_err(|e| HistoryError::io_at("read", path, e))?;
            let window = &buf[..n];

            let mut batch = Vec::new();
            let mut seg_start = 0;
            for (i, _) in window.iter().enumerate().filter(|(_, b)| **b == b'\n') {
                carry.extend_from_slice(&window[seg_start..i]);
                let bytes = std::mem::take(&mut carry);
                if !bytes.is_empty() {
                    batch.push(ScannedLine {
                        offset: line_start,
                        bytes,
                    });
                }
                seg_start = i + 1;
                line_start = pos + seg_start as u64;
            }
            carry.extend_from_slice(&window[seg_start..]);
            pos += n as u64;

            if !batch.is_empty() && visit(batch).is_break() {
                return Ok(());
            }
        }

        // Last line without a trailing newline
        if !carry.is_empty() {
            let _ = visit(vec![ScannedLine {
                offset: line_start,
                bytes: carry,
            }]);
        }
        Ok(())
    }

    async fn scan_backward<F>(&self, path: &Path, mut visit: F) -> HistoryResult<()>
    where
        F: FnMut(Vec<ScannedLine>) -> ControlFlow<()>,
    {
        let Some((mut file, len)) = open_with_len(path).await? else {
            return Ok(());
        };

        let mut buf = vec![0u8; self.chunk_size];
        // Head of the line that continues past the current window's end
        let mut carry: Vec<u8> = Vec::new();
        let mut end = len;

        while end > 0 {
            let n = window_len(end, self.chunk_size);
            let start = end - n as u64;
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| HistoryError::io_at("seek", path, e))?;
            file.read_exact(&mut buf[..n])
                .await
                .map_err(|e| HistoryError::io_at("read", path, e))?;
            let window = &buf[..n];

            // Right to left, so the batch comes out newest first
            let mut batch = Vec::new();
            let mut seg_end = n;
            for i in (0..n).rev().filter(|i| window[*i] == b'\n') {
                let mut bytes = window[i + 1..seg_end].to_vec();
                bytes.append(&mut carry);
                if !bytes.is_empty() {
                    batch.push(ScannedLine {
                        offset: start + i as u64 + 1,
                        bytes,
                    });
                }
                seg_end = i;
            }
            let mut head = window[..seg_end].to_vec();
            head.append(&mut carry);
            carry = head;
            end = start;

            if !batch.is_empty() && visit(batch).is_break() {
                return Ok(());
            }
        }

        if !carry.is_empty() {
            let _ = visit(vec![ScannedLine {
                offset: 0,
                bytes: carry,
            }]);
        }
        Ok(())
    }
}

async fn open_with_len(path: &Path) -> HistoryResult<Option<(File, u64)>> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(HistoryError::io_at("open", path, e)),
    };
    let len = file
        .metadata()
        .await
        .map_err(|e| HistoryError::io_at("stat", path, e))?
        .len();
    Ok(Some((file, len)))
}

fn window_len(remaining: u64, chunk_size: usize) -> usize {
    usize::try_from(remaining).map_or(chunk_size, |r| r.min(chunk_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn collect(scanner: LineScanner, path: &Path, direction: Direction) -> Vec<ScannedLine> {
        let mut lines = Vec::new();
        scanner
            .scan(path, direction, |batch| {
                lines.extend(batch);
                ControlFlow::Continue(())
            })
            .await
            .unwrap();
        lines
    }

    fn texts(lines: &[ScannedLine]) -> Vec<String> {
        lines
            .iter()
            .map(|l| String::from_utf8(l.bytes.clone()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_forward_and_backward_agree_for_every_chunk_size() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.jsonl");
        let content = "alpha\nβeta ünïcode\n\ngamma 🚀 rocket\ndelta";
        tokio::fs::write(&path, content).await.unwrap();

        for chunk in 1..=content.len() + 2 {
            let scanner = LineScanner::new(chunk);
            let forward = collect(scanner, &path, Direction::Forward).await;
            let mut backward = collect(scanner, &path, Direction::Backward).await;
            assert_eq!(
                texts(&forward),
                vec!["alpha", "βeta ünïcode", "gamma 🚀 rocket", "delta"],
                "chunk size {}",
                chunk
            );
            backward.reverse();
            assert_eq!(forward, backward, "chunk size {}", chunk);
        }
    }

    #[tokio::test]
    async fn test_offsets_point_at_line_starts() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.jsonl");
        let content = b"ab\ncde\nf\n";
        tokio::fs::write(&path, content).await.unwrap();

        let lines = collect(LineScanner::new(4), &path, Direction::Backward).await;
        for line in &lines {
            let start = line.offset as usize;
            assert_eq!(&content[start..start + line.bytes.len()], line.bytes.as_slice());
        }
        assert_eq!(lines.iter().map(|l| l.offset).collect::<Vec<_>>(), vec![7, 3, 0]);
    }

    #[tokio::test]
    async fn test_forward_from_offset() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.jsonl");
        tokio::fs::write(&path, b"one\ntwo\nthree\n").await.unwrap();

        let mut lines = Vec::new();
        LineScanner::new(3)
            .scan_forward_from(&path, 4, |batch| {
                lines.extend(batch);
                ControlFlow::Continue(())
            })
            .await
            .unwrap();
        assert_eq!(texts(&lines), vec!["two", "three"]);
    }

    #[tokio::test]
    async fn test_break_stops_early() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.jsonl");
        tokio::fs::write(&path, b"1\n2\n3\n4\n").await.unwrap();

        let mut calls = 0;
        LineScanner::new(2)
            .scan(&path, Direction::Backward, |_| {
                calls += 1;
                ControlFlow::Break(())
            })
            .await
            .unwrap();
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let lines = collect(
            LineScanner::new(16),
            &tmp.path().join("absent.jsonl"),
            Direction::Backward,
        )
        .await;
        assert!(lines.is_empty());
    }
}
