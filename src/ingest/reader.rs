//! Bounded, sequential line access to log files.
//!
//! Lines end at `\n`; a trailing `\r` is dropped. A final fragment with no
//! `\n` is still being written and is neither counted nor visited, so the
//! next pass reads it once it is complete. Bytes are decoded lossily so a
//! stray invalid sequence never fails the read.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::Result;

/// Number of `\n`-terminated lines in the file
pub fn count_lines(path: &Path) -> Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = Vec::new();
    let mut count = 0u64;
    while reader.read_until(b'\n', &mut buf)? > 0 {
        if buf.last() == Some(&b'\n') {
            count += 1;
        }
        buf.clear();
    }
    Ok(count)
}

/// Call `visit` for every line at or after zero-based `start_line`, in order.
///
/// Returns the number of terminated lines in the file, which is also the new
/// high-water mark once the visited lines are committed. A file shorter than
/// `start_line` visits nothing and returns its actual length. A trailing
/// fragment without `\n` is skipped.
pub fn for_each_line_from<F>(path: &Path, start_line: u64, mut visit: F) -> Result<u64>
where
    F: FnMut(&str),
{
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = Vec::new();
    let mut line_no = 0u64;

    while reader.read_until(b'\n', &mut buf)? > 0 {
        if buf.last() != Some(&b'\n') {
            break;
        }
        if line_no >= start_line {
            let text = String::from_utf8_lossy(&buf);
            visit(text.trim_end_matches(['\n', '\r']));
        }
        line_no += 1;
        buf.clear();
    }

    Ok(line_no)
}
