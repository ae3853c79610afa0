//! Built-in knowledge used when no layer has anything to say.

pub const DEFAULT_TYPE: &str = "application/octet-stream";
pub const PLAIN_TEXT: &str = "text/plain";
pub const ZERO_SIZE: &str = "application/x-zerosize";
pub const DIRECTORY: &str = "inode/directory";

/// Groups that do not describe file contents and so never fall back to
/// [`DEFAULT_TYPE`].
const NON_FILE_GROUPS: [&str; 5] = ["inode", "all", "fonts", "print", "uri"];
/// Bytes inspected by the plain text heuristic.
const TEXT_PROBE_LEN: usize = 128;

/// The parent a type has when no layer declares any.
pub fn implicit_parent(mime: &str) -> Option<&'static str> {
    let group = mime.split_once('/').map_or(mime, |(group, _)| group);
    if group == "text" && mime != PLAIN_TEXT {
        return Some(PLAIN_TEXT);
    }
    if !NON_FILE_GROUPS.contains(&group) && mime != DEFAULT_TYPE {
        return Some(DEFAULT_TYPE);
    }
    None
}

/// Classify content that no magic rule recognised, with the accuracy the
/// guess deserves.
pub fn guess_content(data: &[u8]) -> (&'static str, u8) {
    if data.is_empty() {
        (ZERO_SIZE, 100)
    } else if looks_like_text(data) {
        (PLAIN_TEXT, 5)
    } else {
        (DEFAULT_TYPE, 0)
    }
}

/// UTF-16 byte order mark, or no control characters other than tab, line
/// feed and carriage return near the start.
fn looks_like_text(data: &[u8]) -> bool {
    if data.starts_with(b"\xFE\xFF") || data.starts_with(b"\xFF\xFE") {
        return true;
    }
    data.iter().take(TEXT_PROBE_LEN).all(|&byte| byte >= 0x20 || matches!(byte, b'\t' | b'\n' | b'\r'))
}
