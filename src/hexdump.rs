//! Hex dump formatting for trace output

use std::fmt::Write;

/// Format up to 16 bytes as one dump line aligned on `addr`
///
/// Bytes land in the column given by `addr & 15`; bytes that would run past
/// the end of the line are counted in a `+[n] ...` suffix.
pub fn hex_dump16(addr: usize, bytes: &[u8]) -> String {
    let column = addr & 15;
    let shown = bytes.len().min(16 - column);

    let mut cells = [None; 16];
    for (i, byte) in bytes[..shown].iter().enumerate() {
        cells[column + i] = Some(*byte);
    }

    let mut line = format!("{:04x}:{:04x}  ", (addr >> 16) & 0xFFFF, addr & 0xFFFF);
    for (i, cell) in cells.iter().enumerate() {
        if i % 4 == 0 {
            line.push(' ');
        }
        match cell {
            Some(byte) => {
                let _ = write!(line, "{:02x}", byte);
            }
            None => line.push_str("  "),
        }
    }

    line.push_str("  |");
    for cell in cells {
        line.push(match cell {
            Some(byte) if (0x20..0x7F).contains(&byte) => byte as char,
            Some(_) => '.',
            None => ' ',
        });
    }
    line.push('|');

    if shown < bytes.len() {
        let _ = write!(line, " +[{}] ...", bytes.len() - shown);
    }
    line
}

/// Format a span of any length as dump lines, one per 16-byte row
pub fn hex_dump(addr: usize, bytes: &[u8]) -> String {
    let mut lines = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let at = addr + offset;
        let take = (16 - (at & 15)).min(bytes.len() - offset);
        lines.push(hex_dump16(at, &bytes[offset..offset + take]));
        offset += take;
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_line() {
        let line = hex_dump16(0, b"0123456789ABCDEF");
        assert_eq!(
            line,
            "0000:0000   30313233 34353637 38394142 43444546  |0123456789ABCDEF|"
        );
    }

    #[test]
    fn test_offset_line_and_overflow() {
        let line = hex_dump16(0x63, &[100, 10, 102]);
        assert!(line.starts_with("0000:0063"));
        assert!(line.contains("64 0a66"));
        assert!(line.ends_with("|   d.f          |"));

        let line = hex_dump16(0x123456, &[0x41; 17]);
        assert!(line.starts_with("0012:3456"));
        assert!(line.ends_with(" +[7] ..."));
    }

    #[test]
    fn test_multi_line_dump() {
        let dump = hex_dump(12, &[0u8; 24]);
        let lines: Vec<_> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("0000:0010"));
        assert!(lines[2].starts_with("0000:0020"));
    }
}
