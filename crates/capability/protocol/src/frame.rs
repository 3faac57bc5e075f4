//! 行分帧
//!
//! 将 TCP 字节流或 UDP 数据报切分为以 CR、LF 或 CRLF 结束的完整文本行。
//! 只有观察到行结束符后才输出该行；最后一段未结束的内容保留到下一次追加。

use tracing::warn;

/// 单个来源的滚动缓冲。
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    max_line_len: usize,
    /// 上一次追加以 CR 结束，下一字节若为 LF 则属于同一个 CRLF
    pending_cr: bool,
    /// 正在丢弃超长行的剩余部分
    discarding: bool,
    overflows: u64,
}

impl FrameAssembler {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_len: max_line_len.max(1),
            pending_cr: false,
            discarding: false,
            overflows: 0,
        }
    }

    /// 追加一段字节，返回其中所有完整的行。
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in bytes {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }

            match byte {
                b'\r' | b'\n' => {
                    self.pending_cr = byte == b'\r';
                    self.finish_line(&mut lines);
                }
                _ if self.discarding => {}
                _ => {
                    if self.buffer.len() >= self.max_line_len {
                        self.overflow();
                    } else {
                        self.buffer.push(byte);
                    }
                }
            }
        }

        lines
    }

    /// 当前缓冲中未结束的字节数。
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// 因超长被丢弃的行数。
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    fn finish_line(&mut self, lines: &mut Vec<String>) {
        if self.discarding {
            self.discarding = false;
            return;
        }
        if self.buffer.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        lines.push(line);
    }

    fn overflow(&mut self) {
        warn!(
            max_line_len = self.max_line_len,
            "frame_overflow_discarding_partial_line"
        );
        self.overflows = self.overflows.saturating_add(1);
        self.buffer.clear();
        self.discarding = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_across_reads() {
        let mut assembler = FrameAssembler::new(1024);
        assert!(assembler.push(b"12,34").is_empty());
        assert_eq!(assembler.push(b"5.6\r\n78,9"), vec!["12,345.6"]);
        assert_eq!(assembler.push(b"0.1\r\n"), vec!["78,90.1"]);
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_all_terminators() {
        let mut assembler = FrameAssembler::new(1024);
        let lines = assembler.push(b"a\rb\nc\r\nd");
        assert_eq!(lines, vec!["a", "b", "c"]);
        assert_eq!(assembler.pending_len(), 1);
    }

    #[test]
    fn test_crlf_split_between_pushes() {
        let mut assembler = FrameAssembler::new(1024);
        assert_eq!(assembler.push(b"one\r"), vec!["one"]);
        assert_eq!(assembler.push(b"\ntwo\r"), vec!["two"]);
        assert_eq!(assembler.push(b"\n"), Vec::<String>::new());
    }

    #[test]
    fn test_every_chunking_yields_each_line_once() {
        let input = b"1,523412.11,6234123.55\r\n45.2,-12.3\nLOG START\r2,3\r\n";
        let expected = vec!["1,523412.11,6234123.55", "45.2,-12.3", "LOG START", "2,3"];

        for chunk in 1..=input.len() {
            let mut assembler = FrameAssembler::new(1024);
            let mut lines = Vec::new();
            for part in input.chunks(chunk) {
                lines.extend(assembler.push(part));
            }
            assert_eq!(lines, expected, "chunk size {chunk}");
        }

        for split in 0..=input.len() {
            let mut assembler = FrameAssembler::new(1024);
            let mut lines = assembler.push(&input[..split]);
            lines.extend(assembler.push(&input[split..]));
            assert_eq!(lines, expected, "split at {split}");
        }
    }

    #[test]
    fn test_overflow_discards_until_next_terminator() {
        let mut assembler = FrameAssembler::new(4);
        assert!(assembler.push(b"abcdefgh").is_empty());
        assert_eq!(assembler.overflows(), 1);
        assert_eq!(assembler.pending_len(), 0);
        assert_eq!(assembler.push(b"ij\nok\n"), vec!["ok"]);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut assembler = FrameAssembler::new(16);
        assert_eq!(assembler.push(b"\n\n\r\nx\n\n"), vec!["x"]);
    }
}
