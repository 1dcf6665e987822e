const IAC: u8 = 255;
const WILL: u8 = 251;
const WONT: u8 = 252;
const DO: u8 = 253;
const DONT: u8 = 254;
const SB: u8 = 250;
const SE: u8 = 240;

/// Telnet negotiation state carried across reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Iac {
    Data,
    Command,
    Option,
    Sub,
    SubIac,
}

/// Splits a raw TCP byte stream into command lines.
///
/// Telnet IAC sequences are removed even when split across reads. Lines end
/// at LF with an optional preceding CR. A line longer than the limit is
/// discarded whole and reported once it terminates.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    max_len: usize,
    overflowed: bool,
    iac: Iac,
}

/// One result of feeding bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Text(String),
    Oversized(usize),
}

impl LineBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
            overflowed: false,
            iac: Iac::Data,
        }
    }

    pub fn feed(&mut self, data: &[u8]) -> Vec<Line> {
        let mut lines = Vec::new();
        for &byte in data {
            self.iac = match (self.iac, byte) {
                (Iac::Data, IAC) => Iac::Command,
                (Iac::Data, b'\n') => {
                    lines.push(self.take_line());
                    Iac::Data
                }
                (Iac::Data, b'\r') => Iac::Data,
                (Iac::Data, b) => {
                    self.push(b);
                    Iac::Data
                }
                (Iac::Command, IAC) => {
                    self.push(IAC);
                    Iac::Data
                }
                (Iac::Command, WILL | WONT | DO | DONT) => Iac::Option,
                (Iac::Command, SB) => Iac::Sub,
                (Iac::Command, _) | (Iac::Option, _) => Iac::Data,
                (Iac::Sub, IAC) => Iac::SubIac,
                (Iac::Sub, _) => Iac::Sub,
                (Iac::SubIac, SE) => Iac::Data,
                (Iac::SubIac, _) => Iac::Sub,
            };
        }
        lines
    }

    fn push(&mut self, byte: u8) {
        if self.buf.len() < self.max_len {
            self.buf.push(byte);
        } else {
            self.overflowed = true;
        }
    }

    fn take_line(&mut self) -> Line {
        let bytes = std::mem::take(&mut self.buf);
        if std::mem::take(&mut self.overflowed) {
            return Line::Oversized(bytes.len());
        }
        Line::Text(String::from_utf8_lossy(&bytes).into_owned())
    }
}
