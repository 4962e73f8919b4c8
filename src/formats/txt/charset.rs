//! Charset detection for plain-text books
//!
//! Detection order: byte-order mark, strict UTF-8 validation, UTF-16 zero
//! byte statistics, then GB18030 vs Big5 scored on clean decoding and the
//! share of common Han characters. Anything else is reported as an
//! unconfident UTF-8 guess.

use std::borrow::Cow;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

/// Bytes inspected for UTF-16 statistics
const UTF16_SAMPLE_LEN: usize = 4096;

/// Minimum share of zero bytes at one parity to call a file UTF-16
const UTF16_ZERO_RATIO: f32 = 0.3;

/// Minimum share of Han ideographs among non-ASCII characters for a CJK guess
const MIN_IDEOGRAPH_RATIO: f32 = 0.3;

/// High-frequency characters in both simplified and traditional text
const COMMON_HAN: &str = "的一是不了在人有我他这這个個们們中来來上大为為和国國地到以说說时時要就出会會可也你对對生能而子那得于於着著下自之年过過发發后後作里裡用道行所然家种種事成方多经經么麼去法学學如都同现現当當没沒动動面起看定天分还還进進好小部其些主样樣理心她本前开開但因只从從想实實";

/// Supported text encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxtCharset {
    Utf8,
    Gbk,
    Gb18030,
    Big5,
    Utf16Le,
    Utf16Be,
}

impl TxtCharset {
    /// Backing `encoding_rs` encoding
    pub fn encoding(&self) -> &'static Encoding {
        match self {
            TxtCharset::Utf8 => encoding_rs::UTF_8,
            TxtCharset::Gbk => encoding_rs::GBK,
            TxtCharset::Gb18030 => encoding_rs::GB18030,
            TxtCharset::Big5 => encoding_rs::BIG5,
            TxtCharset::Utf16Le => encoding_rs::UTF_16LE,
            TxtCharset::Utf16Be => encoding_rs::UTF_16BE,
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            TxtCharset::Utf8 => "UTF-8",
            TxtCharset::Gbk => "GBK",
            TxtCharset::Gb18030 => "GB18030",
            TxtCharset::Big5 => "Big5",
            TxtCharset::Utf16Le => "UTF-16LE",
            TxtCharset::Utf16Be => "UTF-16BE",
        }
    }

    /// Resolve a WHATWG encoding label ("gbk", "utf-16", "big5-hkscs", ...)
    pub fn from_label(label: &str) -> Option<Self> {
        let encoding = Encoding::for_label(label.trim().as_bytes())?;
        Self::from_encoding(encoding)
    }

    fn from_encoding(encoding: &'static Encoding) -> Option<Self> {
        if encoding == encoding_rs::UTF_8 {
            Some(TxtCharset::Utf8)
        } else if encoding == encoding_rs::GBK {
            Some(TxtCharset::Gbk)
        } else if encoding == encoding_rs::GB18030 {
            Some(TxtCharset::Gb18030)
        } else if encoding == encoding_rs::BIG5 {
            Some(TxtCharset::Big5)
        } else if encoding == encoding_rs::UTF_16LE {
            Some(TxtCharset::Utf16Le)
        } else if encoding == encoding_rs::UTF_16BE {
            Some(TxtCharset::Utf16Be)
        } else {
            None
        }
    }

    /// Size of one code unit in bytes
    pub fn unit_len(&self) -> usize {
        match self {
            TxtCharset::Utf16Le | TxtCharset::Utf16Be => 2,
            _ => 1,
        }
    }

    /// Decode bytes, dropping a leading BOM for this encoding
    ///
    /// Malformed sequences become U+FFFD.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        self.encoding().decode_with_bom_removal(bytes).0
    }
}

impl std::fmt::Display for TxtCharset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Detection outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub charset: TxtCharset,
    /// False when no rule matched and UTF-8 is only a fallback
    pub confident: bool,
}

impl Detection {
    fn sure(charset: TxtCharset) -> Self {
        Detection {
            charset,
            confident: true,
        }
    }
}

/// Detect the charset of a text file's bytes
pub fn detect(bytes: &[u8]) -> Detection {
    if let Some((encoding, _bom_len)) = Encoding::for_bom(bytes) {
        if let Some(charset) = TxtCharset::from_encoding(encoding) {
            return Detection::sure(charset);
        }
    }

    // NUL is valid UTF-8 but never appears in real text; leave it to UTF-16
    if !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok() {
        return Detection::sure(TxtCharset::Utf8);
    }

    if let Some(charset) = detect_utf16(bytes) {
        return Detection::sure(charset);
    }

    if let Some(charset) = detect_cjk(bytes) {
        return Detection::sure(charset);
    }

    Detection {
        charset: TxtCharset::Utf8,
        confident: false,
    }
}

/// BOM-less UTF-16: ASCII-heavy text has a zero in every other byte
fn detect_utf16(bytes: &[u8]) -> Option<TxtCharset> {
    let sample = &bytes[..bytes.len().min(UTF16_SAMPLE_LEN)];
    let pairs = sample.len() / 2;
    if pairs == 0 {
        return None;
    }

    let mut even_zeros = 0usize;
    let mut odd_zeros = 0usize;
    for pair in sample.chunks_exact(2) {
        if pair[0] == 0 {
            even_zeros += 1;
        }
        if pair[1] == 0 {
            odd_zeros += 1;
        }
    }

    let even_ratio = even_zeros as f32 / pairs as f32;
    let odd_ratio = odd_zeros as f32 / pairs as f32;

    if odd_ratio >= UTF16_ZERO_RATIO && even_ratio < odd_ratio / 4.0 {
        Some(TxtCharset::Utf16Le)
    } else if even_ratio >= UTF16_ZERO_RATIO && odd_ratio < even_ratio / 4.0 {
        Some(TxtCharset::Utf16Be)
    } else {
        None
    }
}

/// Pick between GB18030 and Big5 by how plausible each decoding is
fn detect_cjk(bytes: &[u8]) -> Option<TxtCharset> {
    let candidates = [TxtCharset::Gb18030, TxtCharset::Big5];

    let mut best: Option<(TxtCharset, CjkScore)> = None;
    for charset in candidates {
        let Some(text) = charset
            .encoding()
            .decode_without_bom_handling_and_without_replacement(bytes)
        else {
            continue;
        };
        let score = CjkScore::of(&text);
        if score.ideograph_ratio < MIN_IDEOGRAPH_RATIO {
            continue;
        }
        // Earlier candidates win ties
        if best.as_ref().map_or(true, |(_, b)| score.beats(b)) {
            best = Some((charset, score));
        }
    }

    best.map(|(charset, _)| charset)
}

#[derive(Debug, Clone, Copy)]
struct CjkScore {
    common_ratio: f32,
    ideograph_ratio: f32,
}

impl CjkScore {
    fn of(text: &str) -> Self {
        let mut non_ascii = 0usize;
        let mut ideographs = 0usize;
        let mut common = 0usize;

        for c in text.chars().filter(|c| !c.is_ascii()) {
            non_ascii += 1;
            if is_ideograph(c) {
                ideographs += 1;
            }
            if COMMON_HAN.contains(c) {
                common += 1;
            }
        }

        if non_ascii == 0 {
            return CjkScore {
                common_ratio: 0.0,
                ideograph_ratio: 0.0,
            };
        }

        CjkScore {
            common_ratio: common as f32 / non_ascii as f32,
            ideograph_ratio: ideographs as f32 / non_ascii as f32,
        }
    }

    fn beats(&self, other: &CjkScore) -> bool {
        if (self.common_ratio - other.common_ratio).abs() > f32::EPSILON {
            self.common_ratio > other.common_ratio
        } else {
            self.ideograph_ratio > other.ideograph_ratio
        }
    }
}

fn is_ideograph(c: char) -> bool {
    matches!(c as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0x3000..=0x303F | 0xFF00..=0xFFEF)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(charset: TxtCharset, text: &str) -> Vec<u8> {
        let (bytes, _, unmappable) = charset.encoding().encode(text);
        assert!(!unmappable);
        bytes.into_owned()
    }

    #[test]
    fn test_detect_utf8() {
        let detection = detect("第一章 开始\nHello".as_bytes());
        assert_eq!(detection, Detection::sure(TxtCharset::Utf8));
    }

    #[test]
    fn test_detect_bom() {
        assert_eq!(detect(b"\xFF\xFEa\x00").charset, TxtCharset::Utf16Le);
        assert_eq!(detect(b"\xFE\xFF\x00a").charset, TxtCharset::Utf16Be);
        assert_eq!(detect(b"\xEF\xBB\xBFabc").charset, TxtCharset::Utf8);
    }

    #[test]
    fn test_detect_utf16_without_bom() {
        let le: Vec<u8> = "Chapter 1\nplain text"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        assert_eq!(detect(&le).charset, TxtCharset::Utf16Le);

        let be: Vec<u8> = "Chapter 1\nplain text"
            .encode_utf16()
            .flat_map(|u| u.to_be_bytes())
            .collect();
        assert_eq!(detect(&be).charset, TxtCharset::Utf16Be);
    }

    #[test]
    fn test_detect_gb18030() {
        let bytes = encode(
            TxtCharset::Gb18030,
            "第一章 这是一个测试。我们的国家很大，他说的话都是对的。",
        );
        assert_eq!(detect(&bytes), Detection::sure(TxtCharset::Gb18030));
    }

    #[test]
    fn test_detect_big5() {
        let bytes = encode(
            TxtCharset::Big5,
            "第一章 這是一個測試。我們的國家很大，他說的話都是對的。",
        );
        assert_eq!(detect(&bytes), Detection::sure(TxtCharset::Big5));
    }

    #[test]
    fn test_undetectable_falls_back_to_utf8() {
        let detection = detect(&[0xC3, 0x28, 0xA0, 0xA1, 0x80, 0x81]);
        assert_eq!(detection.charset, TxtCharset::Utf8);
        assert!(!detection.confident);
    }

    #[test]
    fn test_from_label() {
        assert_eq!(TxtCharset::from_label("GBK"), Some(TxtCharset::Gbk));
        assert_eq!(TxtCharset::from_label("utf-16"), Some(TxtCharset::Utf16Le));
        assert_eq!(TxtCharset::from_label("big5"), Some(TxtCharset::Big5));
        assert_eq!(TxtCharset::from_label("latin1"), None);
    }

    #[test]
    fn test_decode_strips_bom() {
        assert_eq!(TxtCharset::Utf8.decode(b"\xEF\xBB\xBFabc"), "abc");
    }
}
