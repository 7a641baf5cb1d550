/// Text encodings the decoder knows how to turn into a `String`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
    Ascii,
    Utf16Le,
}

impl Charset {
    /// Maps a `charset` parameter value onto a supported encoding.
    ///
    /// Missing or unknown labels fall back to UTF-8.
    pub fn from_label(label: Option<&str>) -> Self {
        let Some(label) = label else {
            return Self::Utf8;
        };
        let label = label.trim().trim_matches('"').to_ascii_lowercase();
        match label.as_str() {
            "utf-8" | "utf8" => Self::Utf8,
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1" | "binary" => Self::Latin1,
            "us-ascii" | "ascii" => Self::Ascii,
            "utf-16le" | "utf16le" | "ucs-2" | "ucs2" => Self::Utf16Le,
            _ => Self::Utf8,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin1",
            Self::Ascii => "ascii",
            Self::Utf16Le => "utf-16le",
        }
    }

    /// Decodes `bytes` lossily; invalid sequences become U+FFFD.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(strip_utf8_bom(bytes)).into_owned(),
            Self::Latin1 => bytes.iter().map(|&byte| char::from(byte)).collect(),
            Self::Ascii => bytes.iter().map(|&byte| char::from(byte & 0x7f)).collect(),
            Self::Utf16Le => {
                let units = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
                char::decode_utf16(units)
                    .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect()
            }
        }
    }
}

impl std::fmt::Display for Charset {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

fn strip_utf8_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xef, 0xbb, 0xbf]).unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::Charset;

    #[test]
    fn missing_or_unknown_label_is_utf8() {
        assert_eq!(Charset::from_label(None), Charset::Utf8);
        assert_eq!(Charset::from_label(Some("klingon")), Charset::Utf8);
        assert_eq!(Charset::from_label(Some("")), Charset::Utf8);
    }

    #[test]
    fn labels_are_case_insensitive() {
        assert_eq!(Charset::from_label(Some("ISO-8859-1")), Charset::Latin1);
        assert_eq!(Charset::from_label(Some("UTF-8")), Charset::Utf8);
        assert_eq!(Charset::from_label(Some("\"us-ascii\"")), Charset::Ascii);
        assert_eq!(Charset::from_label(Some("UTF-16LE")), Charset::Utf16Le);
        assert_eq!(Charset::Latin1.to_string(), "latin1");
    }

    #[test]
    fn latin1_maps_every_byte_to_a_code_point() {
        assert_eq!(Charset::Latin1.decode(&[0x63, 0x61, 0x66, 0xe9]), "café");
    }

    #[test]
    fn utf8_is_lossy_and_drops_bom() {
        assert_eq!(Charset::Utf8.decode(b"\xef\xbb\xbfhello"), "hello");
        assert_eq!(Charset::Utf8.decode(b"a\xffb"), "a\u{fffd}b");
    }

    #[test]
    fn utf16le_decodes_pairs() {
        assert_eq!(Charset::Utf16Le.decode(&[0x68, 0x00, 0x69, 0x00]), "hi");
    }
}
