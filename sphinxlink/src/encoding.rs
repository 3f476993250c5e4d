//! Conversion between the wire encoding and the host encoding.
//!
//! `searchd` only speaks UTF-8, while the host side of the bridge may store text in another
//! encoding. Text coming from the server is converted with [`Encoding::to_host`], text going
//! to the server with [`Encoding::to_wire`].
use std::{borrow::Cow, env::var, fmt};

/// A host character set.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// Bytes without a declared encoding, never converted.
    SqlAscii,
    /// ISO-8859-1 or ISO-8859-9, byte for code point.
    ///
    /// WHATWG, and so [`encoding_rs`], treats these labels as their windows code page, which
    /// differ in the `0x80..=0x9F` range.
    Latin(Latin),
    Encoding(&'static encoding_rs::Encoding),
}

/// Single byte ISO-8859 charsets converted exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latin {
    /// ISO-8859-1, every byte is the code point of the same value.
    Latin1,
    /// ISO-8859-9, ISO-8859-1 with six Turkish letters replacing Icelandic ones.
    Latin5,
}

/// Bytes of ISO-8859-9 that differ from ISO-8859-1.
const LATIN5_OVERRIDES: [(u8, char); 6] = [
    (0xD0, '\u{11E}'),
    (0xDD, '\u{130}'),
    (0xDE, '\u{15E}'),
    (0xF0, '\u{11F}'),
    (0xFD, '\u{131}'),
    (0xFE, '\u{15F}'),
];

impl Latin {
    pub fn name(&self) -> &'static str {
        match self {
            Latin::Latin1 => "ISO-8859-1",
            Latin::Latin5 => "ISO-8859-9",
        }
    }

    fn decode_byte(&self, b: u8) -> char {
        if let Latin::Latin5 = self {
            if let Some((_, ch)) = LATIN5_OVERRIDES.iter().find(|(byte, _)| *byte == b) {
                return *ch;
            }
        }
        char::from(b)
    }

    fn encode_char(&self, ch: char) -> Option<u8> {
        if let Latin::Latin5 = self {
            if let Some((byte, _)) = LATIN5_OVERRIDES.iter().find(|(_, c)| *c == ch) {
                return Some(*byte);
            }
        }
        let byte = u8::try_from(u32::from(ch)).ok()?;
        match self {
            Latin::Latin5 if LATIN5_OVERRIDES.iter().any(|(b, _)| *b == byte) => None,
            _ => Some(byte),
        }
    }

    /// UTF-8 into this charset.
    fn encode<'a>(&self, value: &'a [u8]) -> Result<Cow<'a, [u8]>, EncodingError> {
        if value.is_ascii() {
            return Ok(Cow::Borrowed(value));
        }
        let Ok(text) = std::str::from_utf8(value) else {
            return Err(EncodingError::Malformed { encoding: "UTF-8" });
        };
        text.chars()
            .map(|ch| self.encode_char(ch))
            .collect::<Option<Vec<u8>>>()
            .map(Cow::Owned)
            .ok_or(EncodingError::Unmappable { encoding: self.name() })
    }

    /// This charset into UTF-8.
    fn decode<'a>(&self, value: &'a [u8]) -> Cow<'a, [u8]> {
        if value.is_ascii() {
            return Cow::Borrowed(value);
        }
        let text = value.iter().map(|&b| self.decode_byte(b)).collect::<String>();
        Cow::Owned(text.into_bytes())
    }
}

impl Charset {
    pub fn utf8() -> Charset {
        Charset::Encoding(encoding_rs::UTF_8)
    }

    /// Lookup charset by name.
    ///
    /// Accepts the WHATWG labels known by [`encoding_rs`], and the usual database names
    /// such as `UTF8`, `LATIN1`, `WIN1251` or `SQL_ASCII`.
    pub fn for_label(label: &str) -> Result<Charset, EncodingError> {
        let label = label.trim();
        let upper = label.to_ascii_uppercase();

        match upper.as_str() {
            "SQL_ASCII" => return Ok(Charset::SqlAscii),
            "LATIN1" | "ISO_8859_1" | "ISO-8859-1" | "ISO8859-1" | "ISO88591" => {
                return Ok(Charset::Latin(Latin::Latin1));
            },
            "LATIN5" | "ISO_8859_9" | "ISO-8859-9" | "ISO8859-9" | "ISO88599" => {
                return Ok(Charset::Latin(Latin::Latin5));
            },
            _ => {},
        }

        let alias = ALIASES
            .iter()
            .find(|(name, _)| *name == upper)
            .map_or(label, |(_, alias)| *alias);

        match encoding_rs::Encoding::for_label(alias.as_bytes()) {
            Some(encoding) => Ok(Charset::Encoding(encoding)),
            None => Err(EncodingError::UnknownLabel(label.to_owned())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Charset::SqlAscii => "SQL_ASCII",
            Charset::Latin(latin) => latin.name(),
            Charset::Encoding(encoding) => encoding.name(),
        }
    }

    pub fn is_utf8(&self) -> bool {
        *self == Charset::utf8()
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Database encoding names which are not WHATWG labels.
const ALIASES: &[(&str, &str)] = &[
    ("UTF8", "utf-8"),
    ("UNICODE", "utf-8"),
    ("LATIN2", "iso-8859-2"),
    ("LATIN3", "iso-8859-3"),
    ("LATIN4", "iso-8859-4"),
    ("LATIN6", "iso-8859-10"),
    ("LATIN7", "iso-8859-13"),
    ("LATIN8", "iso-8859-14"),
    ("LATIN9", "iso-8859-15"),
    ("LATIN10", "iso-8859-16"),
    ("ISO_8859_5", "iso-8859-5"),
    ("ISO_8859_6", "iso-8859-6"),
    ("ISO_8859_7", "iso-8859-7"),
    ("ISO_8859_8", "iso-8859-8"),
    ("WIN866", "ibm866"),
    ("WIN874", "windows-874"),
    ("WIN1250", "windows-1250"),
    ("WIN1251", "windows-1251"),
    ("WIN1252", "windows-1252"),
    ("WIN1253", "windows-1253"),
    ("WIN1254", "windows-1254"),
    ("WIN1255", "windows-1255"),
    ("WIN1256", "windows-1256"),
    ("WIN1257", "windows-1257"),
    ("WIN1258", "windows-1258"),
    ("KOI8R", "koi8-r"),
    ("KOI8U", "koi8-u"),
    ("EUC_JP", "euc-jp"),
    ("EUC_KR", "euc-kr"),
    ("EUC_CN", "gbk"),
    ("SJIS", "shift_jis"),
    ("BIG5", "big5"),
    ("GBK", "gbk"),
    ("GB18030", "gb18030"),
    ("UHC", "euc-kr"),
];

/// Host encoding settings.
///
/// `database` is the encoding text is stored in, `client` the encoding of the session
/// issuing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    database: Charset,
    client: Charset,
}

impl Default for Encoding {
    fn default() -> Self {
        Self::utf8()
    }
}

impl Encoding {
    /// Both sides in UTF-8, every conversion is an identity.
    pub fn utf8() -> Encoding {
        Encoding { database: Charset::utf8(), client: Charset::utf8() }
    }

    pub fn new(database: Charset, client: Charset) -> Self {
        Self { database, client }
    }

    /// Retrieve encoding from environment variable.
    ///
    /// It reads:
    /// - `SPHINXLINK_DATABASE_ENCODING`
    /// - `SPHINXLINK_CLIENT_ENCODING`, defaults to the database encoding
    ///
    /// Both default to UTF-8.
    pub fn from_env() -> Result<Encoding, EncodingError> {
        let database = match var("SPHINXLINK_DATABASE_ENCODING") {
            Ok(label) => Charset::for_label(&label)?,
            Err(_) => Charset::utf8(),
        };
        let client = match var("SPHINXLINK_CLIENT_ENCODING") {
            Ok(label) => Charset::for_label(&label)?,
            Err(_) => database,
        };
        Ok(Self { database, client })
    }

    pub fn database(&self) -> Charset {
        self.database
    }

    pub fn client(&self) -> Charset {
        self.client
    }

    /// Convert server text into the database encoding.
    ///
    /// Returned as is when the database is UTF-8.
    pub fn to_host<'a>(&self, value: &'a [u8]) -> Result<Cow<'a, [u8]>, EncodingError> {
        let encoding = match self.database {
            Charset::SqlAscii => return Ok(Cow::Borrowed(value)),
            Charset::Latin(latin) => return latin.encode(value),
            Charset::Encoding(encoding) if encoding == encoding_rs::UTF_8 => {
                return Ok(Cow::Borrowed(value));
            },
            Charset::Encoding(encoding) => encoding,
        };

        let Ok(text) = std::str::from_utf8(value) else {
            return Err(EncodingError::Malformed { encoding: "UTF-8" });
        };

        let (encoded, _, unmappable) = encoding.encode(text);
        if unmappable {
            return Err(EncodingError::Unmappable { encoding: encoding.name() });
        }
        Ok(encoded)
    }

    /// Convert query text from the database encoding into UTF-8.
    ///
    /// Returned as is when the database is UTF-8, and also when the client encoding is not
    /// UTF-8.
    pub fn to_wire<'a>(&self, value: &'a [u8]) -> Result<Cow<'a, [u8]>, EncodingError> {
        if self.database.is_utf8() || !self.client.is_utf8() {
            return Ok(Cow::Borrowed(value));
        }
        let encoding = match self.database {
            Charset::SqlAscii => return Ok(Cow::Borrowed(value)),
            Charset::Latin(latin) => return Ok(latin.decode(value)),
            Charset::Encoding(encoding) => encoding,
        };

        match encoding.decode_without_bom_handling_and_without_replacement(value) {
            Some(Cow::Borrowed(text)) => Ok(Cow::Borrowed(text.as_bytes())),
            Some(Cow::Owned(text)) => Ok(Cow::Owned(text.into_bytes())),
            None => Err(EncodingError::Malformed { encoding: encoding.name() }),
        }
    }
}

/// An error when converting text between encodings.
pub enum EncodingError {
    /// Input is not valid in its encoding.
    Malformed { encoding: &'static str },
    /// A character has no equivalent in the target encoding.
    Unmappable { encoding: &'static str },
    /// Encoding name not recognized.
    UnknownLabel(String),
}

impl std::error::Error for EncodingError { }

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { encoding } => write!(f, "invalid byte sequence for encoding \"{encoding}\""),
            Self::Unmappable { encoding } => {
                write!(f, "character has no equivalent in encoding \"{encoding}\"")
            },
            Self::UnknownLabel(label) => write!(f, "unknown encoding \"{label}\""),
        }
    }
}

impl fmt::Debug for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn latin1() -> Encoding {
        let latin1 = Charset::for_label("LATIN1").unwrap();
        Encoding::new(latin1, Charset::utf8())
    }

    #[test]
    fn utf8_is_identity() {
        let text = "caf\u{e9} \u{65e5}\u{672c}".as_bytes();
        assert!(matches!(Encoding::utf8().to_host(text).unwrap(), Cow::Borrowed(b) if b == text));
        assert!(matches!(Encoding::utf8().to_wire(text).unwrap(), Cow::Borrowed(b) if b == text));
    }

    #[test]
    fn round_trip_through_host_encoding() {
        let enc = latin1();
        let wire = "caf\u{e9}".as_bytes();

        let host = enc.to_host(wire).unwrap();
        assert_eq!(&host[..], b"caf\xe9");

        let back = enc.to_wire(&host).unwrap();
        assert_eq!(&back[..], wire);
    }

    #[test]
    fn ascii_is_not_copied() {
        let enc = latin1();
        assert!(matches!(enc.to_host(b"plain").unwrap(), Cow::Borrowed(_)));
        assert!(matches!(enc.to_wire(b"plain").unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn non_utf8_client_skips_wire_conversion() {
        let latin1 = Charset::for_label("latin1").unwrap();
        let enc = Encoding::new(latin1, latin1);
        assert!(matches!(enc.to_wire(b"caf\xe9").unwrap(), Cow::Borrowed(b) if b == b"caf\xe9"));
    }

    #[test]
    fn unmappable_and_malformed_fail() {
        let enc = latin1();
        assert!(matches!(
            enc.to_host("\u{65e5}".as_bytes()),
            Err(EncodingError::Unmappable { .. })
        ));
        assert!(matches!(enc.to_host(b"\xff\xfe"), Err(EncodingError::Malformed { .. })));
    }

    #[test]
    fn sql_ascii_is_never_converted() {
        let enc = Encoding::new(Charset::for_label("SQL_ASCII").unwrap(), Charset::utf8());
        assert!(matches!(enc.to_host(b"\xff").unwrap(), Cow::Borrowed(_)));
        assert!(matches!(enc.to_wire(b"\xff").unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn latin1_is_exact() {
        let enc = latin1();
        assert_eq!(enc.database().name(), "ISO-8859-1");
        assert!(matches!(enc.to_host("\u{20ac}".as_bytes()), Err(EncodingError::Unmappable { .. })));
        assert_eq!(&enc.to_host("\u{85}\u{ff}".as_bytes()).unwrap()[..], b"\x85\xff");
        assert_eq!(&enc.to_wire(b"\x80\xff").unwrap()[..], "\u{80}\u{ff}".as_bytes());
    }

    #[test]
    fn latin5_turkish_letters() {
        let latin5 = Charset::for_label("LATIN5").unwrap();
        assert_eq!(latin5.name(), "ISO-8859-9");
        let enc = Encoding::new(latin5, Charset::utf8());

        assert_eq!(&enc.to_host("\u{130}\u{15F}\u{e9}".as_bytes()).unwrap()[..], b"\xdd\xfe\xe9");
        assert_eq!(&enc.to_wire(b"\xf0\xfd\x85").unwrap()[..], "\u{11F}\u{131}\u{85}".as_bytes());
        assert!(matches!(enc.to_host("\u{de}".as_bytes()), Err(EncodingError::Unmappable { .. })));
        assert!(matches!(enc.to_host("\u{20ac}".as_bytes()), Err(EncodingError::Unmappable { .. })));
    }

    #[test]
    fn unknown_label() {
        assert!(Charset::for_label("KLINGON").is_err());
        assert_eq!(Charset::for_label("win1251").unwrap().name(), "windows-1251");
    }
}
