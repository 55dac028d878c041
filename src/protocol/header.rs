//! Fixed-size header encoding and decoding
//!
//! Headers are always exactly `HEADER_SIZE` bytes. The numeric fields are
//! zero-padded decimal text; params follow as `key:value<###>` tokens and the
//! remainder is filled with spaces.

use crate::error::ProtocolError;
use crate::protocol::{
    FrameType, Params, DELIMITER, HEADER_SIZE, MAX_PAYLOAD_SIZE, SIZE_FIELD_WIDTH,
    TYPE_FIELD_WIDTH,
};
use bytes::{BufMut, BytesMut};

/// Fill byte for the unused tail of a header
const PADDING: u8 = b' ';

/// Offset of the first param byte
const PARAMS_OFFSET: usize = TYPE_FIELD_WIDTH + SIZE_FIELD_WIDTH;

/// A decoded frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Frame type
    pub frame_type: FrameType,
    /// Number of payload bytes following the header
    pub payload_size: u64,
    /// Out-of-band params
    pub params: Params,
}

impl Header {
    /// Create a header with no params
    pub fn new(frame_type: FrameType, payload_size: u64) -> Self {
        Self {
            frame_type,
            payload_size,
            params: Params::new(),
        }
    }

    /// Add a param
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Look up a param value
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Encode this header to its fixed-size wire form
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE], ProtocolError> {
        encode_header(self.frame_type, self.payload_size, &self.params)
    }

    /// Decode a header from its fixed-size wire form
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        decode_header(data)
    }
}

/// Encode a header
///
/// # Errors
///
/// - `PayloadTooLarge` if `payload_size` does not fit in the size field
/// - `InvalidParam` if a key is empty or contains `:`, or if a key or value
///   contains the delimiter
/// - `HeaderOverflow` if the params do not fit in `HEADER_SIZE` bytes
pub fn encode_header(
    frame_type: FrameType,
    payload_size: u64,
    params: &Params,
) -> Result<[u8; HEADER_SIZE], ProtocolError> {
    if payload_size > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload_size,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut prefix = BytesMut::with_capacity(HEADER_SIZE);
    prefix.put_slice(
        format!(
            "{:0tw$}{:0sw$}",
            frame_type.code(),
            payload_size,
            tw = TYPE_FIELD_WIDTH,
            sw = SIZE_FIELD_WIDTH
        )
        .as_bytes(),
    );

    for (key, value) in params {
        validate_param(key, value)?;
        prefix.put_slice(key.as_bytes());
        prefix.put_u8(b':');
        prefix.put_slice(value.as_bytes());
        prefix.put_slice(DELIMITER.as_bytes());
    }

    if prefix.len() > HEADER_SIZE {
        return Err(ProtocolError::HeaderOverflow {
            required: prefix.len(),
            available: HEADER_SIZE,
        });
    }

    let mut header = [PADDING; HEADER_SIZE];
    header[..prefix.len()].copy_from_slice(&prefix);
    Ok(header)
}

/// Decode a header
///
/// # Errors
///
/// - `MalformedHeader` if the input is not `HEADER_SIZE` bytes, a numeric
///   field is not decimal, or the param block is not well formed
/// - `UnknownFrameType` if the type code names no frame type
pub fn decode_header(data: &[u8]) -> Result<Header, ProtocolError> {
    if data.len() != HEADER_SIZE {
        return Err(malformed(format!(
            "expected {} header bytes, got {}",
            HEADER_SIZE,
            data.len()
        )));
    }

    let code = parse_decimal(&data[..TYPE_FIELD_WIDTH], "type")?;
    let code = u16::try_from(code).map_err(|_| malformed("type code out of range"))?;
    let frame_type =
        FrameType::from_code(code).ok_or(ProtocolError::UnknownFrameType { code })?;

    let payload_size = parse_decimal(&data[TYPE_FIELD_WIDTH..PARAMS_OFFSET], "payload size")?;

    let params = decode_params(&data[PARAMS_OFFSET..])?;

    Ok(Header {
        frame_type,
        payload_size,
        params,
    })
}

fn validate_param(key: &str, value: &str) -> Result<(), ProtocolError> {
    let invalid = |reason: &str| ProtocolError::InvalidParam {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.contains(':') {
        return Err(invalid("key contains ':'"));
    }
    if key.contains(DELIMITER) || value.contains(DELIMITER) {
        return Err(invalid("contains the param delimiter"));
    }

    Ok(())
}

fn decode_params(block: &[u8]) -> Result<Params, ProtocolError> {
    // Senders may pad with spaces or NULs
    let end = block
        .iter()
        .rposition(|&b| b != PADDING && b != 0)
        .map_or(0, |i| i + 1);
    let text = std::str::from_utf8(&block[..end])
        .map_err(|_| malformed("param block is not valid UTF-8"))?;

    let mut tokens: Vec<&str> = text.split(DELIMITER).collect();
    // The segment after the last delimiter is padding only
    match tokens.pop() {
        Some("") | None => {},
        Some(_) => return Err(malformed("unterminated param")),
    }

    let mut params = Params::new();
    for token in tokens {
        let (key, value) = token
            .split_once(':')
            .ok_or_else(|| malformed(format!("param {:?} has no ':'", token)))?;
        params.insert(key.to_string(), value.to_string());
    }

    Ok(params)
}

fn parse_decimal(field: &[u8], name: &str) -> Result<u64, ProtocolError> {
    let text = std::str::from_utf8(field)
        .map_err(|_| malformed(format!("{} field is not ASCII", name)))?
        .trim_matches(|c| c == ' ' || c == '\0');

    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(format!("{} field {:?} is not a number", name, text)));
    }

    text.parse()
        .map_err(|_| malformed(format!("{} field {:?} is out of range", name, text)))
}

fn malformed(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedHeader {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::param;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_encode_layout() {
        let header =
            encode_header(FrameType::OutMessage, 5, &params(&[("recipient", "bob")])).unwrap();

        assert_eq!(header.len(), HEADER_SIZE);
        assert_eq!(&header[..2], b"02");
        assert_eq!(&header[2..18], b"0000000000000005");
        assert_eq!(&header[18..36], b"recipient:bob<###>");
        assert!(header[36..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn test_round_trip_without_params() {
        let header = encode_header(FrameType::FileListRequest, 0, &Params::new()).unwrap();
        let decoded = decode_header(&header).unwrap();

        assert_eq!(decoded.frame_type, FrameType::FileListRequest);
        assert_eq!(decoded.payload_size, 0);
        assert!(decoded.params.is_empty());
    }

    #[test]
    fn test_round_trip_with_params() {
        let original = Header::new(FrameType::Download, 10 * 1024 * 1024)
            .with_param(param::FILENAME, "report.pdf")
            .with_param(param::SENDER, "alice");

        let decoded = Header::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_round_trip_every_frame_type() {
        for frame_type in FrameType::ALL {
            let header = Header::new(frame_type, 42).with_param("k", "v");
            let decoded = Header::decode(&header.encode().unwrap()).unwrap();
            assert_eq!(decoded, header);
        }
    }

    #[test]
    fn test_value_may_contain_colon() {
        let header = Header::new(FrameType::DownloadRequest, 0)
            .with_param(param::FILENAME, "notes:v2.txt");
        let decoded = Header::decode(&header.encode().unwrap()).unwrap();
        assert_eq!(decoded.param(param::FILENAME), Some("notes:v2.txt"));
    }

    #[test]
    fn test_value_with_trailing_space_survives() {
        let header = Header::new(FrameType::Username, 0).with_param("note", "trailing ");
        let decoded = Header::decode(&header.encode().unwrap()).unwrap();
        assert_eq!(decoded.param("note"), Some("trailing "));
    }

    #[test]
    fn test_max_payload_size() {
        let header = Header::new(FrameType::Download, MAX_PAYLOAD_SIZE);
        let decoded = Header::decode(&header.encode().unwrap()).unwrap();
        assert_eq!(decoded.payload_size, MAX_PAYLOAD_SIZE);

        let result = encode_header(FrameType::Download, MAX_PAYLOAD_SIZE + 1, &Params::new());
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_header_overflow() {
        let long_value = "x".repeat(HEADER_SIZE);
        let result = encode_header(
            FrameType::DownloadRequest,
            0,
            &params(&[(param::FILENAME, &long_value)]),
        );
        assert!(matches!(
            result,
            Err(ProtocolError::HeaderOverflow {
                available: HEADER_SIZE,
                ..
            })
        ));
    }

    #[test]
    fn test_params_exactly_filling_header() {
        // 18 fixed bytes + "k:" + value + delimiter == HEADER_SIZE
        let value_len = HEADER_SIZE - PARAMS_OFFSET - 2 - DELIMITER.len();
        let value = "v".repeat(value_len);
        let header = encode_header(FrameType::Announcement, 0, &params(&[("k", &value)])).unwrap();
        let decoded = decode_header(&header).unwrap();
        assert_eq!(decoded.param("k"), Some(value.as_str()));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let cases = [("", "v"), ("a:b", "v"), ("k<###>", "v"), ("k", "a<###>b")];
        for (key, value) in cases {
            let result = encode_header(FrameType::Username, 0, &params(&[(key, value)]));
            assert!(
                matches!(result, Err(ProtocolError::InvalidParam { .. })),
                "expected rejection of {:?}={:?}",
                key,
                value
            );
        }
    }

    #[test]
    fn test_unknown_frame_type() {
        let mut header = encode_header(FrameType::Username, 0, &Params::new()).unwrap();
        header[..2].copy_from_slice(b"99");
        assert_eq!(
            decode_header(&header),
            Err(ProtocolError::UnknownFrameType { code: 99 })
        );
    }

    #[test]
    fn test_malformed_numeric_fields() {
        let mut header = encode_header(FrameType::Username, 0, &Params::new()).unwrap();
        header[..2].copy_from_slice(b"x1");
        assert!(matches!(
            decode_header(&header),
            Err(ProtocolError::MalformedHeader { .. })
        ));

        let mut header = encode_header(FrameType::Username, 0, &Params::new()).unwrap();
        header[5] = b'-';
        assert!(matches!(
            decode_header(&header),
            Err(ProtocolError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn test_space_padded_numeric_fields_accepted() {
        // Left-aligned, space-padded fields are tolerated on input
        let mut raw = [b' '; HEADER_SIZE];
        raw[..1].copy_from_slice(b"4");
        raw[2..4].copy_from_slice(b"12");
        let decoded = decode_header(&raw).unwrap();
        assert_eq!(decoded.frame_type, FrameType::Announcement);
        assert_eq!(decoded.payload_size, 12);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(matches!(
            decode_header(&[b'0'; 18]),
            Err(ProtocolError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn test_unterminated_param_rejected() {
        let mut header = encode_header(FrameType::Username, 0, &Params::new()).unwrap();
        header[18..28].copy_from_slice(b"username:a");
        assert!(matches!(
            decode_header(&header),
            Err(ProtocolError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn test_nul_padding_accepted() {
        let mut header = encode_header(
            FrameType::Username,
            0,
            &params(&[(param::USERNAME, "alice")]),
        )
        .unwrap();
        for byte in header.iter_mut().skip(18 + "username:alice<###>".len()) {
            *byte = 0;
        }
        let decoded = decode_header(&header).unwrap();
        assert_eq!(decoded.param(param::USERNAME), Some("alice"));
    }
}
