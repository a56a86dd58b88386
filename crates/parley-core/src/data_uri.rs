use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::errors::ParleyError;

/// MIME type assumed when a data URI header names none.
const DEFAULT_MIME: &str = "application/octet-stream";

/// A binary payload carried inline as `data:<mime>;base64,<body>`.
///
/// Audio, image and file messages embed their bytes this way so a message
/// can be replayed without fetching anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    mime: String,
    data: Vec<u8>,
}

impl DataUri {
    /// Wrap raw bytes. The MIME type may carry parameters
    /// (`audio/ogg; codecs=opus`) but must not contain a comma.
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> Result<Self, ParleyError> {
        let mime = mime.into();
        let mime = mime.trim();
        if mime.contains(',') {
            return Err(ParleyError::InvalidMessage(format!(
                "mime type must not contain ',': '{mime}'"
            )));
        }
        let mime = if mime.is_empty() { DEFAULT_MIME } else { mime };
        Ok(Self {
            mime: mime.to_string(),
            data,
        })
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Render as a `data:` URI string.
    pub fn encode(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.data))
    }

    /// Parse a base64 `data:` URI. Percent-encoded (non-base64) URIs are
    /// rejected since every binary payload is sent base64-encoded.
    pub fn parse(input: &str) -> Result<Self, ParleyError> {
        let rest = input
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| ParleyError::InvalidMessage("payload is not a data URI".into()))?;

        let (header, body) = rest
            .split_once(',')
            .ok_or_else(|| ParleyError::InvalidMessage("data URI has no body".into()))?;

        let mime = header.strip_suffix(";base64").ok_or_else(|| {
            ParleyError::InvalidMessage(format!("data URI is not base64: '{header}'"))
        })?;

        let data = BASE64
            .decode(body)
            .map_err(|e| ParleyError::InvalidMessage(format!("bad base64 body: {e}")))?;

        Self::new(mime, data)
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for DataUri {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_matches_browser_shape() {
        let uri = DataUri::new("text/plain", b"hi".to_vec()).unwrap();
        assert_eq!(uri.encode(), "data:text/plain;base64,aGk=");
    }

    #[test]
    fn parse_keeps_mime_parameters() {
        let uri = DataUri::parse("data:audio/ogg; codecs=opus;base64,AAEC").unwrap();
        assert_eq!(uri.mime(), "audio/ogg; codecs=opus");
        assert_eq!(uri.data(), &[0, 1, 2]);
    }

    #[test]
    fn parse_empty_mime_falls_back_to_octet_stream() {
        let uri = DataUri::parse("data:;base64,AAEC").unwrap();
        assert_eq!(uri.mime(), "application/octet-stream");
    }

    #[test]
    fn parse_empty_body() {
        let uri = DataUri::parse("data:image/png;base64,").unwrap();
        assert!(uri.data().is_empty());
    }

    #[test]
    fn parse_rejects_non_data_uri() {
        assert!(DataUri::parse("blob:http://localhost/1234").is_err());
        assert!(DataUri::parse("hello").is_err());
        assert!(DataUri::parse("").is_err());
    }

    #[test]
    fn parse_rejects_percent_encoded() {
        assert!(DataUri::parse("data:text/plain,hello%20world").is_err());
    }

    #[test]
    fn parse_rejects_bad_base64() {
        assert!(DataUri::parse("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn new_rejects_comma_in_mime() {
        assert!(DataUri::new("text/plain,evil", Vec::new()).is_err());
    }
}
