use anyhow::{Result, bail};
use encoding_rs::{EUC_KR, Encoding, WINDOWS_1252};
use std::path::Path;

// Decode priority: strict UTF-8, the legacy double-byte encoding the
// exports most commonly carry, then a permissive single-byte fallback.
static FALLBACK_ENCODINGS: &[&Encoding] = &[EUC_KR, WINDOWS_1252];

/// Decodes raw source bytes, first encoding that round-trips cleanly wins.
pub fn decode_source_bytes(path: &Path, payload: &[u8]) -> Result<String> {
    if let Ok(text) = std::str::from_utf8(payload) {
        return Ok(text.to_string());
    }
    for encoding in FALLBACK_ENCODINGS {
        let (decoded, _, had_errors) = encoding.decode(payload);
        if !had_errors {
            return Ok(decoded.into_owned());
        }
    }
    bail!("failed to decode file: {}", path.display());
}

pub fn read_source_text(path: &Path) -> Result<String> {
    let payload = std::fs::read(path)?;
    decode_source_bytes(path, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn utf8_input_passes_through() {
        let path = PathBuf::from("sample.srw");
        let text = decode_source_bytes(&path, "event clicked\n".as_bytes()).unwrap();
        assert_eq!(text, "event clicked\n");
    }

    #[test]
    fn euc_kr_bytes_decode_via_fallback() {
        // "주문" encoded as EUC-KR.
        let payload = [0xc1, 0xd6, 0xb9, 0xae];
        let path = PathBuf::from("sample.srd");
        let text = decode_source_bytes(&path, &payload).unwrap();
        assert_eq!(text, "주문");
    }

    #[test]
    fn arbitrary_bytes_still_decode_permissively() {
        // windows-1252 maps every byte, so decoding never hard-fails.
        let payload = [0x80, 0x81, 0xfe, 0xff];
        let path = PathBuf::from("sample.bin");
        assert!(decode_source_bytes(&path, &payload).is_ok());
    }
}
