//! CBOR encoding of stored values.

use crate::error::StoreResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Decodes a value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(ciborium::from_reader(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Line {
        sku: String,
        qty: u32,
    }

    #[test]
    fn struct_roundtrip() {
        let line = Line {
            sku: "A-1".into(),
            qty: 3,
        };
        let bytes = to_cbor(&line).unwrap();
        assert_eq!(from_cbor::<Line>(&bytes).unwrap(), line);
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let err = from_cbor::<Line>(&[0xFF, 0x00]).unwrap_err();
        assert!(matches!(err, StoreError::Codec(_)));
    }
}
