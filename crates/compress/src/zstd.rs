//! Zstandard decoding.

use std::io::{self, BufReader, Read};

use zstd::stream::read::Decoder as ZstdDecoder;

/// Wraps `reader` in a streaming Zstandard decoder.
pub fn decoder<R>(reader: R) -> io::Result<ZstdDecoder<'static, BufReader<R>>>
where
    R: Read,
{
    ZstdDecoder::new(reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_stream() {
        let compressed = zstd::stream::encode_all(&b"payload\n"[..], 3).unwrap();
        let mut out = Vec::new();
        decoder(&compressed[..]).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"payload\n");
    }
}
