//! gzip decoding.

use std::io::Read;

use flate2::read::MultiGzDecoder;

/// Wraps `reader` in a decoder that follows concatenated gzip members, as
/// produced by appending rotations to one archive.
pub fn decoder<R>(reader: R) -> MultiGzDecoder<R>
where
    R: Read,
{
    MultiGzDecoder::new(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn decodes_concatenated_members() {
        let mut stream = gzip(b"first\n");
        stream.extend(gzip(b"second\n"));
        let mut out = String::new();
        decoder(&stream[..]).read_to_string(&mut out).unwrap();
        assert_eq!(out, "first\nsecond\n");
    }
}
