use bytes::{Buf, Bytes, BytesMut};
use tracing::debug;

use crate::{RelayError, Result};

/// Largest top-level box accepted from the transcoder (64 MiB)
const MAX_BOX_SIZE: u64 = 64 * 1024 * 1024;

const BOX_HEADER_SIZE: usize = 8;
const LARGE_BOX_HEADER_SIZE: usize = 16;

/// AVC NAL unit type of an IDR slice
const NAL_TYPE_IDR: u8 = 5;

/// Output of the box splitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mp4Output {
    /// `ftyp` + `moov`
    Initialization(Bytes),
    /// `moof` + `mdat`
    Fragment { data: Bytes, keyframe: bool },
}

/// Incremental splitter for a fragmented MP4 byte stream.
///
/// Expects the layout produced by
/// `-movflags +frag_keyframe+empty_moov+default_base_moof`:
/// `ftyp moov (moof mdat)*`. Other top-level boxes are skipped.
#[derive(Debug, Default)]
pub struct Mp4Fragmenter {
    buffer: BytesMut,
    ftyp: Option<Bytes>,
    initialized: bool,
    moof: Option<Bytes>,
}

struct BoxHeader {
    kind: [u8; 4],
    size: usize,
    header_len: usize,
}

impl Mp4Fragmenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of the stream and collect every completed output
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Mp4Output>> {
        self.buffer.extend_from_slice(chunk);

        let mut outputs = Vec::new();
        while let Some(header) = self.peek_header()? {
            if self.buffer.len() < header.size {
                break;
            }
            let data = self.buffer.split_to(header.size).freeze();
            self.handle_box(&header, data, &mut outputs)?;
        }
        Ok(outputs)
    }

    /// Bytes received but not yet part of a complete box
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn peek_header(&self) -> Result<Option<BoxHeader>> {
        if self.buffer.len() < BOX_HEADER_SIZE {
            return Ok(None);
        }
        let mut header = &self.buffer[..];
        let size32 = header.get_u32();
        let mut kind = [0u8; 4];
        header.copy_to_slice(&mut kind);

        let (size, header_len) = match size32 {
            0 => {
                return Err(RelayError::Stream(format!(
                    "box '{}' extends to end of stream",
                    kind_name(&kind)
                )))
            }
            1 => {
                if self.buffer.len() < LARGE_BOX_HEADER_SIZE {
                    return Ok(None);
                }
                (header.get_u64(), LARGE_BOX_HEADER_SIZE)
            }
            n => (u64::from(n), BOX_HEADER_SIZE),
        };

        if size < header_len as u64 {
            return Err(RelayError::Stream(format!(
                "box '{}' declares size {size} smaller than its header",
                kind_name(&kind)
            )));
        }
        if size > MAX_BOX_SIZE {
            return Err(RelayError::Stream(format!(
                "box '{}' of {size} bytes exceeds limit of {MAX_BOX_SIZE}",
                kind_name(&kind)
            )));
        }

        Ok(Some(BoxHeader {
            kind,
            // bounded by MAX_BOX_SIZE above
            size: size as usize,
            header_len,
        }))
    }

    fn handle_box(&mut self, header: &BoxHeader, data: Bytes, outputs: &mut Vec<Mp4Output>) -> Result<()> {
        match &header.kind {
            b"ftyp" => {
                self.ftyp = Some(data);
                self.initialized = false;
                self.moof = None;
            }
            b"moov" => {
                let ftyp = self
                    .ftyp
                    .take()
                    .ok_or_else(|| RelayError::Stream("'moov' before 'ftyp'".to_string()))?;
                let mut init = BytesMut::with_capacity(ftyp.len() + data.len());
                init.extend_from_slice(&ftyp);
                init.extend_from_slice(&data);
                self.initialized = true;
                outputs.push(Mp4Output::Initialization(init.freeze()));
            }
            b"moof" => {
                if !self.initialized {
                    return Err(RelayError::Stream(
                        "'moof' before initialization segment".to_string(),
                    ));
                }
                if self.moof.replace(data).is_some() {
                    debug!("Discarding 'moof' without 'mdat'");
                }
            }
            b"mdat" => {
                let Some(moof) = self.moof.take() else {
                    debug!("Skipping 'mdat' without preceding 'moof'");
                    return Ok(());
                };
                let keyframe = contains_idr(&data[header.header_len..]);
                let mut fragment = BytesMut::with_capacity(moof.len() + data.len());
                fragment.extend_from_slice(&moof);
                fragment.extend_from_slice(&data);
                outputs.push(Mp4Output::Fragment {
                    data: fragment.freeze(),
                    keyframe,
                });
            }
            other => {
                debug!(kind = %kind_name(other), size = header.size, "Skipping top-level box");
            }
        }
        Ok(())
    }
}

/// Scan length-prefixed (4 byte) AVC NAL units for an IDR slice
fn contains_idr(mut payload: &[u8]) -> bool {
    while payload.len() > 4 {
        let len = payload.get_u32() as usize;
        if len == 0 || len > payload.len() {
            return false;
        }
        if payload[0] & 0x1f == NAL_TYPE_IDR {
            return true;
        }
        payload.advance(len);
    }
    false
}

fn kind_name(kind: &[u8; 4]) -> String {
    String::from_utf8_lossy(kind).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(payload);
        out
    }

    fn nal(nal_type: u8) -> Vec<u8> {
        let body = [nal_type, 0xAA, 0xBB];
        let mut out = (body.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }

    fn init_segment() -> Vec<u8> {
        let mut out = mp4_box(b"ftyp", b"isom\0\0\x02\0");
        out.extend(mp4_box(b"moov", &[1, 2, 3, 4]));
        out
    }

    #[test]
    fn test_splits_init_and_fragments() {
        let mut stream = init_segment();
        stream.extend(mp4_box(b"moof", &[9; 16]));
        let mut idr = nal(6);
        idr.extend(nal(0x65));
        stream.extend(mp4_box(b"mdat", &idr));
        stream.extend(mp4_box(b"moof", &[8; 16]));
        stream.extend(mp4_box(b"mdat", &nal(0x41)));

        let mut fragmenter = Mp4Fragmenter::new();
        let outputs = fragmenter.push(&stream).unwrap();

        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0], Mp4Output::Initialization(Bytes::from(init_segment())));
        assert!(matches!(&outputs[1], Mp4Output::Fragment { keyframe: true, data } if data.len() == 24 + 8 + idr.len()));
        assert!(matches!(&outputs[2], Mp4Output::Fragment { keyframe: false, .. }));
        assert_eq!(fragmenter.buffered(), 0);
    }

    #[test]
    fn test_boxes_split_across_chunks() {
        let mut stream = init_segment();
        stream.extend(mp4_box(b"moof", &[7; 10]));
        stream.extend(mp4_box(b"mdat", &nal(5)));

        let mut fragmenter = Mp4Fragmenter::new();
        let mut outputs = Vec::new();
        for byte in &stream {
            outputs.extend(fragmenter.push(std::slice::from_ref(byte)).unwrap());
        }

        assert_eq!(outputs.len(), 2);
        assert!(matches!(outputs[1], Mp4Output::Fragment { keyframe: true, .. }));
    }

    #[test]
    fn test_unknown_boxes_are_skipped() {
        let mut stream = init_segment();
        stream.extend(mp4_box(b"free", &[0; 4]));
        stream.extend(mp4_box(b"mdat", &nal(5)));

        let outputs = Mp4Fragmenter::new().push(&stream).unwrap();
        assert_eq!(outputs.len(), 1);
    }

    #[test]
    fn test_large_size_header() {
        let mut stream = init_segment();
        stream.extend(mp4_box(b"moof", &[1; 4]));
        let payload = nal(5);
        stream.extend_from_slice(&1u32.to_be_bytes());
        stream.extend_from_slice(b"mdat");
        stream.extend_from_slice(&((payload.len() + 16) as u64).to_be_bytes());
        stream.extend_from_slice(&payload);

        let outputs = Mp4Fragmenter::new().push(&stream).unwrap();
        assert!(matches!(outputs[1], Mp4Output::Fragment { keyframe: true, .. }));
    }

    #[test]
    fn test_oversized_box_is_an_error() {
        let mut stream = init_segment();
        stream.extend_from_slice(&u32::MAX.to_be_bytes());
        stream.extend_from_slice(b"mdat");

        let err = Mp4Fragmenter::new().push(&stream).unwrap_err();
        assert!(matches!(err, RelayError::Stream(msg) if msg.contains("exceeds limit")));
    }

    #[test]
    fn test_fragment_before_init_is_an_error() {
        let stream = mp4_box(b"moof", &[0; 4]);
        assert!(Mp4Fragmenter::new().push(&stream).is_err());
    }

    #[test]
    fn test_truncated_nal_is_not_keyframe() {
        let mut payload = 100u32.to_be_bytes().to_vec();
        payload.push(5);
        assert!(!contains_idr(&payload));
    }
}
